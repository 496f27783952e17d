//! Executable code blocks and their content identity.
//!
//! A block's identity depends on its own source and on every block that ran
//! before it in the same file:
//!
//! ```text
//! h0 = sha256("")
//! hi = sha256(h(i-1) || digest(i))      digest(i) = sha256(source(i))
//! ```
//!
//! All values are lowercase hex. The chain value of the last block is the
//! aggregate key for the whole file, so editing any block changes the key of
//! that block and of every block after it.

use sha2::{Digest, Sha256};

/// One executable block of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Project-relative source file.
    pub file: String,
    /// 1-based position within the file.
    pub index: usize,
    /// Block source text.
    pub source: String,
    /// `sha256(source)`.
    pub digest: String,
    /// Hash chain value after this block.
    pub chain: String,
}

impl CodeBlock {
    /// Build the ordered blocks of `file`, computing digests and chain values.
    pub fn sequence<I, S>(file: &str, sources: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut chain = HashChain::new();
        sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| {
                let source = source.into();
                let digest = sha256_hex(source.as_bytes());
                Self {
                    file: file.to_owned(),
                    index: i + 1,
                    chain: chain.push(&digest).to_owned(),
                    source,
                    digest,
                }
            })
            .collect()
    }
}

/// Aggregate key of an ordered block sequence.
///
/// An empty sequence yields the chain seed `sha256("")`.
#[must_use]
pub fn aggregate_key(blocks: &[CodeBlock]) -> String {
    blocks
        .last()
        .map_or_else(|| HashChain::new().current, |b| b.chain.clone())
}

/// Running hash over block digests.
#[derive(Debug, Clone)]
pub struct HashChain {
    current: String,
}

impl HashChain {
    /// Start a chain at `sha256("")`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: sha256_hex(b""),
        }
    }

    /// Fold `digest` into the chain and return the new value.
    pub fn push(&mut self, digest: &str) -> &str {
        let mut hasher = Sha256::new();
        hasher.update(self.current.as_bytes());
        hasher.update(digest.as_bytes());
        self.current = hex::encode(hasher.finalize());
        &self.current
    }

    /// Current chain value.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }
}

impl Default for HashChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
