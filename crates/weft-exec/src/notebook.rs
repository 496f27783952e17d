//! Minimal nbformat v4 model.
//!
//! Only what execution needs is modelled: code cells and their outputs.
//! Unknown fields are dropped on read, unknown output types are preserved as
//! [`Output::Unknown`] and render to nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outputs of one executed cell.
pub type CellOutputs = Vec<Output>;

/// Notebook text: a string or a list of lines to concatenate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MultilineText {
    /// Single string.
    One(String),
    /// Lines including their terminators.
    Many(Vec<String>),
}

impl MultilineText {
    /// Concatenated text.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::One(s) => s.clone(),
            Self::Many(lines) => lines.concat(),
        }
    }
}

impl Default for MultilineText {
    fn default() -> Self {
        Self::One(String::new())
    }
}

impl From<&str> for MultilineText {
    fn from(s: &str) -> Self {
        Self::One(s.to_owned())
    }
}

/// One cell output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    /// Text written to stdout or stderr.
    Stream {
        /// `stdout` or `stderr`.
        name: String,
        /// Stream content.
        text: MultilineText,
    },
    /// Rich output from a display call.
    DisplayData {
        /// Mime type to payload.
        data: BTreeMap<String, Value>,
        #[serde(default)]
        metadata: BTreeMap<String, Value>,
    },
    /// Value of the last expression in a cell.
    ExecuteResult {
        #[serde(default)]
        execution_count: Option<u32>,
        /// Mime type to payload.
        data: BTreeMap<String, Value>,
        #[serde(default)]
        metadata: BTreeMap<String, Value>,
    },
    /// Raised exception.
    Error {
        /// Exception type name.
        ename: String,
        /// Exception message.
        evalue: String,
        /// Formatted traceback lines.
        #[serde(default)]
        traceback: Vec<String>,
    },
    /// Output type not modelled here.
    #[serde(other)]
    Unknown,
}

impl Output {
    /// `stderr` stream output.
    #[must_use]
    pub fn stderr(text: &str) -> Self {
        Self::Stream {
            name: "stderr".to_owned(),
            text: text.into(),
        }
    }

    /// Error output with a single-line traceback.
    #[must_use]
    pub fn error(ename: &str, evalue: &str) -> Self {
        Self::Error {
            ename: ename.to_owned(),
            evalue: evalue.to_owned(),
            traceback: Vec::new(),
        }
    }

    /// Whether this output reports an exception.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Text payload of a mime bundle entry (string or list of lines).
#[must_use]
pub fn mime_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(lines) => Some(lines.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

/// A notebook cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// `code`, `markdown` or `raw`.
    pub cell_type: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub source: MultilineText,
    #[serde(default)]
    pub execution_count: Option<u32>,
    #[serde(default)]
    pub outputs: CellOutputs,
}

impl Cell {
    /// Unexecuted code cell.
    #[must_use]
    pub fn code(source: &str) -> Self {
        Self {
            cell_type: "code".to_owned(),
            metadata: BTreeMap::new(),
            source: source.into(),
            execution_count: None,
            outputs: Vec::new(),
        }
    }
}

/// An nbformat v4 notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub nbformat: u32,
    pub nbformat_minor: u32,
}

impl Notebook {
    /// Notebook with one code cell per source, for `kernel`.
    #[must_use]
    pub fn from_sources(sources: &[String], kernel: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "kernelspec".to_owned(),
            serde_json::json!({ "name": kernel, "display_name": kernel }),
        );
        Self {
            cells: sources.iter().map(|s| Cell::code(s)).collect(),
            metadata,
            nbformat: 4,
            nbformat_minor: 4,
        }
    }

    /// Outputs of code cells, in order.
    #[must_use]
    pub fn code_outputs(&self) -> Vec<CellOutputs> {
        self.cells
            .iter()
            .filter(|c| c.cell_type == "code")
            .map(|c| c.outputs.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_executed_notebook() {
        let json = r##"{
  "cells": [
    {
      "cell_type": "code",
      "execution_count": 1,
      "id": "abc",
      "metadata": {},
      "outputs": [
        {"name": "stdout", "output_type": "stream", "text": ["1\n", "2\n"]},
        {"data": {"text/plain": ["42"]}, "execution_count": 1, "metadata": {}, "output_type": "execute_result"},
        {"output_type": "update_display_data", "data": {}, "metadata": {}}
      ],
      "source": ["x = 42\n", "x"]
    },
    {"cell_type": "markdown", "metadata": {}, "source": "# note"}
  ],
  "metadata": {"language_info": {"name": "python"}},
  "nbformat": 4,
  "nbformat_minor": 5
}"##;
        let nb: Notebook = serde_json::from_str(json).unwrap();
        assert_eq!(nb.cells.len(), 2);
        assert_eq!(nb.cells[0].source.text(), "x = 42\nx");

        let outputs = nb.code_outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(
            outputs[0][0],
            Output::Stream {
                name: "stdout".to_owned(),
                text: MultilineText::Many(vec!["1\n".to_owned(), "2\n".to_owned()]),
            }
        );
        assert!(matches!(outputs[0][1], Output::ExecuteResult { .. }));
        assert_eq!(outputs[0][2], Output::Unknown);
    }

    #[test]
    fn test_from_sources_shape() {
        let nb = Notebook::from_sources(&["a = 1".to_owned(), "a".to_owned()], "python3");
        let value = serde_json::to_value(&nb).unwrap();
        assert_eq!(value["nbformat"], 4);
        assert_eq!(value["cells"][1]["cell_type"], "code");
        assert_eq!(value["cells"][1]["source"], "a");
        assert_eq!(value["metadata"]["kernelspec"]["name"], "python3");
    }

    #[test]
    fn test_error_output_roundtrip_tag() {
        let value = serde_json::to_value(Output::error("ValueError", "bad")).unwrap();
        assert_eq!(value["output_type"], "error");
        assert_eq!(value["ename"], "ValueError");
    }

    #[test]
    fn test_mime_text_variants() {
        assert_eq!(mime_text(&Value::from("x")), Some("x".to_owned()));
        assert_eq!(
            mime_text(&serde_json::json!(["a", "b"])),
            Some("ab".to_owned())
        );
        assert_eq!(mime_text(&serde_json::json!({"k": 1})), None);
    }
}
