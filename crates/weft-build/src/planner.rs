//! Build planning over the include graph.

use std::collections::{BTreeSet, HashSet};

use crate::include_graph::IncludeGraph;

/// Files to build and the order to build them in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    /// Every file reachable from the planned roots.
    pub reachable: BTreeSet<String>,
    /// Leaves first: each file after everything it includes.
    pub order: Vec<String>,
}

/// Plan a build of `roots`.
///
/// The order is a depth-first post-order from each root in turn; a file
/// reachable along several paths appears once, at its first completion.
#[must_use]
pub fn plan(roots: &[String], graph: &IncludeGraph) -> BuildPlan {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    for root in roots {
        visit(root, graph, &mut visited, &mut order);
    }
    BuildPlan {
        reachable: order.iter().cloned().collect(),
        order,
    }
}

fn visit(file: &str, graph: &IncludeGraph, visited: &mut HashSet<String>, order: &mut Vec<String>) {
    if !visited.insert(file.to_owned()) {
        return;
    }
    for child in graph.includes(file) {
        visit(child, graph, visited, order);
    }
    order.push(file.to_owned());
}

/// Roots whose output depends on any of `changed`.
///
/// Walks the reverse adjacency from each changed file and keeps the files
/// that are declared roots, in declaration order. Without a changed set every
/// root is affected.
#[must_use]
pub fn affected_roots(changed: Option<&[String]>, graph: &IncludeGraph) -> Vec<String> {
    let Some(changed) = changed else {
        return graph.roots().to_vec();
    };

    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = changed.iter().map(String::as_str).collect();
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        stack.extend(graph.includers(current).iter().map(String::as_str));
    }

    graph
        .roots()
        .iter()
        .filter(|root| seen.contains(root.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::include_graph::analyze_includes;
    use crate::test_support::project;

    fn graph(files: &[(&str, &str)], roots: &[&str]) -> (IncludeGraph, Vec<String>) {
        let tmp = project(files);
        let roots: Vec<String> = roots.iter().map(|s| (*s).to_owned()).collect();
        (analyze_includes(tmp.path(), &roots).unwrap(), roots)
    }

    fn diamond() -> (IncludeGraph, Vec<String>) {
        graph(
            &[
                ("r1.qmd", "{{< include a.qmd >}}\n{{< include b.qmd >}}"),
                ("r2.qmd", "{{< include c.qmd >}}"),
                ("a.qmd", "{{< include leaf.qmd >}}"),
                ("b.qmd", "{{< include leaf.qmd >}}"),
                ("c.qmd", "only r2"),
                ("leaf.qmd", "shared"),
                ("draft.qmd", "{{< include leaf.qmd >}}"),
            ],
            &["r1.qmd", "r2.qmd"],
        )
    }

    #[test]
    fn test_order_places_dependencies_first() {
        let (graph, roots) = diamond();
        let plan = plan(&roots, &graph);
        assert_eq!(
            plan.order,
            vec!["leaf.qmd", "a.qmd", "b.qmd", "r1.qmd", "c.qmd", "r2.qmd"]
        );

        let position = |f: &str| plan.order.iter().position(|o| o == f).unwrap();
        for file in &plan.order {
            for child in graph.includes(file) {
                assert!(position(child) < position(file), "{child} before {file}");
            }
        }
    }

    #[test]
    fn test_reachable_excludes_drafts() {
        let (graph, roots) = diamond();
        let plan = plan(&roots, &graph);
        assert_eq!(plan.reachable.len(), 6);
        assert!(!plan.reachable.contains("draft.qmd"));
    }

    #[test]
    fn test_affected_by_shared_leaf() {
        let (graph, _) = diamond();
        let changed = vec!["leaf.qmd".to_owned()];
        assert_eq!(affected_roots(Some(&changed), &graph), vec!["r1.qmd"]);
    }

    #[test]
    fn test_affected_only_owner_of_leaf() {
        let (graph, _) = diamond();
        let changed = vec!["c.qmd".to_owned()];
        assert_eq!(affected_roots(Some(&changed), &graph), vec!["r2.qmd"]);
    }

    #[test]
    fn test_changed_root_affects_itself() {
        let (graph, _) = diamond();
        let changed = vec!["r2.qmd".to_owned()];
        assert_eq!(affected_roots(Some(&changed), &graph), vec!["r2.qmd"]);
    }

    #[test]
    fn test_unreachable_changes_affect_nothing() {
        let (graph, _) = diamond();
        let changed = vec!["draft.qmd".to_owned(), "nowhere.qmd".to_owned()];
        assert!(affected_roots(Some(&changed), &graph).is_empty());
    }

    #[test]
    fn test_no_changed_set_means_all_roots() {
        let (graph, roots) = diamond();
        assert_eq!(affected_roots(None, &graph), roots);
    }

    #[test]
    fn test_cycle_terminates() {
        let (graph, roots) = graph(
            &[
                ("r.qmd", "{{< include a.qmd >}}"),
                ("a.qmd", "{{< include b.qmd >}}"),
                ("b.qmd", "{{< include a.qmd >}}"),
            ],
            &["r.qmd"],
        );
        assert_eq!(plan(&roots, &graph).order, vec!["b.qmd", "a.qmd", "r.qmd"]);
        let changed = vec!["b.qmd".to_owned()];
        assert_eq!(affected_roots(Some(&changed), &graph), vec!["r.qmd"]);
    }
}
