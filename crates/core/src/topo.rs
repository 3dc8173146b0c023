#![forbid(unsafe_code)]

use std::collections::HashMap;

use indexmap::IndexMap;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TopoError {
    Missing { source: String, target: String },
    Circular(String),
}

#[derive(Clone, Copy)]
enum Mark {
    Visiting,
    Done,
}

/// Orders `graph` so every node follows its dependencies. Ties keep
/// insertion order.
pub(crate) fn sort(graph: &IndexMap<String, Vec<String>>) -> Result<Vec<String>, TopoError> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(graph.len());
    let mut order = Vec::with_capacity(graph.len());

    for start in graph.keys() {
        if marks.contains_key(start.as_str()) {
            continue;
        }
        marks.insert(start, Mark::Visiting);
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];

        while let Some(&(node, index)) = stack.last() {
            let deps = graph.get(node).map(Vec::as_slice).unwrap_or_default();
            let Some(dep) = deps.get(index) else {
                marks.insert(node, Mark::Done);
                order.push(node.to_string());
                stack.pop();
                continue;
            };
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            match marks.get(dep.as_str()) {
                Some(Mark::Done) => {}
                Some(Mark::Visiting) => return Err(TopoError::Circular(dep.clone())),
                None => {
                    let Some((key, _)) = graph.get_key_value(dep) else {
                        return Err(TopoError::Missing {
                            source: node.to_string(),
                            target: dep.clone(),
                        });
                    };
                    marks.insert(key, Mark::Visiting);
                    stack.push((key.as_str(), 0));
                }
            }
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> IndexMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(node, deps)| {
                (
                    node.to_string(),
                    deps.iter().map(|dep| dep.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn dependencies_come_first() {
        let order = sort(&graph(&[("c", &["b"]), ("a", &[]), ("b", &["a"])])).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn independent_nodes_keep_insertion_order() {
        let order = sort(&graph(&[("x", &[]), ("y", &[]), ("z", &["x"])])).unwrap();
        assert_eq!(order, vec!["x", "y", "z"]);
    }

    #[test]
    fn missing_nodes_are_reported_with_their_source() {
        let err = sort(&graph(&[("a", &["ghost"])])).unwrap_err();
        assert_eq!(
            err,
            TopoError::Missing {
                source: "a".to_string(),
                target: "ghost".to_string()
            }
        );
    }

    #[test]
    fn cycles_are_rejected() {
        assert!(matches!(
            sort(&graph(&[("a", &["b"]), ("b", &["a"])])),
            Err(TopoError::Circular(_))
        ));
        assert!(matches!(sort(&graph(&[("a", &["a"])])), Err(TopoError::Circular(_))));
    }
}
