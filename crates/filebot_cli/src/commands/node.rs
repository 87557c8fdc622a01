//! Get and order command implementations.

use super::open_journal;
use crate::error::CliResult;
use crate::output::Render;
use filebot_storage::{render_reference, GlobalStore};
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;

/// One node read by `get`.
#[derive(Debug, Serialize)]
pub struct NodeValue {
    /// The node in `^G(sub,...)` form.
    pub reference: String,
    /// `$DATA` code: 0, 1, 10 or 11.
    pub data: u8,
    /// Value, if the node holds one.
    pub value: Option<String>,
}

impl Render for NodeValue {
    fn render_text(&self) -> String {
        match &self.value {
            Some(v) => format!("{}={v:?}\n", self.reference),
            None => format!("{} is undefined ($DATA={})\n", self.reference, self.data),
        }
    }
}

/// One child visited by `order`.
#[derive(Debug, Serialize)]
pub struct Child {
    /// Subscript at the walked level.
    pub subscript: String,
    /// `$DATA` code of the child.
    pub data: u8,
    /// Value of the child, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// The subscripts under one node.
#[derive(Debug, Serialize)]
pub struct Listing {
    /// The parent node.
    pub parent: String,
    /// Children in walk order.
    pub children: Vec<Child>,
    /// True if the limit stopped the walk early.
    pub truncated: bool,
}

impl Render for Listing {
    fn render_text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            let _ = write!(out, "{} ({})", child.subscript, child.data);
            if let Some(v) = &child.value {
                let _ = write!(out, " = {v:?}");
            }
            let _ = writeln!(out);
        }
        if self.truncated {
            let _ = writeln!(out, "...");
        }
        out
    }
}

fn borrowed(subscripts: &[String]) -> Vec<&str> {
    subscripts.iter().map(String::as_str).collect()
}

/// Runs the get command.
pub fn get(path: &Path, global: &str, subscripts: &[String]) -> CliResult<NodeValue> {
    let store = open_journal(path)?;
    let subs = borrowed(subscripts);
    Ok(NodeValue {
        reference: render_reference(global, &subs),
        data: store.data(global, &subs)?.code(),
        value: store.get(global, &subs)?,
    })
}

/// Runs the order command.
pub fn order(
    path: &Path,
    global: &str,
    subscripts: &[String],
    reverse: bool,
    limit: Option<usize>,
) -> CliResult<Listing> {
    let store = open_journal(path)?;
    let parent = borrowed(subscripts);
    let mut children = Vec::new();
    let mut truncated = false;
    let mut current = String::new();

    loop {
        let mut probe = parent.clone();
        probe.push(&current);
        let next = if reverse {
            store.order_reverse(global, &probe)?
        } else {
            store.order(global, &probe)?
        };
        let Some(next) = next else { break };
        if limit.is_some_and(|l| children.len() >= l) {
            truncated = true;
            break;
        }

        let mut node = parent.clone();
        node.push(&next);
        let state = store.data(global, &node)?;
        let value = if state.has_value() {
            store.get(global, &node)?
        } else {
            None
        };
        children.push(Child {
            data: state.code(),
            value,
            subscript: next.clone(),
        });
        current = next;
    }

    Ok(Listing {
        parent: render_reference(global, &parent),
        children,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::patient_journal;

    fn owned(subs: &[&str]) -> Vec<String> {
        subs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn get_reads_one_node() {
        let (_dir, path) = patient_journal();
        let node = get(&path, "^DPT", &owned(&["2", ".01"])).unwrap();
        assert_eq!(node.reference, r#"^DPT(2,.01)"#);
        assert_eq!(node.value.as_deref(), Some("DOE,JANE"));
        assert_eq!(node.data, 1);

        let record = get(&path, "DPT", &owned(&["2"])).unwrap();
        assert_eq!(record.data, 10);
        assert!(record.value.is_none());
    }

    #[test]
    fn order_walks_in_collation_order() {
        let (_dir, path) = patient_journal();
        let top = order(&path, "DPT", &[], false, None).unwrap();
        let subs: Vec<_> = top.children.iter().map(|c| c.subscript.as_str()).collect();
        assert_eq!(subs, ["0", "1", "2", "3", "B", "SSN"]);
        assert_eq!(top.children[0].data, 1);

        let names = order(&path, "DPT", &owned(&["B"]), false, None).unwrap();
        let subs: Vec<_> = names.children.iter().map(|c| c.subscript.as_str()).collect();
        assert_eq!(subs, ["DOE,JANE", "SMITH,ANNA", "SMITH,JOHN"]);
    }

    #[test]
    fn order_reverse_and_limit() {
        let (_dir, path) = patient_journal();
        let listing = order(&path, "DPT", &[], true, Some(2)).unwrap();
        let subs: Vec<_> = listing.children.iter().map(|c| c.subscript.as_str()).collect();
        assert_eq!(subs, ["SSN", "B"]);
        assert!(listing.truncated);
        assert!(listing.render_text().ends_with("...\n"));
    }
}
