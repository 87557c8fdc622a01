//! Sparse ordered tree shared by the in-process backends.

use crate::store::DataState;
use crate::subscript::SubscriptKey;
use std::collections::BTreeMap;
use std::ops::Bound;

/// One node of a global: an optional scalar plus ordered children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Node {
    value: Option<String>,
    children: BTreeMap<SubscriptKey, Node>,
}

impl Node {
    /// A node with neither value nor children does not exist.
    fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    fn count(&self) -> usize {
        usize::from(self.value.is_some()) + self.children.values().map(Node::count).sum::<usize>()
    }

    fn collect(&self, path: &mut Vec<String>, out: &mut Vec<(Vec<String>, String)>) {
        if let Some(value) = &self.value {
            out.push((path.clone(), value.clone()));
        }
        for (key, child) in &self.children {
            path.push(key.as_str().to_string());
            child.collect(path, out);
            path.pop();
        }
    }
}

/// All globals of a store, keyed by bare global name.
///
/// Empty nodes are pruned eagerly so that `data` and `order` never see
/// a node that has neither a value nor descendants.
#[derive(Debug, Default)]
pub(crate) struct GlobalTree {
    globals: BTreeMap<String, Node>,
}

impl GlobalTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, global: &str, subscripts: &[&str]) -> Option<&Node> {
        let mut node = self.globals.get(global)?;
        for sub in subscripts {
            node = node.children.get(&SubscriptKey::new(*sub))?;
        }
        Some(node)
    }

    fn node_mut_or_create(&mut self, global: &str, subscripts: &[&str]) -> &mut Node {
        let mut node = self.globals.entry(global.to_string()).or_default();
        for sub in subscripts {
            node = node.children.entry(SubscriptKey::new(*sub)).or_default();
        }
        node
    }

    pub fn get(&self, global: &str, subscripts: &[&str]) -> Option<&str> {
        self.node(global, subscripts)?.value.as_deref()
    }

    /// Sets the value and returns the previous one.
    pub fn set(&mut self, global: &str, subscripts: &[&str], value: &str) -> Option<String> {
        self.node_mut_or_create(global, subscripts)
            .value
            .replace(value.to_string())
    }

    /// Removes the subtree and returns it.
    pub fn kill(&mut self, global: &str, subscripts: &[&str]) -> Option<Node> {
        if subscripts.is_empty() {
            return self.globals.remove(global);
        }
        let root = self.globals.get_mut(global)?;
        let removed = remove_subtree(root, subscripts);
        if root.is_empty() {
            self.globals.remove(global);
        }
        removed
    }

    /// Clears only the scalar at a node, pruning it if it becomes empty.
    pub fn clear_value(&mut self, global: &str, subscripts: &[&str]) -> Option<String> {
        let root = self.globals.get_mut(global)?;
        let removed = if subscripts.is_empty() {
            root.value.take()
        } else {
            clear_in(root, subscripts)
        };
        if root.is_empty() {
            self.globals.remove(global);
        }
        removed
    }

    /// Replaces whatever is at the path with `node` (or nothing).
    pub fn restore(&mut self, global: &str, subscripts: &[&str], node: Option<Node>) {
        self.kill(global, subscripts);
        let Some(node) = node else { return };
        if node.is_empty() {
            return;
        }
        *self.node_mut_or_create(global, subscripts) = node;
    }

    /// Returns the neighbour of `current` among the children of `parent`.
    pub fn order(
        &self,
        global: &str,
        parent: &[&str],
        current: &str,
        reverse: bool,
    ) -> Option<String> {
        let node = self.node(global, parent)?;
        let found = match (reverse, current.is_empty()) {
            (false, true) => node.children.keys().next(),
            (true, true) => node.children.keys().next_back(),
            (false, false) => node
                .children
                .range((
                    Bound::Excluded(SubscriptKey::new(current)),
                    Bound::Unbounded,
                ))
                .next()
                .map(|(k, _)| k),
            (true, false) => node
                .children
                .range(..SubscriptKey::new(current))
                .next_back()
                .map(|(k, _)| k),
        };
        found.map(|k| k.as_str().to_string())
    }

    pub fn data(&self, global: &str, subscripts: &[&str]) -> DataState {
        match self.node(global, subscripts) {
            Some(node) => DataState::from_flags(node.value.is_some(), !node.children.is_empty()),
            None => DataState::Undefined,
        }
    }

    #[cfg(test)]
    /// Returns a copy of the subtree at the path.
    pub fn snapshot(&self, global: &str, subscripts: &[&str]) -> Option<Node> {
        self.node(global, subscripts).cloned()
    }

    pub fn global_names(&self) -> Vec<String> {
        self.globals.keys().cloned().collect()
    }

    /// Number of nodes holding a value under the global.
    pub fn value_count(&self, global: &str) -> usize {
        self.globals.get(global).map_or(0, Node::count)
    }

    /// Every (subscripts, value) pair under the global, in collation order.
    pub fn entries(&self, global: &str) -> Vec<(Vec<String>, String)> {
        let mut out = Vec::new();
        if let Some(root) = self.globals.get(global) {
            root.collect(&mut Vec::new(), &mut out);
        }
        out
    }
}

fn remove_subtree(node: &mut Node, subscripts: &[&str]) -> Option<Node> {
    let (first, rest) = subscripts.split_first()?;
    let key = SubscriptKey::new(*first);
    if rest.is_empty() {
        return node.children.remove(&key);
    }
    let child = node.children.get_mut(&key)?;
    let removed = remove_subtree(child, rest);
    if child.is_empty() {
        node.children.remove(&key);
    }
    removed
}

fn clear_in(node: &mut Node, subscripts: &[&str]) -> Option<String> {
    let (first, rest) = subscripts.split_first()?;
    let key = SubscriptKey::new(*first);
    let child = node.children.get_mut(&key)?;
    let removed = if rest.is_empty() {
        child.value.take()
    } else {
        clear_in(child, rest)
    };
    if child.is_empty() {
        node.children.remove(&key);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GlobalTree {
        let mut tree = GlobalTree::new();
        tree.set("DPT", &["1", ".01"], "SMITH,JOHN");
        tree.set("DPT", &["2", ".01"], "DOE,JANE");
        tree.set("DPT", &["10", ".01"], "ROE,RICH");
        tree.set("DPT", &["B", "SMITH,JOHN", "1"], "");
        tree
    }

    #[test]
    fn get_and_set() {
        let mut tree = sample();
        assert_eq!(tree.get("DPT", &["1", ".01"]), Some("SMITH,JOHN"));
        assert_eq!(tree.get("DPT", &["1"]), None);
        let previous = tree.set("DPT", &["1", ".01"], "SMITH,JON");
        assert_eq!(previous.as_deref(), Some("SMITH,JOHN"));
    }

    #[test]
    fn data_states() {
        let mut tree = sample();
        tree.set("DPT", &["1"], "header");
        assert_eq!(tree.data("DPT", &["1"]), DataState::Both);
        assert_eq!(tree.data("DPT", &["2"]), DataState::DescendantsOnly);
        assert_eq!(tree.data("DPT", &["2", ".01"]), DataState::ValueOnly);
        assert_eq!(tree.data("DPT", &["3"]), DataState::Undefined);
        assert_eq!(tree.data("NOPE", &[]), DataState::Undefined);
    }

    #[test]
    fn order_walks_in_collation_order() {
        let tree = sample();
        let mut seen = Vec::new();
        let mut current = String::new();
        while let Some(next) = tree.order("DPT", &[], &current, false) {
            seen.push(next.clone());
            current = next;
        }
        assert_eq!(seen, vec!["1", "2", "10", "B"]);
    }

    #[test]
    fn order_reverse_from_end() {
        let tree = sample();
        assert_eq!(tree.order("DPT", &[], "", true).as_deref(), Some("B"));
        assert_eq!(tree.order("DPT", &[], "B", true).as_deref(), Some("10"));
        assert_eq!(tree.order("DPT", &[], "1", true), None);
    }

    #[test]
    fn order_from_missing_subscript() {
        let tree = sample();
        // "5" does not exist but still positions between 2 and 10.
        assert_eq!(tree.order("DPT", &[], "5", false).as_deref(), Some("10"));
    }

    #[test]
    fn kill_prunes_empty_parents() {
        let mut tree = sample();
        tree.kill("DPT", &["B", "SMITH,JOHN", "1"]);
        assert_eq!(tree.data("DPT", &["B"]), DataState::Undefined);
        tree.kill("DPT", &[]);
        assert!(tree.global_names().is_empty());
    }

    #[test]
    fn clear_value_keeps_children() {
        let mut tree = sample();
        tree.set("DPT", &["1"], "header");
        assert_eq!(tree.clear_value("DPT", &["1"]).as_deref(), Some("header"));
        assert_eq!(tree.data("DPT", &["1"]), DataState::DescendantsOnly);
    }

    #[test]
    fn restore_replaces_subtree() {
        let mut tree = sample();
        let saved = tree.snapshot("DPT", &["1"]);
        tree.kill("DPT", &["1"]);
        tree.set("DPT", &["1", ".02"], "M");
        tree.restore("DPT", &["1"], saved);
        assert_eq!(tree.get("DPT", &["1", ".01"]), Some("SMITH,JOHN"));
        assert_eq!(tree.get("DPT", &["1", ".02"]), None);
    }

    #[test]
    fn entries_and_counts() {
        let tree = sample();
        assert_eq!(tree.value_count("DPT"), 4);
        let entries = tree.entries("DPT");
        assert_eq!(entries[0].0, vec!["1".to_string(), ".01".to_string()]);
        assert_eq!(entries.last().unwrap().1, "");
    }
}
