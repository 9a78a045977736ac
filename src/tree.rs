// SPDX-License-Identifier: MPL-2.0

//! Multi-parent dependency tree rooted at `/`.
//!
//! Nodes live in an arena and are identified by `(name, epoch)`.
//! A name has at most one live node. When the version chosen for a name
//! is invalidated, its subtree is detached and the node is replaced
//! by a fresh one with the next epoch, keeping the same parents.
//! Edges only ever point at live nodes, so no reference cycle exists
//! and attaching an edge that would close a cycle is refused.

use std::fmt::Write;

use log::debug;

use crate::internal::arena::{Arena, Id};
use crate::type_aliases::{Map, OrderedSet, Set};

/// Name of the synthetic root.
pub const ROOT: &str = "/";

/// Identifier of a node of the tree.
pub type NodeId = Id<Node>;

/// A package instantiation in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Package name.
    pub name: String,
    /// Instantiation counter, incremented at each recomputation.
    pub epoch: u32,
    parents: Vec<NodeId>,
    children: Vec<NodeId>,
    live: bool,
}

impl Node {
    fn new(name: &str, epoch: u32, parents: Vec<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            epoch,
            parents,
            children: Vec::new(),
            live: true,
        }
    }

    /// Whether this instantiation is still part of the tree.
    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// The dependency tree.
#[derive(Debug, Clone)]
pub struct DependencyTree {
    nodes: Arena<Node>,
    node_map: Map<String, Vec<NodeId>>,
    root: NodeId,
}

impl Default for DependencyTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyTree {
    /// A tree made only of its root.
    pub fn new() -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::new(ROOT, 0, Vec::new()));
        let mut node_map = Map::default();
        node_map.insert(ROOT.to_string(), vec![root]);
        Self {
            nodes,
            node_map,
            root,
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Access a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Live nodes carrying `name`.
    pub fn nodes(&self, name: &str) -> Vec<NodeId> {
        self.node_map
            .get(name)
            .map(|ids| ids.iter().copied().filter(|id| self.nodes[*id].live).collect())
            .unwrap_or_default()
    }

    fn live(&self, name: &str) -> Option<NodeId> {
        self.node_map
            .get(name)
            .and_then(|ids| ids.last().copied())
            .filter(|id| self.nodes[*id].live)
    }

    /// Whether a live node carries `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.live(name).is_some()
    }

    /// Add an edge from the live node of `parent_name` to the one of `child_name`,
    /// creating the child node if needed.
    ///
    /// Returns `false` when nothing was added: the parent is not in the tree,
    /// the edge already exists, or it would close a cycle.
    pub fn attach(&mut self, parent_name: &str, child_name: &str) -> bool {
        let Some(parent) = self.live(parent_name) else {
            debug!("Not attaching {}: parent {} is not in the tree", child_name, parent_name);
            return false;
        };
        let child = match self.live(child_name) {
            Some(child) => {
                if self.nodes[parent].children.contains(&child) {
                    return false;
                }
                if child == parent || self.reaches(child, parent) {
                    debug!("Not attaching {} under {}: cycle", child_name, parent_name);
                    return false;
                }
                self.nodes[child].parents.push(parent);
                child
            }
            None => self.instantiate(child_name, vec![parent]),
        };
        self.nodes[parent].children.push(child);
        debug!("Edge {} -> {}", parent_name, child_name);
        true
    }

    fn instantiate(&mut self, name: &str, parents: Vec<NodeId>) -> NodeId {
        let epoch = self
            .node_map
            .get(name)
            .and_then(|ids| ids.last())
            .map(|id| self.nodes[*id].epoch + 1)
            .unwrap_or(0);
        let id = self.nodes.alloc(Node::new(name, epoch, parents));
        self.node_map.entry(name.to_string()).or_default().push(id);
        id
    }

    /// Whether `to` is a descendant of `from`.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen: Set<NodeId> = Set::default();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if seen.insert(id) {
                stack.extend(self.nodes[id].children.iter().copied());
            }
        }
        false
    }

    /// Every name below the live nodes of `name`, in pre-order, without repetition.
    pub fn subtree_names(&self, name: &str) -> Vec<String> {
        let mut out: OrderedSet<String> = OrderedSet::default();
        let mut seen: Set<NodeId> = Set::default();
        for start in self.nodes(name) {
            let mut stack: Vec<NodeId> = self.nodes[start].children.iter().rev().copied().collect();
            while let Some(id) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                out.insert(self.nodes[id].name.clone());
                stack.extend(self.nodes[id].children.iter().rev().copied());
            }
        }
        out.into_iter().collect()
    }

    /// Cut every edge below the live node of `name`.
    ///
    /// Children left without any parent are removed from the tree together
    /// with their own descendants in the same situation. The node of `name`
    /// is replaced by a new instantiation with the same parents.
    /// Returns the names of the removed nodes, in discovery order.
    pub fn detach_subtree(&mut self, name: &str) -> Vec<String> {
        let Some(old) = self.live(name) else {
            return Vec::new();
        };
        let mut orphans = Vec::new();
        let mut pending = vec![old];
        while let Some(id) = pending.pop() {
            let children = std::mem::take(&mut self.nodes[id].children);
            for child in children {
                let node = &mut self.nodes[child];
                node.parents.retain(|p| *p != id);
                if node.parents.is_empty() && node.live {
                    node.live = false;
                    debug!("Orphaned {} (epoch {})", node.name, node.epoch);
                    orphans.push(node.name.clone());
                    pending.push(child);
                }
            }
        }
        self.renew(old);
        orphans
    }

    /// Swap a live node for a fresh instantiation with the same parents.
    fn renew(&mut self, old: NodeId) {
        if old == self.root {
            return;
        }
        let parents = std::mem::take(&mut self.nodes[old].parents);
        self.nodes[old].live = false;
        let name = self.nodes[old].name.clone();
        let new = self.instantiate(&name, parents.clone());
        for parent in parents {
            for child in self.nodes[parent].children.iter_mut() {
                if *child == old {
                    *child = new;
                }
            }
        }
    }

    /// Remove the live node of `name` and the edges leading to it.
    /// Its descendants are detached as in [detach_subtree](Self::detach_subtree).
    pub fn remove(&mut self, name: &str) -> Vec<String> {
        let orphans = self.detach_subtree(name);
        if let Some(id) = self.live(name) {
            let parents = std::mem::take(&mut self.nodes[id].parents);
            for parent in parents {
                self.nodes[parent].children.retain(|c| *c != id);
            }
            self.nodes[id].live = false;
        }
        orphans
    }

    /// Names of the parents of the live node of `name`.
    pub fn parents(&self, name: &str) -> Vec<&str> {
        self.live(name)
            .map(|id| {
                self.nodes[id]
                    .parents
                    .iter()
                    .map(|p| self.nodes[*p].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of the children of the live node of `name`.
    pub fn children(&self, name: &str) -> Vec<&str> {
        self.live(name)
            .map(|id| {
                self.nodes[id]
                    .children
                    .iter()
                    .map(|c| self.nodes[*c].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Live names other than the root, in breadth first order from the root.
    pub fn names(&self) -> Vec<String> {
        let mut out: OrderedSet<String> = OrderedSet::default();
        let mut queue = std::collections::VecDeque::from([self.root]);
        while let Some(id) = queue.pop_front() {
            for child in &self.nodes[id].children {
                if out.insert(self.nodes[*child].name.clone()) {
                    queue.push_back(*child);
                }
            }
        }
        out.into_iter().collect()
    }

    /// Length of the longest path from the root to each live name.
    pub fn depths(&self) -> Map<String, usize> {
        let mut memo: Map<NodeId, usize> = Map::default();
        memo.insert(self.root, 0);
        let mut out = Map::default();
        for name in self.names() {
            if let Some(id) = self.live(&name) {
                let depth = self.depth_of(id, &mut memo);
                out.insert(name, depth);
            }
        }
        out
    }

    fn depth_of(&self, id: NodeId, memo: &mut Map<NodeId, usize>) -> usize {
        if let Some(depth) = memo.get(&id) {
            return *depth;
        }
        let depth = self.nodes[id]
            .parents
            .iter()
            .map(|p| self.depth_of(*p, memo) + 1)
            .max()
            .unwrap_or(0);
        memo.insert(id, depth);
        depth
    }

    /// Number of nodes ever allocated, dead ones included.
    pub fn allocated(&self) -> usize {
        self.nodes.len()
    }

    /// Textual rendering with box-drawing characters, labelling nodes by name.
    pub fn render(&self) -> String {
        self.render_with(|name| name.to_string())
    }

    /// Textual rendering with box-drawing characters.
    ///
    /// A subtree reached through several parents is only expanded once,
    /// later occurrences are marked with `(*)`.
    pub fn render_with(&self, label: impl Fn(&str) -> String) -> String {
        let mut out = String::from(ROOT);
        out.push('\n');
        let mut expanded: Set<NodeId> = Set::default();
        self.render_children(self.root, "", &label, &mut expanded, &mut out);
        out
    }

    fn render_children(
        &self,
        id: NodeId,
        prefix: &str,
        label: &impl Fn(&str) -> String,
        expanded: &mut Set<NodeId>,
        out: &mut String,
    ) {
        let children = &self.nodes[id].children;
        for (i, child) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            let node = &self.nodes[*child];
            let (branch, indent) = if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            let repeated = !node.children.is_empty() && !expanded.insert(*child);
            let _ = writeln!(
                out,
                "{}{}{}{}",
                prefix,
                branch,
                label(&node.name),
                if repeated { " (*)" } else { "" }
            );
            if !repeated {
                self.render_children(*child, &format!("{}{}", prefix, indent), label, expanded, out);
            }
        }
    }
}

// TESTS #######################################################################

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DependencyTree {
        let mut tree = DependencyTree::new();
        assert!(tree.attach(ROOT, "a"));
        assert!(tree.attach("a", "b"));
        assert!(tree.attach("a", "e"));
        assert!(tree.attach("e", "b"));
        assert!(tree.attach("b", "c"));
        tree
    }

    #[test]
    fn multiple_parents() {
        let mut tree = sample();
        assert_eq!(tree.parents("b"), vec!["a", "e"]);
        assert_eq!(tree.nodes("b").len(), 1);
        assert!(!tree.attach("a", "b"));
        assert_eq!(tree.subtree_names("a"), vec!["b", "c", "e"]);
    }

    #[test]
    fn cycles_are_refused() {
        let mut tree = sample();
        assert!(!tree.attach("c", "a"));
        assert!(!tree.attach("c", "c"));
        assert!(tree.children("c").is_empty());
    }

    #[test]
    fn detach_renews_the_node() {
        let mut tree = sample();
        let before = tree.nodes("b")[0];
        assert_eq!(tree.detach_subtree("b"), vec!["c"]);
        let after = tree.nodes("b")[0];
        assert_ne!(before, after);
        assert_eq!(tree.node(after).epoch, 1);
        assert!(!tree.node(before).is_live());
        assert_eq!(tree.parents("b"), vec!["a", "e"]);
        assert!(!tree.contains("c"));
        assert_eq!(tree.children("a"), vec!["b", "e"]);
        // Re-discovery starts a new epoch.
        assert!(tree.attach("b", "c"));
        assert_eq!(tree.node(tree.nodes("c")[0]).epoch, 1);
    }

    #[test]
    fn detach_keeps_shared_children() {
        let mut tree = sample();
        assert!(tree.attach(ROOT, "c"));
        assert_eq!(tree.detach_subtree("a"), vec!["e", "b"]);
        assert!(tree.contains("a"));
        assert!(tree.contains("c"));
        assert!(!tree.contains("e"));
        assert!(!tree.contains("b"));
    }

    #[test]
    fn longest_path_depth() {
        let tree = sample();
        let depths = tree.depths();
        assert_eq!(depths["a"], 1);
        assert_eq!(depths["e"], 2);
        assert_eq!(depths["b"], 3);
        assert_eq!(depths["c"], 4);
        assert_eq!(tree.names(), vec!["a", "b", "e", "c"]);
    }

    #[test]
    fn render_marks_repeated_subtrees() {
        let tree = sample();
        let expected = "\
/
└── a
    ├── b
    │   └── c
    └── e
        └── b (*)
";
        assert_eq!(tree.render(), expected);
    }
}
