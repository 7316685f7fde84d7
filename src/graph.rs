//! Validated axis dependency forest
//!
//! An [AxisGraph] is an arena of [AxisRecord]s kept in input order. Parent and
//! children links are indices into the arena, the parent link being the resolved
//! `depends_on` reference of the record.

use std::collections::{BTreeMap, HashMap};

use crate::{
    axis::{AxisRecord, Equipment},
    diagnostic::Diagnostics,
};

mod builder;
pub use builder::{ConfigError, GraphBuilder};

/// The axis description did not validate
#[derive(Debug, thiserror::Error)]
#[error("invalid axis description: {}", .0.summary())]
pub struct GraphError(pub Diagnostics);
impl GraphError {
    /// All the diagnostics, warnings included
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.0
    }
}

/// An axis with its resolved position in the dependency forest
#[derive(Debug, Clone, PartialEq)]
pub struct AxisNode {
    record: AxisRecord,
    position: usize,
    parent: Option<usize>,
    depth: usize,
    children: Vec<usize>,
}
impl AxisNode {
    pub fn record(&self) -> &AxisRecord {
        &self.record
    }
    pub fn id(&self) -> &str {
        &self.record.id
    }
    pub fn equipment(&self) -> Equipment {
        self.record.equipment
    }
    /// 1-based position of the axis in the input sequence
    pub fn position(&self) -> usize {
        self.position + 1
    }
    /// Number of `depends_on` hops to the root, roots being at depth 0
    pub fn depth(&self) -> usize {
        self.depth
    }
    pub fn parent_id(&self) -> Option<&str> {
        self.record.depends_on.as_axis()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisGraph {
    nodes: Vec<AxisNode>,
    index: HashMap<String, usize>,
    warnings: Diagnostics,
}
impl AxisGraph {
    /// Validates the records with the default [GraphBuilder] settings
    pub fn build<I>(records: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = AxisRecord>,
    {
        GraphBuilder::default().build(records)
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
    /// Warnings found during validation
    pub fn warnings(&self) -> &Diagnostics {
        &self.warnings
    }
    /// Axis nodes in input order
    pub fn nodes(&self) -> impl Iterator<Item = &AxisNode> {
        self.nodes.iter()
    }
    /// Axis records in input order
    pub fn records(&self) -> impl Iterator<Item = &AxisRecord> {
        self.nodes.iter().map(|node| &node.record)
    }
    /// Exact, case-sensitive, lookup
    pub fn get(&self, id: &str) -> Option<&AxisNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }
    /// Lookup by name, falling back to a case-insensitive match
    ///
    /// This is how axis names found in image headers are matched against the
    /// geometry description.
    pub fn find(&self, name: &str) -> Option<&AxisNode> {
        self.get(name).or_else(|| {
            self.nodes
                .iter()
                .find(|node| node.id().eq_ignore_ascii_case(name))
        })
    }
    pub fn parent(&self, id: &str) -> Option<&AxisNode> {
        self.get(id)
            .and_then(|node| node.parent)
            .map(|i| &self.nodes[i])
    }
    /// Direct children in input order
    pub fn children(&self, id: &str) -> Vec<&AxisNode> {
        self.get(id).map_or_else(Vec::new, |node| {
            node.children.iter().map(|&i| &self.nodes[i]).collect()
        })
    }
    pub fn depth(&self, id: &str) -> Option<usize> {
        self.get(id).map(AxisNode::depth)
    }
    /// Axes depending on `.`
    pub fn roots(&self) -> impl Iterator<Item = &AxisNode> {
        self.nodes.iter().filter(|node| node.parent.is_none())
    }
    /// Axes starting a chain of `equipment`: roots, or axes hanging off another equipment
    pub fn chain_roots(&self, equipment: Equipment) -> impl Iterator<Item = &AxisNode> {
        self.nodes
            .iter()
            .filter(move |node| node.equipment() == equipment && self.is_chain_root(node))
    }
    fn is_chain_root(&self, node: &AxisNode) -> bool {
        node.parent
            .map_or(true, |p| self.nodes[p].equipment() != node.equipment())
    }
    /// Axis ids grouped by equipment, in input order within a group
    pub fn equipment_groups(&self) -> BTreeMap<Equipment, Vec<&str>> {
        let mut groups: BTreeMap<Equipment, Vec<&str>> = BTreeMap::new();
        for node in self.nodes.iter() {
            groups.entry(node.equipment()).or_default().push(node.id());
        }
        groups
    }
    /// Root-to-leaf ordering of the axes of one equipment
    ///
    /// Transformations are composed in this order: every axis comes after its parent.
    /// Siblings follow the input order.
    pub fn chain_from_root(&self, equipment: Equipment) -> Vec<&AxisRecord> {
        let mut chain = Vec::new();
        let mut stack: Vec<usize> = self
            .chain_roots(equipment)
            .map(|node| node.position)
            .collect();
        stack.reverse();
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            chain.push(&node.record);
            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .filter(|&&c| self.nodes[c].equipment() == equipment),
            );
        }
        chain
    }
    /// Axes from `id` up to its root, `id` first
    pub fn path_to_root(&self, id: &str) -> Vec<&AxisRecord> {
        let mut path = Vec::new();
        let mut current = self.index.get(id).copied();
        while let Some(i) = current {
            let node = &self.nodes[i];
            path.push(&node.record);
            current = node.parent;
        }
        path
    }
}
