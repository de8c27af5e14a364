//! The course-structure lookup table.
//!
//! Built once per course run by an external step from the course outline and
//! shared read-only across every user. Each node is addressable two ways:
//!
//! * by its composite `"{parent_hex}/{child_index}"` key, used to descend the
//!   hierarchy from a branch to its n-th child;
//! * by its own hex id, used to attach order and parent to a resolved leaf.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::module_key::ModuleKey;

// ── CourseStructureNode ───────────────────────────────────────────────────────

/// One node of the course hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStructureNode {
    /// Full module key (or a bare hex id).
    pub id: String,
    /// Composite `"{parent_hex}/{child_index}"` key; absent for the course root.
    #[serde(default)]
    pub parent_key: Option<String>,
    /// Tree depth: 1 for the course root, deepest for content leaves.
    pub depth: u32,
    /// Sequence order within the course. Only content leaves carry one.
    #[serde(default)]
    pub order: Option<u32>,
    pub module_type: String,
}

impl CourseStructureNode {
    /// The node's hex id, parsed from `id` when it is a compound key.
    pub fn hex_id(&self) -> &str {
        hex_of(&self.id)
    }

    /// Hex id of the parent node, taken from the composite key.
    pub fn parent_hex_id(&self) -> Option<&str> {
        let key = self.parent_key.as_deref()?;
        let parent = key.split_once('/').map(|(p, _)| p).unwrap_or(key);
        if parent.is_empty() {
            None
        } else {
            Some(parent)
        }
    }

    pub fn has_order(&self) -> bool {
        self.order.is_some()
    }
}

/// Hex-id portion of a compound key, or the key itself.
fn hex_of(id: &str) -> &str {
    if let Some((_, hex)) = id.rsplit_once("+block@") {
        return hex;
    }
    if id.starts_with("i4x://") {
        if let Some((_, hex)) = id.rsplit_once('/') {
            return hex;
        }
    }
    id
}

// ── CourseStructure ───────────────────────────────────────────────────────────

/// Indexed, immutable view of all nodes for one course run.
#[derive(Debug, Clone, Default)]
pub struct CourseStructure {
    nodes: Vec<CourseStructureNode>,
    by_parent_key: HashMap<String, usize>,
    by_hex: HashMap<String, usize>,
}

impl CourseStructure {
    /// Index `nodes`. On duplicate keys the first node wins.
    pub fn from_nodes(nodes: Vec<CourseStructureNode>) -> Self {
        let mut by_parent_key = HashMap::with_capacity(nodes.len());
        let mut by_hex = HashMap::with_capacity(nodes.len());

        for (idx, node) in nodes.iter().enumerate() {
            if let Some(key) = &node.parent_key {
                if by_parent_key.contains_key(key) {
                    debug!("duplicate structure key {}, keeping first", key);
                } else {
                    by_parent_key.insert(key.clone(), idx);
                }
            }
            let hex = node.hex_id().to_string();
            by_hex.entry(hex).or_insert(idx);
        }

        Self {
            nodes,
            by_parent_key,
            by_hex,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[CourseStructureNode] {
        &self.nodes
    }

    /// The `child_index`-th child of the branch with id `parent_hex`.
    pub fn child(&self, parent_hex: &str, child_index: &str) -> Option<&CourseStructureNode> {
        let key = format!("{}/{}", parent_hex, child_index);
        self.by_parent_key.get(&key).map(|&idx| &self.nodes[idx])
    }

    /// The node whose own hex id is `hex`.
    pub fn by_hex(&self, hex: &str) -> Option<&CourseStructureNode> {
        self.by_hex.get(hex).map(|&idx| &self.nodes[idx])
    }

    /// The node a full module key refers to.
    pub fn by_module_key(&self, key: &str) -> Option<&CourseStructureNode> {
        match ModuleKey::parse(key) {
            Some(parsed) => self.by_hex(&parsed.hex_id),
            None => self.by_hex(key),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
