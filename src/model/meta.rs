//! Sharding keys
//!
//! Every edge write fans out to five row shapes. The first four index the
//! edge from either endpoint, optionally narrowed by the other endpoint's
//! type. The fifth keeps every version of one exact `(source, type, target)`.

use serde::{Deserialize, Serialize};

use super::{Edge, Id, MarkedEdge};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum MetaType {
    Source = 0,
    SourceTargetType = 1,
    Target = 2,
    TargetSourceType = 3,
    Versions = 4,
}

impl MetaType {
    pub fn storage_value(self) -> u8 {
        self as u8
    }

    pub fn from_storage_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(MetaType::Source),
            1 => Some(MetaType::SourceTargetType),
            2 => Some(MetaType::Target),
            3 => Some(MetaType::TargetSourceType),
            4 => Some(MetaType::Versions),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectedEdgeMeta {
    Source { node: Id, edge_type: String },
    SourceTargetType { node: Id, edge_type: String, target_type: String },
    Target { node: Id, edge_type: String },
    TargetSourceType { node: Id, edge_type: String, source_type: String },
    Versions { source: Id, edge_type: String, target: Id },
}

impl DirectedEdgeMeta {
    pub fn from_source(node: Id, edge_type: impl Into<String>) -> Self {
        DirectedEdgeMeta::Source { node, edge_type: edge_type.into() }
    }

    pub fn from_source_target_type(node: Id, edge_type: impl Into<String>, target_type: impl Into<String>) -> Self {
        DirectedEdgeMeta::SourceTargetType {
            node,
            edge_type: edge_type.into(),
            target_type: target_type.into(),
        }
    }

    pub fn from_target(node: Id, edge_type: impl Into<String>) -> Self {
        DirectedEdgeMeta::Target { node, edge_type: edge_type.into() }
    }

    pub fn from_target_source_type(node: Id, edge_type: impl Into<String>, source_type: impl Into<String>) -> Self {
        DirectedEdgeMeta::TargetSourceType {
            node,
            edge_type: edge_type.into(),
            source_type: source_type.into(),
        }
    }

    pub fn from_versions(source: Id, edge_type: impl Into<String>, target: Id) -> Self {
        DirectedEdgeMeta::Versions { source, edge_type: edge_type.into(), target }
    }

    /// The five keys one edge is written under.
    pub fn all_for_edge(edge: &Edge) -> [DirectedEdgeMeta; 5] {
        [
            Self::from_source(edge.source.clone(), edge.edge_type.clone()),
            Self::from_source_target_type(edge.source.clone(), edge.edge_type.clone(), edge.target.id_type()),
            Self::from_target(edge.target.clone(), edge.edge_type.clone()),
            Self::from_target_source_type(edge.target.clone(), edge.edge_type.clone(), edge.source.id_type()),
            Self::from_versions(edge.source.clone(), edge.edge_type.clone(), edge.target.clone()),
        ]
    }

    pub fn meta_type(&self) -> MetaType {
        match self {
            DirectedEdgeMeta::Source { .. } => MetaType::Source,
            DirectedEdgeMeta::SourceTargetType { .. } => MetaType::SourceTargetType,
            DirectedEdgeMeta::Target { .. } => MetaType::Target,
            DirectedEdgeMeta::TargetSourceType { .. } => MetaType::TargetSourceType,
            DirectedEdgeMeta::Versions { .. } => MetaType::Versions,
        }
    }

    pub fn edge_type(&self) -> &str {
        match self {
            DirectedEdgeMeta::Source { edge_type, .. }
            | DirectedEdgeMeta::SourceTargetType { edge_type, .. }
            | DirectedEdgeMeta::Target { edge_type, .. }
            | DirectedEdgeMeta::TargetSourceType { edge_type, .. }
            | DirectedEdgeMeta::Versions { edge_type, .. } => edge_type,
        }
    }

    /// Nodes whose age decides whether this key can own persisted shards.
    pub fn nodes(&self) -> Vec<&Id> {
        match self {
            DirectedEdgeMeta::Source { node, .. }
            | DirectedEdgeMeta::SourceTargetType { node, .. }
            | DirectedEdgeMeta::Target { node, .. }
            | DirectedEdgeMeta::TargetSourceType { node, .. } => vec![node],
            DirectedEdgeMeta::Versions { source, target, .. } => vec![source, target],
        }
    }

    /// The endpoint stored in the column, i.e. the one not fixed by the row.
    pub fn other_endpoint<'a>(&self, edge: &'a MarkedEdge) -> &'a Id {
        match self {
            DirectedEdgeMeta::Source { .. } | DirectedEdgeMeta::SourceTargetType { .. } => &edge.target,
            DirectedEdgeMeta::Target { .. } | DirectedEdgeMeta::TargetSourceType { .. } => &edge.source,
            DirectedEdgeMeta::Versions { .. } => &edge.target,
        }
    }
}
