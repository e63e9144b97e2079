//! Edge value types

use serde::{Deserialize, Serialize};

use super::Id;
use crate::error::{GraphError, Result};

/// Directed, typed edge at a version (`timestamp`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: Id,
    pub edge_type: String,
    pub target: Id,
    pub timestamp: u64,
}

impl Edge {
    pub fn new(source: Id, edge_type: impl Into<String>, target: Id, timestamp: u64) -> Self {
        Self { source, edge_type: edge_type.into(), target, timestamp }
    }

    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        self.target.validate()?;
        validate_edge_type(&self.edge_type)?;
        if self.timestamp == 0 {
            return Err(GraphError::Validation("edge timestamp must be > 0".into()));
        }
        Ok(())
    }
}

pub(crate) fn validate_edge_type(edge_type: &str) -> Result<()> {
    if edge_type.is_empty() {
        return Err(GraphError::Validation("edge type must not be empty".into()));
    }
    Ok(())
}

/// Which edge source produced a read result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeOrigin {
    CommitLog,
    Storage,
}

/// An edge plus its soft-delete flag, as stored in edge columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkedEdge {
    pub source: Id,
    pub edge_type: String,
    pub target: Id,
    pub timestamp: u64,
    pub deleted: bool,
    pub origin: EdgeOrigin,
}

impl MarkedEdge {
    pub fn new(edge: Edge, deleted: bool) -> Self {
        Self {
            source: edge.source,
            edge_type: edge.edge_type,
            target: edge.target,
            timestamp: edge.timestamp,
            deleted,
            origin: EdgeOrigin::Storage,
        }
    }

    pub fn with_origin(mut self, origin: EdgeOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn to_edge(&self) -> Edge {
        Edge::new(self.source.clone(), self.edge_type.clone(), self.target.clone(), self.timestamp)
    }

    /// Logical identity used to collapse duplicates across shards and sources.
    pub fn identity(&self) -> (&Id, &str, &Id, u64) {
        (&self.source, &self.edge_type, &self.target, self.timestamp)
    }
}

/// One column of an edge row: the far endpoint and the edge version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectedEdge {
    pub id: Id,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_edge(ts: u64) -> Edge {
        Edge::new(
            Id::generate_at("user", 1).unwrap(),
            "likes",
            Id::generate_at("post", 2).unwrap(),
            ts,
        )
    }

    #[test]
    fn test_edge_validation() {
        make_test_edge(1).validate().unwrap();
        assert!(make_test_edge(0).validate().unwrap_err().is_validation());

        let mut edge = make_test_edge(5);
        edge.edge_type.clear();
        assert!(edge.validate().is_err());
    }

    #[test]
    fn test_identity_ignores_origin_and_flag() {
        let edge = make_test_edge(3);
        let a = MarkedEdge::new(edge.clone(), false);
        let b = MarkedEdge::new(edge, true).with_origin(EdgeOrigin::CommitLog);
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a, b);
    }
}
