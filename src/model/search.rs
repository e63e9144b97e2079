//! Search criteria, pages and resume tokens
//!
//! A resume token is the JSON form of the last element of a page. Feeding it
//! back seeds the next page's column range just past that element.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::edge::validate_edge_type;
use super::{Id, MarkedEdge};
use crate::error::{GraphError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Order {
    /// Newest first.
    #[default]
    Descending,
    Ascending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present when the page is full and more results may follow.
    pub resume_token: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self { items: Vec::new(), resume_token: None }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub fn encode_token<T: Serialize>(last: &T) -> Result<String> {
    Ok(serde_json::to_string(last)?)
}

pub fn decode_token<T: DeserializeOwned>(token: &str) -> Result<T> {
    serde_json::from_str(token).map_err(|e| GraphError::Validation(format!("malformed resume token: {}", e)))
}

fn check_resume_edge(last: &Option<MarkedEdge>, edge_type: &str) -> Result<()> {
    if let Some(last) = last {
        if last.edge_type != edge_type {
            return Err(GraphError::Validation(format!(
                "resume edge has type {} but search is for {}",
                last.edge_type, edge_type
            )));
        }
    }
    Ok(())
}

fn check_limit(limit: Option<usize>) -> Result<()> {
    if limit == Some(0) {
        return Err(GraphError::Validation("page limit must be > 0".into()));
    }
    Ok(())
}

/// Edges of one type incident to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchByEdgeType {
    pub node: Id,
    pub edge_type: String,
    pub max_timestamp: u64,
    pub order: Order,
    pub last: Option<MarkedEdge>,
    pub limit: Option<usize>,
    /// Skip soft-deleted edges.
    pub filter_marked: bool,
}

impl SearchByEdgeType {
    pub fn new(node: Id, edge_type: impl Into<String>, max_timestamp: u64, order: Order) -> Self {
        Self {
            node,
            edge_type: edge_type.into(),
            max_timestamp,
            order,
            last: None,
            limit: None,
            filter_marked: true,
        }
    }

    pub fn with_resume_token(mut self, token: Option<&str>) -> Result<Self> {
        self.last = token.map(decode_token).transpose()?;
        Ok(self)
    }

    pub fn with_last(mut self, last: MarkedEdge) -> Self {
        self.last = Some(last);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn include_marked(mut self) -> Self {
        self.filter_marked = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;
        validate_edge_type(&self.edge_type)?;
        check_limit(self.limit)?;
        check_resume_edge(&self.last, &self.edge_type)
    }
}

/// Edges of one type whose far endpoint has a given id type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchByIdType {
    pub base: SearchByEdgeType,
    pub id_type: String,
}

impl SearchByIdType {
    pub fn new(
        node: Id,
        edge_type: impl Into<String>,
        max_timestamp: u64,
        order: Order,
        id_type: impl Into<String>,
    ) -> Self {
        Self {
            base: SearchByEdgeType::new(node, edge_type, max_timestamp, order),
            id_type: id_type.into(),
        }
    }

    pub fn with_resume_token(mut self, token: Option<&str>) -> Result<Self> {
        self.base = self.base.with_resume_token(token)?;
        Ok(self)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.base = self.base.with_limit(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        if self.id_type.is_empty() {
            return Err(GraphError::Validation("id type must not be empty".into()));
        }
        Ok(())
    }
}

/// Every version of one `(source, type, target)` edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchByEdge {
    pub source: Id,
    pub edge_type: String,
    pub target: Id,
    pub max_timestamp: u64,
    pub order: Order,
    pub last: Option<MarkedEdge>,
    pub limit: Option<usize>,
    pub filter_marked: bool,
}

impl SearchByEdge {
    pub fn new(source: Id, edge_type: impl Into<String>, target: Id, max_timestamp: u64, order: Order) -> Self {
        Self {
            source,
            edge_type: edge_type.into(),
            target,
            max_timestamp,
            order,
            last: None,
            limit: None,
            filter_marked: true,
        }
    }

    pub fn with_resume_token(mut self, token: Option<&str>) -> Result<Self> {
        self.last = token.map(decode_token).transpose()?;
        Ok(self)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn include_marked(mut self) -> Self {
        self.filter_marked = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        self.target.validate()?;
        validate_edge_type(&self.edge_type)?;
        check_limit(self.limit)?;
        check_resume_edge(&self.last, &self.edge_type)
    }
}

/// Edge types known for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEdgeType {
    pub node: Id,
    pub prefix: Option<String>,
    pub last: Option<String>,
    pub limit: Option<usize>,
}

impl SearchEdgeType {
    pub fn new(node: Id) -> Self {
        Self { node, prefix: None, last: None, limit: None }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_resume_token(mut self, token: Option<&str>) -> Result<Self> {
        self.last = token.map(decode_token).transpose()?;
        Ok(self)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;
        check_limit(self.limit)
    }
}

/// Far-endpoint id types known for a node and edge type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIdType {
    pub node: Id,
    pub edge_type: String,
    pub prefix: Option<String>,
    pub last: Option<String>,
    pub limit: Option<usize>,
}

impl SearchIdType {
    pub fn new(node: Id, edge_type: impl Into<String>) -> Self {
        Self { node, edge_type: edge_type.into(), prefix: None, last: None, limit: None }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_resume_token(mut self, token: Option<&str>) -> Result<Self> {
        self.last = token.map(decode_token).transpose()?;
        Ok(self)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;
        validate_edge_type(&self.edge_type)?;
        check_limit(self.limit)
    }
}
