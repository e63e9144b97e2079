//! Row key and column encodings
//!
//! Plain encode/decode functions per key shape. Integers are big-endian so
//! byte order equals numeric order. Strings inside row keys are length
//! prefixed; the trailing string of a column is written raw so columns sort
//! by `(timestamp, uuid, type)`.
//!
//! ```text
//! edge row     scope | meta tag | meta fields | shard index
//! edge column  timestamp | far uuid | far type       (versions: timestamp)
//! shard row    scope | meta tag | meta fields
//! shard column shard index        value: bincode (created_time, compacted)
//! ```

use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::model::{ApplicationScope, DirectedEdgeMeta, EdgeOrigin, Id, MarkedEdge, Shard};

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn put_id(buf: &mut Vec<u8>, id: &Id) {
    buf.extend_from_slice(id.uuid().as_bytes());
    put_str(buf, id.id_type());
}

pub fn scope_prefix(scope: &ApplicationScope) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    put_id(&mut buf, scope.application());
    buf
}

fn put_meta(buf: &mut Vec<u8>, meta: &DirectedEdgeMeta) {
    buf.push(meta.meta_type().storage_value());
    match meta {
        DirectedEdgeMeta::Source { node, edge_type } | DirectedEdgeMeta::Target { node, edge_type } => {
            put_id(buf, node);
            put_str(buf, edge_type);
        }
        DirectedEdgeMeta::SourceTargetType { node, edge_type, target_type: other }
        | DirectedEdgeMeta::TargetSourceType { node, edge_type, source_type: other } => {
            put_id(buf, node);
            put_str(buf, edge_type);
            put_str(buf, other);
        }
        DirectedEdgeMeta::Versions { source, edge_type, target } => {
            put_id(buf, source);
            put_str(buf, edge_type);
            put_id(buf, target);
        }
    }
}

/// Row holding one shard of a meta key's edges.
pub fn edge_row_key(scope: &ApplicationScope, meta: &DirectedEdgeMeta, shard_index: u64) -> Vec<u8> {
    let mut buf = scope_prefix(scope);
    put_meta(&mut buf, meta);
    buf.extend_from_slice(&shard_index.to_be_bytes());
    buf
}

/// Row listing the shards of a meta key.
pub fn shard_meta_row_key(scope: &ApplicationScope, meta: &DirectedEdgeMeta) -> Vec<u8> {
    let mut buf = scope_prefix(scope);
    put_meta(&mut buf, meta);
    buf
}

pub fn timestamp_column(timestamp: u64) -> Vec<u8> {
    timestamp.to_be_bytes().to_vec()
}

pub fn edge_column(meta: &DirectedEdgeMeta, edge: &MarkedEdge) -> Vec<u8> {
    let mut buf = timestamp_column(edge.timestamp);
    if !matches!(meta, DirectedEdgeMeta::Versions { .. }) {
        let other = meta.other_endpoint(edge);
        buf.extend_from_slice(other.uuid().as_bytes());
        buf.extend_from_slice(other.id_type().as_bytes());
    }
    buf
}

pub fn deleted_value(deleted: bool) -> Vec<u8> {
    vec![deleted as u8]
}

fn read_u64(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| GraphError::InvalidFormat(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

pub fn decode_timestamp(column: &[u8]) -> Result<u64> {
    read_u64(column)
}

/// Rebuilds the edge stored as `column` in a row of `meta`.
pub fn decode_edge(meta: &DirectedEdgeMeta, column: &[u8], value: &[u8], origin: EdgeOrigin) -> Result<MarkedEdge> {
    let timestamp = read_u64(column)?;
    let deleted = value.first().copied().unwrap_or(0) != 0;

    let far = || -> Result<Id> {
        let uuid_bytes = column
            .get(8..24)
            .ok_or_else(|| GraphError::InvalidFormat("edge column is missing the endpoint uuid".into()))?;
        let uuid = Uuid::from_slice(uuid_bytes).map_err(|e| GraphError::InvalidFormat(e.to_string()))?;
        let id_type = std::str::from_utf8(&column[24..])
            .map_err(|e| GraphError::InvalidFormat(format!("endpoint type is not utf8: {}", e)))?;
        Id::new(uuid, id_type).map_err(|e| GraphError::InvalidFormat(e.to_string()))
    };

    let (source, edge_type, target) = match meta {
        DirectedEdgeMeta::Source { node, edge_type } | DirectedEdgeMeta::SourceTargetType { node, edge_type, .. } => {
            (node.clone(), edge_type.clone(), far()?)
        }
        DirectedEdgeMeta::Target { node, edge_type } | DirectedEdgeMeta::TargetSourceType { node, edge_type, .. } => {
            (far()?, edge_type.clone(), node.clone())
        }
        DirectedEdgeMeta::Versions { source, edge_type, target } => (source.clone(), edge_type.clone(), target.clone()),
    };

    Ok(MarkedEdge { source, edge_type, target, timestamp, deleted, origin })
}

pub fn shard_column(shard: &Shard) -> Vec<u8> {
    shard.index().to_be_bytes().to_vec()
}

pub fn shard_value(shard: &Shard) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&(shard.created_time(), shard.is_compacted()))?)
}

pub fn decode_shard(column: &[u8], value: &[u8]) -> Result<Shard> {
    let index = read_u64(column)?;
    let (created_time, compacted): (u64, bool) = bincode::deserialize(value)?;
    Ok(Shard::new(index, created_time, compacted))
}

/// Row of a per-node index (tombstones, metadata).
pub fn node_row_key(scope: &ApplicationScope, node: &Id) -> Vec<u8> {
    let mut buf = scope_prefix(scope);
    put_id(&mut buf, node);
    buf
}

pub fn node_type_row_key(scope: &ApplicationScope, node: &Id, edge_type: &str) -> Vec<u8> {
    let mut buf = node_row_key(scope, node);
    put_str(&mut buf, edge_type);
    buf
}

pub fn with_bucket(mut row_key: Vec<u8>, bucket: u32) -> Vec<u8> {
    row_key.extend_from_slice(&bucket.to_be_bytes());
    row_key
}

pub fn u64_value(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode_u64_value(value: &[u8]) -> Result<u64> {
    read_u64(value)
}
