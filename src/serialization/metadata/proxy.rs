//! Generation selection for the type registries
//!
//! | version     | writes | reads          |
//! |-------------|--------|----------------|
//! | `V1`        | v1     | v1             |
//! | `Migrating` | v2     | v1 ∪ v2 merged |
//! | `V2`        | v2     | v2             |
//!
//! Removals go to every generation that is read. The version lives in the
//! store so all processes sharing it agree.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::iter::BoxedIter;
use crate::model::{ApplicationScope, Edge, Id, SearchEdgeType, SearchIdType};
use crate::store::{ColumnStore, ConsistencyLevel, MutationBatch};

use super::{
    merge_types, Direction, EdgeMetadataSerialization, EdgeMetadataSerializationV1, EdgeMetadataSerializationV2,
};

pub const DATA_MIGRATION_CF: &str = "Graph_Data_Migration";

const VERSION_ROW: &[u8] = b"edge_metadata";
const VERSION_COLUMN: &[u8] = b"version";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataVersion {
    V1,
    Migrating,
    V2,
}

pub struct EdgeMetadataSerializationProxy {
    store: Arc<dyn ColumnStore>,
    v1: Arc<EdgeMetadataSerializationV1>,
    v2: Arc<EdgeMetadataSerializationV2>,
    version: RwLock<MetadataVersion>,
    window: usize,
    consistency: ConsistencyLevel,
}

impl EdgeMetadataSerializationProxy {
    /// Loads the persisted version; a store without one starts at `V2`.
    pub fn new(
        store: Arc<dyn ColumnStore>,
        v1: Arc<EdgeMetadataSerializationV1>,
        v2: Arc<EdgeMetadataSerializationV2>,
        window: usize,
        consistency: ConsistencyLevel,
    ) -> Result<Self> {
        let version = Self::load_version(store.as_ref(), consistency)?.unwrap_or(MetadataVersion::V2);
        tracing::debug!(?version, "edge metadata version");
        Ok(Self { store, v1, v2, version: RwLock::new(version), window: window.max(1), consistency })
    }

    fn load_version(store: &dyn ColumnStore, consistency: ConsistencyLevel) -> Result<Option<MetadataVersion>> {
        let rows =
            store.multi_get(DATA_MIGRATION_CF, &[VERSION_ROW.to_vec()], &[VERSION_COLUMN.to_vec()], consistency)?;
        match rows.first().and_then(|(_, columns)| columns.first()) {
            Some(column) => Ok(Some(bincode::deserialize(&column.value)?)),
            None => Ok(None),
        }
    }

    pub fn version(&self) -> MetadataVersion {
        *self.version.read()
    }

    /// Persists and switches to `version`.
    pub fn set_version(&self, version: MetadataVersion) -> Result<()> {
        let mut batch = MutationBatch::new().with_consistency(self.consistency);
        batch
            .with_row(DATA_MIGRATION_CF, VERSION_ROW.to_vec())
            .put_column(VERSION_COLUMN.to_vec(), bincode::serialize(&version)?, None);
        self.store.execute(batch)?;
        *self.version.write() = version;
        tracing::info!(?version, "edge metadata version changed");
        Ok(())
    }

    /// Copies one node's v1 registries into v2, keeping write timestamps.
    ///
    /// Returns the number of columns copied.
    pub fn migrate_node(&self, scope: &ApplicationScope, node: &Id) -> Result<usize> {
        if self.version() == MetadataVersion::V1 {
            return Err(GraphError::Validation("edge metadata migration has not been started".into()));
        }
        let mut batch = MutationBatch::new().with_consistency(self.consistency);
        let mut copied = 0;
        for direction in [Direction::Source, Direction::Target] {
            for column in self.v1.edge_type_columns(scope, direction, node) {
                let column = column?;
                let edge_type = String::from_utf8(column.name)
                    .map_err(|e| GraphError::InvalidFormat(format!("edge type is not utf-8: {}", e)))?;
                self.v2.put_edge_type(&mut batch, direction, scope, node, &edge_type, column.timestamp);
                copied += 1;

                for id_column in self.v1.id_type_columns(scope, direction, node, &edge_type) {
                    let id_column = id_column?;
                    let id_type = String::from_utf8(id_column.name)
                        .map_err(|e| GraphError::InvalidFormat(format!("id type is not utf-8: {}", e)))?;
                    self.v2
                        .put_id_type(&mut batch, direction, scope, node, &edge_type, &id_type, id_column.timestamp);
                    copied += 1;
                }
            }
        }
        if !batch.is_empty() {
            self.store.execute(batch)?;
        }
        tracing::debug!(?node, copied, "migrated edge metadata");
        Ok(copied)
    }

    fn removal<F>(&self, remove: F) -> MutationBatch
    where
        F: Fn(&dyn EdgeMetadataSerialization) -> MutationBatch,
    {
        match self.version() {
            MetadataVersion::V1 => remove(self.v1.as_ref()),
            MetadataVersion::V2 => remove(self.v2.as_ref()),
            MetadataVersion::Migrating => {
                let mut batch = remove(self.v1.as_ref());
                batch.merge(remove(self.v2.as_ref()));
                batch
            }
        }
    }

    fn read<F>(&self, read: F) -> Result<BoxedIter<String>>
    where
        F: Fn(&dyn EdgeMetadataSerialization) -> Result<BoxedIter<String>>,
    {
        match self.version() {
            MetadataVersion::V1 => read(self.v1.as_ref()),
            MetadataVersion::V2 => read(self.v2.as_ref()),
            MetadataVersion::Migrating => {
                let sources = vec![read(self.v2.as_ref())?, read(self.v1.as_ref())?];
                Ok(merge_types(sources, self.window))
            }
        }
    }
}

impl EdgeMetadataSerialization for EdgeMetadataSerializationProxy {
    fn write_edge(&self, scope: &ApplicationScope, edge: &Edge) -> MutationBatch {
        match self.version() {
            MetadataVersion::V1 => self.v1.write_edge(scope, edge),
            MetadataVersion::Migrating | MetadataVersion::V2 => self.v2.write_edge(scope, edge),
        }
    }

    fn remove_edge_type_from_source(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.removal(|m| m.remove_edge_type_from_source(scope, node, edge_type, version))
    }

    fn remove_edge_type_to_target(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.removal(|m| m.remove_edge_type_to_target(scope, node, edge_type, version))
    }

    fn remove_id_type_from_source(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        id_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.removal(|m| m.remove_id_type_from_source(scope, node, edge_type, id_type, version))
    }

    fn remove_id_type_to_target(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        id_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.removal(|m| m.remove_id_type_to_target(scope, node, edge_type, id_type, version))
    }

    fn get_edge_types_from_source(
        &self,
        scope: &ApplicationScope,
        search: &SearchEdgeType,
    ) -> Result<BoxedIter<String>> {
        self.read(|m| m.get_edge_types_from_source(scope, search))
    }

    fn get_edge_types_to_target(&self, scope: &ApplicationScope, search: &SearchEdgeType) -> Result<BoxedIter<String>> {
        self.read(|m| m.get_edge_types_to_target(scope, search))
    }

    fn get_id_types_from_source(&self, scope: &ApplicationScope, search: &SearchIdType) -> Result<BoxedIter<String>> {
        self.read(|m| m.get_id_types_from_source(scope, search))
    }

    fn get_id_types_to_target(&self, scope: &ApplicationScope, search: &SearchIdType) -> Result<BoxedIter<String>> {
        self.read(|m| m.get_id_types_to_target(scope, search))
    }
}
