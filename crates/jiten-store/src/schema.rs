use std::collections::BTreeMap;

use crate::error::StoreError;

/// One object store and its secondary indices.
#[derive(Debug, Clone, Copy)]
pub struct StoreDefinition {
    pub name: &'static str,
    pub indices: &'static [&'static str],
}

/// One entry of the additive schema history.
///
/// Entries are applied in ascending version order; an entry whose version is
/// not greater than the on-disk version is skipped. Stores and indices are
/// created only if absent by name, never recreated or altered.
#[derive(Debug, Clone, Copy)]
pub struct SchemaUpgrade {
    pub version: u64,
    pub stores: &'static [StoreDefinition],
}

/// The shape of an opened database, read back from the backend's table
/// listing: object store name to secondary index names.
#[derive(Debug, Clone, Default)]
pub(crate) struct Schema {
    stores: BTreeMap<String, Vec<String>>,
}

impl Schema {
    /// Reconstructs the schema from the backend's table names. Data stores
    /// are plain tables; each index is a multimap table named
    /// `store.index`.
    pub(crate) fn from_listing(
        tables: impl IntoIterator<Item = String>,
        multimaps: impl IntoIterator<Item = String>,
    ) -> Schema {
        let mut stores: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for table in tables {
            if table != super::store::META_TABLE_NAME {
                stores.entry(table).or_default();
            }
        }
        for name in multimaps {
            if let Some((store, index)) = name.split_once('.')
                && let Some(indices) = stores.get_mut(store)
            {
                indices.push(index.to_string());
            }
        }
        Schema { stores }
    }

    /// True when the database holds no object stores at all, the
    /// recognized corruption signature.
    pub(crate) fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub(crate) fn indices(&self, store: &str) -> Result<&[String], StoreError> {
        self.stores
            .get(store)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::UnknownStore(store.to_string()))
    }

    pub(crate) fn has_index(&self, store: &str, index: &str) -> Result<(), StoreError> {
        if self.indices(store)?.iter().any(|name| name == index) {
            Ok(())
        } else {
            Err(StoreError::UnknownIndex {
                store: store.to_string(),
                index: index.to_string(),
            })
        }
    }
}

/// Name of the multimap table backing one secondary index.
pub(crate) fn index_table_name(store: &str, index: &str) -> String {
    format!("{store}.{index}")
}
