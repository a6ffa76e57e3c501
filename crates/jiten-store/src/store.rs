use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use redb::{
    Database, MultimapTable, MultimapTableDefinition, MultimapTableHandle, ReadableMultimapTable,
    ReadableTable, ReadableTableMetadata, Table, TableDefinition, TableHandle,
};
use serde_json::Value;

use crate::delete::{self, MAX_ACTIVE_DELETES, MAX_ACTIVE_DELETES_FOR_CONTINUE};
use crate::error::StoreError;
use crate::key::IndexKey;
use crate::query::Query;
use crate::schema::{Schema, SchemaUpgrade, index_table_name};

pub(crate) const META_TABLE_NAME: &str = "__meta";

const META: TableDefinition<&str, u64> = TableDefinition::new(META_TABLE_NAME);
const VERSION_KEY: &str = "version";

/// One item of a bulk update: rows with a primary key overwrite in place,
/// rows without one insert with a fresh id.
#[derive(Debug, Clone)]
pub struct UpdateItem {
    pub primary_key: Option<u64>,
    pub data: Value,
}

/// One target of a bulk count: a store, optionally narrowed to an index
/// and a key query.
#[derive(Debug, Clone)]
pub struct CountTarget {
    pub store: String,
    pub index: Option<String>,
    pub query: Option<Query>,
}

pub type FilterKeysFn = Box<dyn FnOnce(Vec<u64>) -> Vec<u64> + Send>;
pub type ProgressFn = Box<dyn FnMut(u64, u64) + Send>;

#[derive(Default)]
struct State {
    db: Option<Arc<Database>>,
    schema: Arc<Schema>,
    is_opening: bool,
}

/// Generic wrapper over the persistent, versioned, index-capable backend.
///
/// Rows are JSON documents keyed by autoincrement ids; each secondary index
/// is a multimap from an encoded field value to row ids. All operations
/// resolve when their whole transaction commits, never per row.
#[derive(Default)]
pub struct Store {
    state: Mutex<State>,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    /// Opens the backing database, applying the additive upgrade history
    /// when given.
    ///
    /// Fails fast when already open or when another open is in progress.
    /// A database that ends up with zero object stores is treated as
    /// corrupted: the file is deleted and the open retried once.
    pub async fn open(
        &self,
        path: impl Into<PathBuf>,
        version: u64,
        upgrades: Option<&'static [SchemaUpgrade]>,
    ) -> Result<(), StoreError> {
        {
            let mut state = self.state.lock();
            if state.db.is_some() {
                return Err(StoreError::AlreadyOpen);
            }
            if state.is_opening {
                return Err(StoreError::AlreadyOpening);
            }
            state.is_opening = true;
        }

        let path = path.into();
        let result =
            tokio::task::spawn_blocking(move || open_blocking(&path, version, upgrades)).await;

        let mut state = self.state.lock();
        state.is_opening = false;
        match result {
            Ok(Ok((db, schema))) => {
                state.db = Some(db);
                state.schema = Arc::new(schema);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(e.into()),
        }
    }

    /// Releases the handle. In-flight operations finish against the old
    /// handle; new operations fail with `NotOpen`.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.db.take().is_none() {
            return Err(StoreError::NotOpen);
        }
        state.schema = Arc::new(Schema::default());
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().db.is_some()
    }

    pub fn is_opening(&self) -> bool {
        self.state.lock().is_opening
    }

    /// Deletes the backing database file. Succeeds when the file is
    /// already gone.
    pub async fn delete_database(path: impl Into<PathBuf>) -> Result<(), StoreError> {
        let path = path.into();
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Backend(format!(
                "failed to delete store file {}: {e}",
                path.display()
            ))),
        })
        .await?
    }

    /// Adds `count` rows from `items` starting at `start`, all in one
    /// transaction. The clamped count may be smaller; zero rows resolve
    /// immediately without opening a transaction.
    pub async fn bulk_add(
        &self,
        store: &str,
        items: &[Value],
        start: usize,
        count: usize,
    ) -> Result<(), StoreError> {
        let count = clamp_count(items.len(), start, count);
        if count == 0 {
            return Ok(());
        }
        let rows = items[start..start + count].to_vec();
        let (db, schema) = self.handles()?;
        let store = store.to_string();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write()?;
            {
                let mut data = txn.open_table(data_def(&store))?;
                let mut meta = txn.open_table(META)?;
                let index_names = index_names(&schema, &store)?;
                let mut index_tables = open_index_tables(&txn, &index_names)?;

                let seq_key = seq_key(&store);
                let mut next = read_seq(&meta, &seq_key)?;
                for row in &rows {
                    next += 1;
                    insert_row(&mut data, &mut index_tables, next, row)?;
                }
                meta.insert(seq_key.as_str(), next)?;
            }
            txn.commit()?;
            Ok(())
        })
        .await?
    }

    /// Adds a single row and returns its assigned primary key.
    pub async fn add_with_result(&self, store: &str, item: Value) -> Result<u64, StoreError> {
        let (db, schema) = self.handles()?;
        let store = store.to_string();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write()?;
            let id;
            {
                let mut data = txn.open_table(data_def(&store))?;
                let mut meta = txn.open_table(META)?;
                let index_names = index_names(&schema, &store)?;
                let mut index_tables = open_index_tables(&txn, &index_names)?;

                let seq_key = seq_key(&store);
                id = read_seq(&meta, &seq_key)? + 1;
                insert_row(&mut data, &mut index_tables, id, &item)?;
                meta.insert(seq_key.as_str(), id)?;
            }
            txn.commit()?;
            Ok(id)
        })
        .await?
    }

    /// Updates `count` rows from `items` starting at `start` in one
    /// transaction. Rows that do not exist are added.
    pub async fn bulk_update(
        &self,
        store: &str,
        items: &[UpdateItem],
        start: usize,
        count: usize,
    ) -> Result<(), StoreError> {
        let count = clamp_count(items.len(), start, count);
        if count == 0 {
            return Ok(());
        }
        let rows = items[start..start + count].to_vec();
        let (db, schema) = self.handles()?;
        let store = store.to_string();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write()?;
            {
                let mut data = txn.open_table(data_def(&store))?;
                let mut meta = txn.open_table(META)?;
                let index_names = index_names(&schema, &store)?;
                let mut index_tables = open_index_tables(&txn, &index_names)?;

                let seq_key = seq_key(&store);
                let mut next = read_seq(&meta, &seq_key)?;
                for item in &rows {
                    match item.primary_key {
                        Some(id) => {
                            remove_row(&mut data, &mut index_tables, id)?;
                            insert_row(&mut data, &mut index_tables, id, &item.data)?;
                            // Keep the generator ahead of explicit keys.
                            next = next.max(id);
                        }
                        None => {
                            next += 1;
                            insert_row(&mut data, &mut index_tables, next, &item.data)?;
                        }
                    }
                }
                meta.insert(seq_key.as_str(), next)?;
            }
            txn.commit()?;
            Ok(())
        })
        .await?
    }

    /// Returns every `(primary key, row)` matching `query` on a store or
    /// one of its indices, in ascending key order.
    ///
    /// Point queries take the backend's native lookup; range queries walk
    /// an ascending cursor. Both produce identical results.
    pub async fn get_all(
        &self,
        store: &str,
        index: Option<&str>,
        query: Option<&Query>,
    ) -> Result<Vec<(u64, Value)>, StoreError> {
        let (db, schema) = self.handles()?;
        let store = store.to_string();
        let index = index.map(str::to_string);
        let query = query.cloned();
        tokio::task::spawn_blocking(move || {
            schema.indices(&store)?;
            let txn = db.begin_read()?;
            let data = txn.open_table(data_def(&store))?;
            match index {
                Some(idx) => {
                    schema.has_index(&store, &idx)?;
                    let mm = txn.open_multimap_table(index_def(&index_table_name(&store, &idx)))?;
                    let ids = index_ids(&mm, query.as_ref())?;
                    fetch_rows(&data, &ids)
                }
                None => match &query {
                    None => {
                        let mut rows = Vec::new();
                        for entry in data.range::<u64>(..)? {
                            let (key, value) = entry?;
                            rows.push((key.value(), serde_json::from_slice(value.value())?));
                        }
                        Ok(rows)
                    }
                    Some(q) => {
                        let ids = primary_ids(&data, q)?;
                        fetch_rows(&data, &ids)
                    }
                },
            }
        })
        .await?
    }

    /// Like [`Store::get_all`], returning only the primary keys.
    pub async fn get_all_keys(
        &self,
        store: &str,
        index: Option<&str>,
        query: Option<&Query>,
    ) -> Result<Vec<u64>, StoreError> {
        let (db, schema) = self.handles()?;
        let store = store.to_string();
        let index = index.map(str::to_string);
        let query = query.cloned();
        tokio::task::spawn_blocking(move || {
            schema.indices(&store)?;
            let txn = db.begin_read()?;
            match index {
                Some(idx) => {
                    schema.has_index(&store, &idx)?;
                    let mm = txn.open_multimap_table(index_def(&index_table_name(&store, &idx)))?;
                    index_ids(&mm, query.as_ref())
                }
                None => {
                    let data = txn.open_table(data_def(&store))?;
                    match &query {
                        None => {
                            let mut ids = Vec::new();
                            for entry in data.range::<u64>(..)? {
                                ids.push(entry?.0.value());
                            }
                            Ok(ids)
                        }
                        Some(q) => primary_ids(&data, q),
                    }
                }
            }
        })
        .await?
    }

    /// Walks an ascending cursor over a store or index and resolves with
    /// the first row satisfying `predicate`, or `None` when nothing does.
    pub async fn find_first<P>(
        &self,
        store: &str,
        index: Option<&str>,
        query: Option<&Query>,
        mut predicate: P,
    ) -> Result<Option<(u64, Value)>, StoreError>
    where
        P: FnMut(&Value) -> bool + Send + 'static,
    {
        let (db, schema) = self.handles()?;
        let store = store.to_string();
        let index = index.map(str::to_string);
        let query = query.cloned();
        tokio::task::spawn_blocking(move || {
            schema.indices(&store)?;
            let txn = db.begin_read()?;
            let data = txn.open_table(data_def(&store))?;
            let ids = match index {
                Some(idx) => {
                    schema.has_index(&store, &idx)?;
                    let mm = txn.open_multimap_table(index_def(&index_table_name(&store, &idx)))?;
                    index_ids(&mm, query.as_ref())?
                }
                None => match &query {
                    None => {
                        let mut ids = Vec::new();
                        for entry in data.range::<u64>(..)? {
                            ids.push(entry?.0.value());
                        }
                        ids
                    }
                    Some(q) => primary_ids(&data, q)?,
                },
            };
            for id in ids {
                let row = fetch_row(&data, id)?;
                if predicate(&row) {
                    return Ok(Some((id, row)));
                }
            }
            Ok(None)
        })
        .await?
    }

    /// Issues one count per target in parallel and resolves all-or-nothing
    /// with counts aligned to request order.
    pub async fn bulk_count(&self, targets: Vec<CountTarget>) -> Result<Vec<u64>, StoreError> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let (db, schema) = self.handles()?;
        let tasks = targets.into_iter().map(|target| {
            let db = db.clone();
            let schema = schema.clone();
            tokio::task::spawn_blocking(move || count_one(&db, &schema, &target))
        });
        let joined = futures_util::future::try_join_all(tasks)
            .await
            .map_err(StoreError::from)?;
        joined.into_iter().collect()
    }

    /// Deletes a single row by primary key.
    pub async fn delete(&self, store: &str, key: u64) -> Result<(), StoreError> {
        let (db, schema) = self.handles()?;
        let store = store.to_string();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write()?;
            {
                let mut data = txn.open_table(data_def(&store))?;
                let index_names = index_names(&schema, &store)?;
                let mut index_tables = open_index_tables(&txn, &index_names)?;
                remove_row(&mut data, &mut index_tables, key)?;
            }
            txn.commit()?;
            Ok(())
        })
        .await?
    }

    /// Collects every key matching `query` (via `index` when given),
    /// optionally filters them, then deletes with the default bounded
    /// concurrency (waves of [`MAX_ACTIVE_DELETES`]).
    pub async fn bulk_delete(
        &self,
        store: &str,
        index: Option<&str>,
        query: &Query,
        filter_keys: Option<FilterKeysFn>,
        on_progress: Option<ProgressFn>,
    ) -> Result<(), StoreError> {
        let keys = self.get_all_keys(store, index, Some(query)).await?;
        let keys = match filter_keys {
            Some(filter) => filter(keys),
            None => keys,
        };
        self.bulk_delete_keys(
            store,
            keys,
            MAX_ACTIVE_DELETES,
            MAX_ACTIVE_DELETES_FOR_CONTINUE,
            on_progress,
        )
        .await
    }

    /// Deletes the given keys with explicit concurrency knobs.
    ///
    /// Up to `max_active` delete requests are in flight at once;
    /// `continue_threshold` controls refill eagerness (see
    /// [`delete`](crate::delete)). The first failed delete aborts the
    /// operation; deletes applied before the failure stay committed.
    pub async fn bulk_delete_keys(
        &self,
        store: &str,
        keys: Vec<u64>,
        max_active: usize,
        continue_threshold: usize,
        mut on_progress: Option<ProgressFn>,
    ) -> Result<(), StoreError> {
        if max_active == 0 {
            return Err(StoreError::InvalidArgument(
                "max_active must be greater than zero".to_string(),
            ));
        }
        if keys.is_empty() {
            return Ok(());
        }
        let (db, schema) = self.handles()?;
        let store = store.to_string();

        let (cmd_tx, cmd_rx) = kanal::bounded_async::<DeleteCmd>(max_active);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let writer = tokio::task::spawn_blocking(move || {
            let rx = cmd_rx.to_sync();
            let _ = done_tx.send(delete_writer(&db, &schema, &store, &rx));
        });

        let total = keys.len();
        let drive_result = delete::drive_bounded(
            total,
            max_active,
            continue_threshold,
            |i| {
                let key = keys[i];
                let tx = cmd_tx.clone();
                async move {
                    let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
                    tx.send(DeleteCmd { key, ack: ack_tx })
                        .await
                        .map_err(|_| {
                            StoreError::DeleteFailed("delete writer terminated".to_string())
                        })?;
                    match ack_rx.await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(message)) => Err(StoreError::DeleteFailed(message)),
                        Err(_) => Err(StoreError::DeleteFailed(
                            "delete writer dropped the request".to_string(),
                        )),
                    }
                }
            },
            |completed, total| {
                if let Some(progress) = on_progress.as_mut() {
                    progress(completed, total);
                }
            },
        )
        .await;

        // Closing the command channel makes the writer commit; deletes
        // applied before an abort stay applied.
        drop(cmd_tx);
        let commit_result = done_rx
            .await
            .map_err(|_| StoreError::Join("delete writer vanished".to_string()))?;
        let _ = writer.await;

        commit_result?;
        drive_result
    }

    fn handles(&self) -> Result<(Arc<Database>, Arc<Schema>), StoreError> {
        let state = self.state.lock();
        match &state.db {
            Some(db) => Ok((db.clone(), state.schema.clone())),
            None if state.is_opening => Err(StoreError::NotReady),
            None => Err(StoreError::NotOpen),
        }
    }
}

struct DeleteCmd {
    key: u64,
    ack: tokio::sync::oneshot::Sender<Result<(), String>>,
}

fn data_def(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

fn index_def(name: &str) -> MultimapTableDefinition<'_, &'static [u8], u64> {
    MultimapTableDefinition::new(name)
}

fn seq_key(store: &str) -> String {
    format!("seq:{store}")
}

fn clamp_count(len: usize, start: usize, count: usize) -> usize {
    if start >= len {
        return 0;
    }
    count.min(len - start)
}

fn index_names(schema: &Schema, store: &str) -> Result<Vec<(String, String)>, StoreError> {
    Ok(schema
        .indices(store)?
        .iter()
        .map(|index| (index.clone(), index_table_name(store, index)))
        .collect())
}

fn open_index_tables<'txn, 'names>(
    txn: &'txn redb::WriteTransaction,
    names: &'names [(String, String)],
) -> Result<Vec<(&'names str, MultimapTable<'txn, &'static [u8], u64>)>, StoreError> {
    let mut tables = Vec::with_capacity(names.len());
    for (field, table_name) in names {
        tables.push((field.as_str(), txn.open_multimap_table(index_def(table_name))?));
    }
    Ok(tables)
}

fn read_seq(meta: &Table<'_, &'static str, u64>, key: &str) -> Result<u64, StoreError> {
    Ok(meta.get(key)?.map(|guard| guard.value()).unwrap_or(0))
}

fn insert_row<'txn>(
    data: &mut Table<'txn, u64, &'static [u8]>,
    indices: &mut [(&str, MultimapTable<'txn, &'static [u8], u64>)],
    id: u64,
    row: &Value,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(row)?;
    data.insert(id, bytes.as_slice())?;
    for (field, table) in indices.iter_mut() {
        // A row whose indexed field is absent is simply not in that index.
        if let Some(key) = row.get(*field).and_then(IndexKey::from_field) {
            table.insert(key.encode().as_slice(), id)?;
        }
    }
    Ok(())
}

fn remove_row<'txn>(
    data: &mut Table<'txn, u64, &'static [u8]>,
    indices: &mut [(&str, MultimapTable<'txn, &'static [u8], u64>)],
    id: u64,
) -> Result<bool, StoreError> {
    let row: Option<Value> = match data.remove(id)? {
        Some(guard) => Some(serde_json::from_slice(guard.value())?),
        None => None,
    };
    let Some(row) = row else {
        return Ok(false);
    };
    for (field, table) in indices.iter_mut() {
        if let Some(key) = row.get(*field).and_then(IndexKey::from_field) {
            table.remove(key.encode().as_slice(), id)?;
        }
    }
    Ok(true)
}

fn delete_writer(
    db: &Database,
    schema: &Schema,
    store: &str,
    rx: &kanal::Receiver<DeleteCmd>,
) -> Result<(), StoreError> {
    let names = index_names(schema, store)?;
    let txn = db.begin_write()?;
    {
        let mut data = txn.open_table(data_def(store))?;
        let mut index_tables = open_index_tables(&txn, &names)?;
        while let Ok(cmd) = rx.recv() {
            let result = remove_row(&mut data, &mut index_tables, cmd.key)
                .map(|_| ())
                .map_err(|e| e.to_string());
            let _ = cmd.ack.send(result);
        }
    }
    txn.commit()?;
    Ok(())
}

fn bound_slice(bound: &std::ops::Bound<Vec<u8>>) -> std::ops::Bound<&[u8]> {
    match bound {
        std::ops::Bound::Included(b) => std::ops::Bound::Included(b.as_slice()),
        std::ops::Bound::Excluded(b) => std::ops::Bound::Excluded(b.as_slice()),
        std::ops::Bound::Unbounded => std::ops::Bound::Unbounded,
    }
}

/// Row ids matching `query` on one index, in ascending key order (ids
/// ascending within one key).
fn index_ids(
    mm: &impl ReadableMultimapTable<&'static [u8], u64>,
    query: Option<&Query>,
) -> Result<Vec<u64>, StoreError> {
    let mut ids = Vec::new();
    match query {
        // Native point lookup.
        Some(Query::Only(key)) => {
            let encoded = key.encode();
            for id in mm.get(encoded.as_slice())? {
                ids.push(id?.value());
            }
        }
        // Ascending cursor over the bound range.
        Some(bound @ Query::Bound { .. }) => {
            let (lo, hi) = bound.to_byte_bounds();
            for entry in mm.range::<&[u8]>((bound_slice(&lo), bound_slice(&hi)))? {
                let (_, values) = entry?;
                for id in values {
                    ids.push(id?.value());
                }
            }
        }
        None => {
            for entry in mm.range::<&[u8]>(..)? {
                let (_, values) = entry?;
                for id in values {
                    ids.push(id?.value());
                }
            }
        }
    }
    Ok(ids)
}

/// Primary keys matching a query directly against the data table.
fn primary_ids(
    data: &impl ReadableTable<u64, &'static [u8]>,
    query: &Query,
) -> Result<Vec<u64>, StoreError> {
    let as_primary = |key: &IndexKey| -> Result<u64, StoreError> {
        match key {
            IndexKey::Int(i) if *i >= 0 => Ok(*i as u64),
            _ => Err(StoreError::InvalidArgument(
                "primary key queries require a non-negative integer key".to_string(),
            )),
        }
    };
    match query {
        Query::Only(key) => {
            let id = as_primary(key)?;
            Ok(if data.get(id)?.is_some() {
                vec![id]
            } else {
                Vec::new()
            })
        }
        Query::Bound {
            lower,
            upper,
            lower_open,
            upper_open,
        } => {
            let lo = as_primary(lower)?;
            let hi = as_primary(upper)?;
            let bounds = (
                if *lower_open {
                    std::ops::Bound::Excluded(lo)
                } else {
                    std::ops::Bound::Included(lo)
                },
                if *upper_open {
                    std::ops::Bound::Excluded(hi)
                } else {
                    std::ops::Bound::Included(hi)
                },
            );
            let mut ids = Vec::new();
            for entry in data.range::<u64>(bounds)? {
                ids.push(entry?.0.value());
            }
            Ok(ids)
        }
    }
}

fn fetch_row(
    data: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> Result<Value, StoreError> {
    match data.get(id)? {
        Some(guard) => Ok(serde_json::from_slice(guard.value())?),
        None => Err(StoreError::Backend(format!(
            "index entry points at missing row {id}"
        ))),
    }
}

fn fetch_rows(
    data: &impl ReadableTable<u64, &'static [u8]>,
    ids: &[u64],
) -> Result<Vec<(u64, Value)>, StoreError> {
    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        rows.push((*id, fetch_row(data, *id)?));
    }
    Ok(rows)
}

fn count_one(db: &Database, schema: &Schema, target: &CountTarget) -> Result<u64, StoreError> {
    schema.indices(&target.store)?;
    let txn = db.begin_read()?;
    match &target.index {
        Some(index) => {
            schema.has_index(&target.store, index)?;
            let mm =
                txn.open_multimap_table(index_def(&index_table_name(&target.store, index)))?;
            Ok(index_ids(&mm, target.query.as_ref())?.len() as u64)
        }
        None => {
            let data = txn.open_table(data_def(&target.store))?;
            match &target.query {
                None => Ok(data.len()?),
                Some(q) => Ok(primary_ids(&data, q)?.len() as u64),
            }
        }
    }
}

fn open_blocking(
    path: &Path,
    version: u64,
    upgrades: Option<&[SchemaUpgrade]>,
) -> Result<(Arc<Database>, Schema), StoreError> {
    let mut retry = true;
    loop {
        let db = Database::create(path).map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if let Some(upgrades) = upgrades {
            apply_upgrades(&db, version, upgrades)?;
        }
        let schema = read_schema(&db)?;
        if schema.is_empty() {
            // Recognized corruption signature: close, delete, retry once.
            drop(db);
            let _ = std::fs::remove_file(path);
            if retry {
                tracing::warn!(path = %path.display(), "store had no object stores, deleting and retrying open");
                retry = false;
                continue;
            }
            return Err(StoreError::Corrupted);
        }
        return Ok((Arc::new(db), schema));
    }
}

fn apply_upgrades(
    db: &Database,
    version: u64,
    upgrades: &[SchemaUpgrade],
) -> Result<(), StoreError> {
    let txn = db.begin_write()?;
    {
        let mut meta = txn.open_table(META)?;
        let old_version = read_seq(&meta, VERSION_KEY)?;
        for upgrade in upgrades {
            if upgrade.version <= old_version {
                continue;
            }
            for store in upgrade.stores {
                // Opening creates the table only when absent by name.
                let _ = txn.open_table(data_def(store.name))?;
                let key = seq_key(store.name);
                if meta.get(key.as_str())?.is_none() {
                    meta.insert(key.as_str(), 0)?;
                }
                for index in store.indices {
                    let _ = txn.open_multimap_table(index_def(&index_table_name(
                        store.name, index,
                    )))?;
                }
            }
        }
        if version > old_version {
            meta.insert(VERSION_KEY, version)?;
        }
    }
    txn.commit()?;
    Ok(())
}

fn read_schema(db: &Database) -> Result<Schema, StoreError> {
    let txn = db.begin_read()?;
    let tables: Vec<String> = txn
        .list_tables()?
        .map(|handle| handle.name().to_string())
        .collect();
    let multimaps: Vec<String> = txn
        .list_multimap_tables()?
        .map(|handle| handle.name().to_string())
        .collect();
    Ok(Schema::from_listing(tables, multimaps))
}
