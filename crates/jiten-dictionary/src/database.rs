use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use jiten_config::{Config, MediaConfig};
use jiten_store::{CountTarget, Query, Store};
use kanal::AsyncSender;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::draw::{self, DrawMediaGroupedRequest, Rasterizer};
use crate::error::DictionaryError;
use crate::protocol::{DrawMediaRequest, DrawReply, WorkerRequest};
use crate::schema::{DATABASE_VERSION, SCHEMA, stores};
use crate::types::{
    DictionaryRecord, DictionarySet, DictionarySummary, DrawMedia, KanjiEntry, KanjiMetaEntry,
    KanjiRecord, MatchSource, MatchType, Media, MediaRecord, MediaRequest, Tag, TagMetaRequest,
    TermEntry, TermExactRequest, TermMetaEntry, TermMetaMode, TermRecord, TermSequenceRequest,
    reverse_string, split_field,
};
use crate::worker::{self, WorkerHandle};

/// One item of a typed bulk update.
#[derive(Debug, Clone)]
pub struct DatabaseUpdateItem<T> {
    pub primary_key: Option<u64>,
    pub data: T,
}

/// Per-store row counts for one dictionary (or the grand total).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub kanji: u64,
    pub kanji_meta: u64,
    pub terms: u64,
    pub term_meta: u64,
    pub tag_meta: u64,
    pub media: u64,
}

#[derive(Debug, Clone)]
pub struct DictionaryCounts {
    pub total: Option<StoreCounts>,
    pub counts: Vec<StoreCounts>,
}

/// Two-phase delete progress: `count` grows as each store's key set is
/// discovered, `processed` as keys are deleted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteDictionaryProgress {
    pub count: u64,
    pub processed: u64,
    pub store_count: usize,
    pub stores_processed: usize,
}

pub type DeleteProgressFn = Box<dyn FnMut(&DeleteDictionaryProgress) + Send>;

/// The six dictionary-indexed child stores, in count/delete order.
const CHILD_TARGETS: [(&str, &str); 6] = [
    (stores::KANJI, "dictionary"),
    (stores::KANJI_META, "dictionary"),
    (stores::TERMS, "dictionary"),
    (stores::TERM_META, "dictionary"),
    (stores::TAG_META, "dictionary"),
    (stores::MEDIA, "dictionary"),
];

struct FindContext<'a, I> {
    item: &'a I,
    item_index: usize,
    index_index: usize,
}

/// The dictionary database.
///
/// The instance callers construct is the orchestrator: it runs schema
/// upgrades on `prepare` and owns exactly one persistent worker, to which
/// heavy media-draw requests are forwarded. The worker side holds the
/// rasterizer and no worker handle, and trusts that the orchestrator
/// already upgraded the schema.
pub struct DictionaryDatabase {
    pub(crate) store: Arc<Store>,
    path: PathBuf,
    media_config: MediaConfig,
    worker: Mutex<Option<WorkerHandle>>,
    rasterizer: Option<Rasterizer>,
}

impl DictionaryDatabase {
    pub fn new(config: &Config) -> DictionaryDatabase {
        DictionaryDatabase {
            store: Arc::new(Store::new()),
            path: config.database.path.clone(),
            media_config: config.media.clone(),
            worker: Mutex::new(None),
            rasterizer: None,
        }
    }

    /// The worker-side view: shares the orchestrator's opened store and
    /// never runs upgrades itself.
    fn worker_instance(
        store: Arc<Store>,
        path: PathBuf,
        media_config: MediaConfig,
        rasterizer: Rasterizer,
    ) -> DictionaryDatabase {
        DictionaryDatabase {
            store,
            path,
            media_config,
            worker: Mutex::new(None),
            rasterizer: Some(rasterizer),
        }
    }

    /// Opens the store, applying the additive schema history, then spawns
    /// the persistent database worker with its rasterizer fonts loaded
    /// once.
    pub async fn prepare(&self) -> Result<(), DictionaryError> {
        self.store
            .open(&self.path, DATABASE_VERSION, Some(SCHEMA))
            .await?;

        let rasterizer = Rasterizer::load(self.media_config.font_path.as_deref()).await;
        let worker_db = Arc::new(DictionaryDatabase::worker_instance(
            Arc::clone(&self.store),
            self.path.clone(),
            self.media_config.clone(),
            rasterizer,
        ));
        let (tx, rx) = kanal::bounded_async(self.media_config.worker_channel_capacity);
        let cancel = CancellationToken::new();
        let join = tokio::spawn(worker::worker_main(worker_db, rx, cancel.clone()));
        *self.worker.lock() = Some(WorkerHandle::new(tx, cancel, join));
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.store.is_open()
    }

    pub async fn close(&self) -> Result<(), DictionaryError> {
        self.store.close()?;
        Ok(())
    }

    /// Closes everything, physically deletes the backing file, and
    /// re-prepares. Returns whether the physical delete succeeded; the
    /// store is usable either way.
    pub async fn purge(&self) -> Result<bool, DictionaryError> {
        if self.store.is_opening() {
            return Err(DictionaryError::PurgeWhileOpening);
        }
        if self.store.is_open() {
            self.store.close()?;
        }
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        let mut deleted = false;
        match Store::delete_database(self.path.clone()).await {
            Ok(()) => deleted = true,
            Err(e) => tracing::error!(error = %e, "failed to delete the store file during purge"),
        }
        self.prepare().await?;
        Ok(deleted)
    }

    /// Deletes every row of `title` across the six child stores (in
    /// parallel), then the registry row. Progress fires once per store as
    /// its keys are discovered and every `progress_rate`-th deletion (or
    /// on the final one).
    pub async fn delete_dictionary(
        &self,
        title: &str,
        progress_rate: u64,
        on_progress: DeleteProgressFn,
    ) -> Result<(), DictionaryError> {
        let progress_rate = progress_rate.max(1);
        let registry_target: [(&str, &str); 1] = [(stores::DICTIONARIES, "title")];
        let target_groups: [&[(&str, &str)]; 2] = [&CHILD_TARGETS, &registry_target];
        let store_count = target_groups.iter().map(|targets| targets.len()).sum();

        struct Shared {
            data: DeleteDictionaryProgress,
            callback: DeleteProgressFn,
        }
        let shared = Arc::new(Mutex::new(Shared {
            data: DeleteDictionaryProgress {
                store_count,
                ..DeleteDictionaryProgress::default()
            },
            callback: on_progress,
        }));

        // The registry row goes last: a crash mid-delete leaves an
        // orphaned-but-still-registered dictionary, never a phantom row
        // set without a registry entry.
        let query = Query::only(title);
        for targets in target_groups {
            let deletions = targets.iter().map(|(store, index)| {
                let filter_shared = Arc::clone(&shared);
                let tick_shared = Arc::clone(&shared);
                self.store.bulk_delete(
                    store,
                    Some(index),
                    &query,
                    Some(Box::new(move |keys: Vec<u64>| {
                        let mut guard = filter_shared.lock();
                        let Shared { data, callback } = &mut *guard;
                        data.stores_processed += 1;
                        data.count += keys.len() as u64;
                        callback(data);
                        keys
                    })),
                    Some(Box::new(move |_completed, _total| {
                        let mut guard = tick_shared.lock();
                        let Shared { data, callback } = &mut *guard;
                        data.processed += 1;
                        if data.processed % progress_rate == 0 || data.processed == data.count {
                            callback(data);
                        }
                    })),
                )
            });
            futures_util::future::try_join_all(deletions).await?;
        }
        Ok(())
    }

    // Term lookups.

    /// Bulk term lookup with exact/prefix/suffix semantics.
    ///
    /// A row id is emitted at most once across the whole input list and
    /// both index scans; a prefix/suffix hit whose indexed field equals
    /// the input term is upgraded to an exact match.
    pub async fn find_terms_bulk(
        &self,
        terms: &[String],
        dictionaries: &DictionarySet,
        match_type: MatchType,
    ) -> Result<Vec<TermEntry>, DictionaryError> {
        let index_names: [&'static str; 2] = match match_type {
            MatchType::Suffix => ["expressionReverse", "readingReverse"],
            _ => ["expression", "reading"],
        };
        let make_query = move |term: &String| match match_type {
            MatchType::Exact => Query::only(term.as_str()),
            MatchType::Prefix => Query::prefix(term),
            MatchType::Suffix => Query::prefix(&reverse_string(term)),
        };

        let mut visited: HashSet<u64> = HashSet::new();
        self.find_multi_bulk(
            stores::TERMS,
            &index_names,
            terms,
            make_query,
            move |row: &TermRecord, id, _term| {
                dictionaries.contains(&row.dictionary) && visited.insert(id)
            },
            move |row, id, context| {
                let source_is_term = context.index_index == 0;
                let match_source = if source_is_term {
                    MatchSource::Term
                } else {
                    MatchSource::Reading
                };
                let matched_field = if source_is_term {
                    &row.expression
                } else {
                    &row.reading
                };
                let match_type = if matched_field == context.item {
                    MatchType::Exact
                } else {
                    match_type
                };
                Ok(create_term(
                    match_source,
                    match_type,
                    row,
                    id,
                    context.item_index,
                ))
            },
        )
        .await
    }

    /// Matches `(term, reading)` pairs exactly.
    pub async fn find_terms_exact_bulk(
        &self,
        items: &[TermExactRequest],
        dictionaries: &DictionarySet,
    ) -> Result<Vec<TermEntry>, DictionaryError> {
        self.find_multi_bulk(
            stores::TERMS,
            &["expression"],
            items,
            |item: &TermExactRequest| Query::only(item.term.as_str()),
            |row: &TermRecord, _id, item| {
                row.reading == item.reading && dictionaries.contains(&row.dictionary)
            },
            |row, id, context| {
                Ok(create_term(
                    MatchSource::Term,
                    MatchType::Exact,
                    row,
                    id,
                    context.item_index,
                ))
            },
        )
        .await
    }

    /// Matches `(dictionary, sequence)` pairs exactly.
    pub async fn find_terms_by_sequence_bulk(
        &self,
        items: &[TermSequenceRequest],
    ) -> Result<Vec<TermEntry>, DictionaryError> {
        self.find_multi_bulk(
            stores::TERMS,
            &["sequence"],
            items,
            |item: &TermSequenceRequest| Query::only(item.sequence),
            |row: &TermRecord, _id, item| row.dictionary == item.dictionary,
            |row, id, context| {
                Ok(create_term(
                    MatchSource::Sequence,
                    MatchType::Exact,
                    row,
                    id,
                    context.item_index,
                ))
            },
        )
        .await
    }

    pub async fn find_term_meta_bulk(
        &self,
        terms: &[String],
        dictionaries: &DictionarySet,
    ) -> Result<Vec<TermMetaEntry>, DictionaryError> {
        #[derive(Deserialize)]
        struct Row {
            dictionary: String,
            expression: String,
            mode: String,
            data: Value,
        }
        self.find_multi_bulk(
            stores::TERM_META,
            &["expression"],
            terms,
            |term: &String| Query::only(term.as_str()),
            |row: &Row, _id, _term| dictionaries.contains(&row.dictionary),
            |row, _id, context| {
                let mode = match row.mode.as_str() {
                    "freq" => TermMetaMode::Freq,
                    "pitch" => TermMetaMode::Pitch,
                    "ipa" => TermMetaMode::Ipa,
                    other => {
                        return Err(DictionaryError::UnknownTermMetaMode(other.to_string()));
                    }
                };
                Ok(TermMetaEntry {
                    index: context.item_index,
                    term: row.expression,
                    mode,
                    data: row.data,
                    dictionary: row.dictionary,
                })
            },
        )
        .await
    }

    pub async fn find_kanji_bulk(
        &self,
        characters: &[String],
        dictionaries: &DictionarySet,
    ) -> Result<Vec<KanjiEntry>, DictionaryError> {
        self.find_multi_bulk(
            stores::KANJI,
            &["character"],
            characters,
            |character: &String| Query::only(character.as_str()),
            |row: &KanjiRecord, _id, _character| dictionaries.contains(&row.dictionary),
            |row, _id, context| {
                Ok(KanjiEntry {
                    index: context.item_index,
                    character: row.character,
                    onyomi: split_field(Some(row.onyomi.as_str())),
                    kunyomi: split_field(Some(row.kunyomi.as_str())),
                    tags: split_field(Some(row.tags.as_str())),
                    definitions: row.meanings,
                    stats: row
                        .stats
                        .as_ref()
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default(),
                    dictionary: row.dictionary,
                })
            },
        )
        .await
    }

    pub async fn find_kanji_meta_bulk(
        &self,
        characters: &[String],
        dictionaries: &DictionarySet,
    ) -> Result<Vec<KanjiMetaEntry>, DictionaryError> {
        #[derive(Deserialize)]
        struct Row {
            dictionary: String,
            character: String,
            mode: String,
            data: Value,
        }
        self.find_multi_bulk(
            stores::KANJI_META,
            &["character"],
            characters,
            |character: &String| Query::only(character.as_str()),
            |row: &Row, _id, _character| dictionaries.contains(&row.dictionary),
            |row, _id, context| {
                Ok(KanjiMetaEntry {
                    index: context.item_index,
                    character: row.character,
                    mode: row.mode,
                    data: row.data,
                    dictionary: row.dictionary,
                })
            },
        )
        .await
    }

    /// First matching tag per `(dictionary, name)` pair: one result slot
    /// per input item, in input order.
    pub async fn find_tag_meta_bulk(
        &self,
        items: &[TagMetaRequest],
    ) -> Result<Vec<Option<Tag>>, DictionaryError> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let dictionary = item.dictionary.clone();
            let found = self
                .store
                .find_first(
                    stores::TAG_META,
                    Some("name"),
                    Some(&Query::only(item.name.as_str())),
                    move |row| {
                        row.get("dictionary").and_then(Value::as_str) == Some(dictionary.as_str())
                    },
                )
                .await?;
            results.push(match found {
                Some((_, row)) => Some(serde_json::from_value(row)?),
                None => None,
            });
        }
        Ok(results)
    }

    pub async fn find_tag_for_title(
        &self,
        name: &str,
        dictionary: &str,
    ) -> Result<Option<Tag>, DictionaryError> {
        let dictionary = dictionary.to_string();
        let found = self
            .store
            .find_first(
                stores::TAG_META,
                Some("name"),
                Some(&Query::only(name)),
                move |row| {
                    row.get("dictionary").and_then(Value::as_str) == Some(dictionary.as_str())
                },
            )
            .await?;
        Ok(match found {
            Some((_, row)) => Some(serde_json::from_value(row)?),
            None => None,
        })
    }

    // Media.

    pub async fn get_media(&self, items: &[MediaRequest]) -> Result<Vec<Media>, DictionaryError> {
        self.find_multi_bulk(
            stores::MEDIA,
            &["path"],
            items,
            |item: &MediaRequest| Query::only(item.path.as_str()),
            |row: &MediaRecord, _id, item| row.dictionary == item.dictionary,
            |row, _id, context| {
                Ok(Media {
                    index: context.item_index,
                    dictionary: row.dictionary,
                    path: row.path,
                    media_type: row.media_type,
                    width: row.width,
                    height: row.height,
                    content: row.content,
                })
            },
        )
        .await
    }

    /// Draws a batch of media requests.
    ///
    /// On the orchestrator the batch and the caller's reply endpoint are
    /// forwarded to the worker verbatim; completion is signaled over that
    /// channel, never through this return value. On the worker the draw
    /// pipeline runs here.
    pub async fn draw_media(
        &self,
        requests: Vec<DrawMediaRequest>,
        reply: AsyncSender<DrawReply>,
    ) -> Result<(), DictionaryError> {
        let forward = self.worker.lock().as_ref().map(WorkerHandle::sender);
        if let Some(tx) = forward {
            tx.send(WorkerRequest::DrawMedia { requests, reply })
                .await
                .map_err(|_| DictionaryError::WorkerUnavailable)?;
            return Ok(());
        }
        let Some(rasterizer) = self.rasterizer.clone() else {
            return Err(DictionaryError::RasterizerUnavailable);
        };
        draw::perform(self, &rasterizer, requests, reply).await
    }

    /// Hands out a request port wired into the database worker.
    pub async fn connect_to_database_worker(
        self: &Arc<Self>,
    ) -> Result<AsyncSender<WorkerRequest>, DictionaryError> {
        let (port_tx, port_rx) =
            kanal::bounded_async(self.media_config.worker_channel_capacity);
        let forward = self.worker.lock().as_ref().map(WorkerHandle::sender);
        match forward {
            Some(tx) => {
                tx.send(WorkerRequest::Connect { port: port_rx })
                    .await
                    .map_err(|_| DictionaryError::WorkerUnavailable)?;
            }
            // We are the worker: serve the port ourselves.
            None => {
                tokio::spawn(worker::serve_port(Arc::clone(self), port_rx));
            }
        }
        Ok(port_tx)
    }

    pub(crate) async fn find_draw_media(
        &self,
        grouped: &[DrawMediaGroupedRequest],
    ) -> Result<Vec<DrawMedia>, DictionaryError> {
        self.find_multi_bulk(
            stores::MEDIA,
            &["path"],
            grouped,
            |item: &DrawMediaGroupedRequest| Query::only(item.path.as_str()),
            |row: &MediaRecord, _id, item| row.dictionary == item.dictionary,
            |row, _id, context| {
                Ok(DrawMedia {
                    index: context.item_index,
                    dictionary: row.dictionary,
                    path: row.path,
                    media_type: row.media_type,
                    width: row.width,
                    height: row.height,
                    content: row.content,
                    canvas_indexes: context.item.canvas_indexes.clone(),
                    canvas_width: context.item.canvas_width,
                    canvas_height: context.item.canvas_height,
                    generation: context.item.generation,
                })
            },
        )
        .await
    }

    // Registry.

    pub async fn get_dictionary_info(&self) -> Result<Vec<DictionarySummary>, DictionaryError> {
        let rows = self.store.get_all(stores::DICTIONARIES, None, None).await?;
        rows.into_iter()
            .map(|(_, row)| serde_json::from_value(row).map_err(DictionaryError::from))
            .collect()
    }

    pub async fn dictionary_exists(&self, title: &str) -> Result<bool, DictionaryError> {
        let found = self
            .store
            .find_first(
                stores::DICTIONARIES,
                Some("title"),
                Some(&Query::only(title)),
                |_| true,
            )
            .await?;
        Ok(found.is_some())
    }

    /// Per-dictionary row counts across the six child stores, optionally
    /// preceded by a grand-total group.
    pub async fn get_dictionary_counts(
        &self,
        dictionary_names: &[String],
        get_total: bool,
    ) -> Result<DictionaryCounts, DictionaryError> {
        let mut targets = Vec::new();
        if get_total {
            for (store, _) in CHILD_TARGETS {
                targets.push(CountTarget {
                    store: store.to_string(),
                    index: None,
                    query: None,
                });
            }
        }
        for name in dictionary_names {
            for (store, index) in CHILD_TARGETS {
                targets.push(CountTarget {
                    store: store.to_string(),
                    index: Some(index.to_string()),
                    query: Some(Query::only(name.as_str())),
                });
            }
        }

        let results = self.store.bulk_count(targets).await?;
        let mut groups = results.chunks_exact(CHILD_TARGETS.len()).map(|chunk| {
            StoreCounts {
                kanji: chunk[0],
                kanji_meta: chunk[1],
                terms: chunk[2],
                term_meta: chunk[3],
                tag_meta: chunk[4],
                media: chunk[5],
            }
        });
        let total = if get_total { groups.next() } else { None };
        Ok(DictionaryCounts {
            total,
            counts: groups.collect(),
        })
    }

    // Importer interface.

    /// Adds `count` records starting at `start`, in one transaction.
    pub async fn bulk_add<T: DictionaryRecord>(
        &self,
        items: &[T],
        start: usize,
        count: usize,
    ) -> Result<(), DictionaryError> {
        let Some(rows) = clamp_rows(items, start, count)? else {
            return Ok(());
        };
        self.store.bulk_add(T::STORE, &rows, 0, rows.len()).await?;
        Ok(())
    }

    /// Adds one record and returns its assigned primary key.
    pub async fn add_with_result<T: DictionaryRecord>(
        &self,
        item: &T,
    ) -> Result<u64, DictionaryError> {
        Ok(self.store.add_with_result(T::STORE, item.to_row()?).await?)
    }

    /// Updates `count` records starting at `start`; records without a
    /// primary key are added.
    pub async fn bulk_update<T: DictionaryRecord>(
        &self,
        items: &[DatabaseUpdateItem<T>],
        start: usize,
        count: usize,
    ) -> Result<(), DictionaryError> {
        let len = items.len();
        if start >= len {
            return Ok(());
        }
        let count = count.min(len - start);
        if count == 0 {
            return Ok(());
        }
        let rows = items[start..start + count]
            .iter()
            .map(|item| {
                Ok(jiten_store::UpdateItem {
                    primary_key: item.primary_key,
                    data: item.data.to_row()?,
                })
            })
            .collect::<Result<Vec<_>, DictionaryError>>()?;
        self.store.bulk_update(T::STORE, &rows, 0, rows.len()).await?;
        Ok(())
    }

    /// Runs `get_all` per `(item, index)` pair, applying `predicate` and
    /// `create` to every row. Results carry the input item index so the
    /// caller can reassemble against input order.
    async fn find_multi_bulk<T, I, R>(
        &self,
        store: &'static str,
        index_names: &[&'static str],
        items: &[I],
        make_query: impl Fn(&I) -> Query,
        mut predicate: impl FnMut(&T, u64, &I) -> bool,
        mut create: impl FnMut(T, u64, FindContext<'_, I>) -> Result<R, DictionaryError>,
    ) -> Result<Vec<R>, DictionaryError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut results = Vec::new();
        if items.is_empty() || index_names.is_empty() {
            return Ok(results);
        }
        for (item_index, item) in items.iter().enumerate() {
            let query = make_query(item);
            for (index_index, index_name) in index_names.iter().enumerate() {
                let rows = self
                    .store
                    .get_all(store, Some(index_name), Some(&query))
                    .await?;
                for (id, row) in rows {
                    let row: T = serde_json::from_value(row)?;
                    if predicate(&row, id, item) {
                        results.push(create(
                            row,
                            id,
                            FindContext {
                                item,
                                item_index,
                                index_index,
                            },
                        )?);
                    }
                }
            }
        }
        Ok(results)
    }
}

fn create_term(
    match_source: MatchSource,
    match_type: MatchType,
    row: TermRecord,
    id: u64,
    index: usize,
) -> TermEntry {
    TermEntry {
        index,
        match_type,
        match_source,
        term: row.expression,
        reading: row.reading,
        definition_tags: split_field(row.definition_tags.or(row.tags).as_deref()),
        term_tags: split_field(Some(row.term_tags.as_str())),
        rules: split_field(Some(row.rules.as_str())),
        definitions: row.glossary,
        score: row.score,
        dictionary: row.dictionary,
        id,
        sequence: row.sequence.unwrap_or(-1),
    }
}

fn clamp_rows<T: DictionaryRecord>(
    items: &[T],
    start: usize,
    count: usize,
) -> Result<Option<Vec<Value>>, DictionaryError> {
    let len = items.len();
    if start >= len {
        return Ok(None);
    }
    let count = count.min(len - start);
    if count == 0 {
        return Ok(None);
    }
    let rows = items[start..start + count]
        .iter()
        .map(DictionaryRecord::to_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(rows))
}
