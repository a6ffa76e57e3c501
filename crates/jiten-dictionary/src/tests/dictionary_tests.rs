use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

use super::{term, test_config};
use crate::database::{DatabaseUpdateItem, DeleteDictionaryProgress, DictionaryDatabase};
use crate::error::DictionaryError;
use crate::types::{
    DictionarySummary, KanjiMetaRecord, KanjiRecord, MatchSource, MatchType, MediaRecord,
    MediaRequest, Tag, TagMetaRequest, TermExactRequest, TermMetaMode, TermMetaRecord,
    TermSequenceRequest,
};

async fn prepared(dir: &TempDir) -> DictionaryDatabase {
    let db = DictionaryDatabase::new(&test_config(dir));
    db.prepare().await.expect("prepare failed");
    db
}

fn dictionaries(titles: &[&str]) -> HashSet<String> {
    titles.iter().map(|t| t.to_string()).collect()
}

fn summary(title: &str) -> DictionarySummary {
    DictionarySummary {
        title: title.to_string(),
        revision: "1".to_string(),
        version: 3,
        sequenced: false,
        import_date: None,
        counts: None,
    }
}

#[tokio::test]
async fn prefix_suffix_and_exact_follow_their_indices() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    db.bulk_add(&[term("D1", "encyclopedia", "えんさいくろぺでぃあ", None)], 0, 1)
        .await
        .unwrap();
    let dicts = dictionaries(&["D1"]);

    let by_prefix = db
        .find_terms_bulk(&["ency".to_string()], &dicts, MatchType::Prefix)
        .await
        .unwrap();
    assert_eq!(by_prefix.len(), 1);
    assert_eq!(by_prefix[0].term, "encyclopedia");
    assert_eq!(by_prefix[0].match_type, MatchType::Prefix);
    assert_eq!(by_prefix[0].match_source, MatchSource::Term);

    let by_suffix = db
        .find_terms_bulk(&["pedia".to_string()], &dicts, MatchType::Suffix)
        .await
        .unwrap();
    assert_eq!(by_suffix.len(), 1);
    assert_eq!(by_suffix[0].term, "encyclopedia");
    assert_eq!(by_suffix[0].match_type, MatchType::Suffix);

    let by_exact = db
        .find_terms_bulk(&["ency".to_string()], &dicts, MatchType::Exact)
        .await
        .unwrap();
    assert!(by_exact.is_empty());
}

#[tokio::test]
async fn full_length_prefix_hit_is_upgraded_to_exact() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    db.bulk_add(&[term("D1", "encyclopedia", "えんさいくろぺでぃあ", None)], 0, 1)
        .await
        .unwrap();

    let hits = db
        .find_terms_bulk(
            &["encyclopedia".to_string()],
            &dictionaries(&["D1"]),
            MatchType::Prefix,
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].match_type, MatchType::Exact);
}

#[tokio::test]
async fn no_row_id_is_ever_returned_twice() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    // Expression and reading are identical, so both index scans hit.
    db.bulk_add(&[term("D1", "encyclopedia", "encyclopedia", None)], 0, 1)
        .await
        .unwrap();
    let dicts = dictionaries(&["D1"]);

    let single = db
        .find_terms_bulk(&["ency".to_string()], &dicts, MatchType::Prefix)
        .await
        .unwrap();
    assert_eq!(single.len(), 1);

    // Two input terms converging on the same row emit it once, for the
    // first input that reached it.
    let converged = db
        .find_terms_bulk(
            &["ency".to_string(), "encyc".to_string()],
            &dicts,
            MatchType::Prefix,
        )
        .await
        .unwrap();
    assert_eq!(converged.len(), 1);
    assert_eq!(converged[0].index, 0);
}

#[tokio::test]
async fn lookups_filter_by_dictionary_set() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    db.bulk_add(
        &[
            term("D1", "apple", "りんご", None),
            term("D2", "apple", "りんご", None),
        ],
        0,
        2,
    )
    .await
    .unwrap();

    let hits = db
        .find_terms_bulk(
            &["apple".to_string()],
            &dictionaries(&["D2"]),
            MatchType::Exact,
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].dictionary, "D2");
}

#[tokio::test]
async fn exact_bulk_matches_term_and_reading_pairs() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    db.bulk_add(
        &[
            term("D1", "行く", "いく", None),
            term("D1", "行く", "ゆく", None),
        ],
        0,
        2,
    )
    .await
    .unwrap();
    let dicts = dictionaries(&["D1"]);

    let hits = db
        .find_terms_exact_bulk(
            &[TermExactRequest {
                term: "行く".to_string(),
                reading: "ゆく".to_string(),
            }],
            &dicts,
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].reading, "ゆく");
    assert_eq!(hits[0].match_type, MatchType::Exact);

    let misses = db
        .find_terms_exact_bulk(
            &[TermExactRequest {
                term: "行く".to_string(),
                reading: "おかしい".to_string(),
            }],
            &dicts,
        )
        .await
        .unwrap();
    assert!(misses.is_empty());
}

#[tokio::test]
async fn sequence_bulk_matches_dictionary_and_sequence_pairs() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    db.bulk_add(
        &[
            term("D1", "水", "みず", Some(5)),
            term("D2", "水", "みず", Some(5)),
            term("D1", "火", "ひ", None),
        ],
        0,
        3,
    )
    .await
    .unwrap();

    let hits = db
        .find_terms_by_sequence_bulk(&[TermSequenceRequest {
            sequence: 5,
            dictionary: "D1".to_string(),
        }])
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].dictionary, "D1");
    assert_eq!(hits[0].match_source, MatchSource::Sequence);
    assert_eq!(hits[0].sequence, 5);
}

#[tokio::test]
async fn rows_without_sequence_report_minus_one() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    db.bulk_add(&[term("D1", "火", "ひ", None)], 0, 1).await.unwrap();

    let hits = db
        .find_terms_bulk(
            &["火".to_string()],
            &dictionaries(&["D1"]),
            MatchType::Exact,
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].sequence, -1);
}

#[tokio::test]
async fn term_meta_modes_are_matched_exhaustively() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    db.bulk_add(
        &[
            TermMetaRecord {
                dictionary: "D1".to_string(),
                expression: "水".to_string(),
                mode: TermMetaMode::Freq,
                data: json!(42),
            },
            TermMetaRecord {
                dictionary: "D1".to_string(),
                expression: "水".to_string(),
                mode: TermMetaMode::Pitch,
                data: json!({ "reading": "みず", "pitches": [{ "position": 0 }] }),
            },
        ],
        0,
        2,
    )
    .await
    .unwrap();

    let metas = db
        .find_term_meta_bulk(&["水".to_string()], &dictionaries(&["D1"]))
        .await
        .unwrap();
    assert_eq!(metas.len(), 2);
    assert_eq!(metas[0].mode, TermMetaMode::Freq);
    assert_eq!(metas[1].mode, TermMetaMode::Pitch);
}

#[tokio::test]
async fn unknown_term_meta_mode_is_an_error() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    // Written through the raw store interface, as a broken import would.
    db.store
        .bulk_add(
            "termMeta",
            &[json!({
                "dictionary": "D1",
                "expression": "変",
                "mode": "glitch",
                "data": 1,
            })],
            0,
            1,
        )
        .await
        .unwrap();

    let result = db
        .find_term_meta_bulk(&["変".to_string()], &dictionaries(&["D1"]))
        .await;
    assert!(matches!(
        result,
        Err(DictionaryError::UnknownTermMetaMode(mode)) if mode == "glitch"
    ));
}

#[tokio::test]
async fn kanji_rows_split_their_reading_fields() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    db.bulk_add(
        &[KanjiRecord {
            dictionary: "D1".to_string(),
            character: "語".to_string(),
            onyomi: "ゴ".to_string(),
            kunyomi: "かた.る かた.らう".to_string(),
            tags: String::new(),
            meanings: vec!["word".to_string(), "language".to_string()],
            stats: None,
        }],
        0,
        1,
    )
    .await
    .unwrap();

    let entries = db
        .find_kanji_bulk(&["語".to_string()], &dictionaries(&["D1"]))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].onyomi, vec!["ゴ"]);
    assert_eq!(entries[0].kunyomi, vec!["かた.る", "かた.らう"]);
    assert!(entries[0].tags.is_empty());
    assert!(entries[0].stats.is_empty());

    db.bulk_add(
        &[KanjiMetaRecord {
            dictionary: "D1".to_string(),
            character: "語".to_string(),
            mode: "freq".to_string(),
            data: json!(120),
        }],
        0,
        1,
    )
    .await
    .unwrap();
    let metas = db
        .find_kanji_meta_bulk(&["語".to_string()], &dictionaries(&["D1"]))
        .await
        .unwrap();
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0].mode, "freq");
}

#[tokio::test]
async fn tag_meta_bulk_keeps_one_slot_per_input_in_order() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    db.bulk_add(
        &[
            Tag {
                dictionary: "D1".to_string(),
                name: "noun".to_string(),
                category: "partOfSpeech".to_string(),
                order: 1,
                notes: "a noun".to_string(),
                score: 0.0,
            },
            Tag {
                dictionary: "D2".to_string(),
                name: "noun".to_string(),
                category: "partOfSpeech".to_string(),
                order: 2,
                notes: "another noun".to_string(),
                score: 0.0,
            },
        ],
        0,
        2,
    )
    .await
    .unwrap();

    let tags = db
        .find_tag_meta_bulk(&[
            TagMetaRequest {
                name: "noun".to_string(),
                dictionary: "D2".to_string(),
            },
            TagMetaRequest {
                name: "missing".to_string(),
                dictionary: "D1".to_string(),
            },
            TagMetaRequest {
                name: "noun".to_string(),
                dictionary: "D1".to_string(),
            },
        ])
        .await
        .unwrap();
    assert_eq!(tags.len(), 3);
    assert_eq!(tags[0].as_ref().map(|t| t.order), Some(2));
    assert!(tags[1].is_none());
    assert_eq!(tags[2].as_ref().map(|t| t.order), Some(1));

    let single = db.find_tag_for_title("noun", "D1").await.unwrap();
    assert_eq!(single.map(|t| t.order), Some(1));
}

#[tokio::test]
async fn registry_rows_answer_installed_queries() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    let id = db.add_with_result(&summary("D1")).await.unwrap();
    assert!(id > 0);

    assert!(db.dictionary_exists("D1").await.unwrap());
    assert!(!db.dictionary_exists("D2").await.unwrap());

    let info = db.get_dictionary_info().await.unwrap();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].title, "D1");
}

#[tokio::test]
async fn counts_group_per_store_with_optional_total() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    db.bulk_add(
        &[
            term("D1", "a", "あ", None),
            term("D1", "b", "い", None),
            term("D2", "c", "う", None),
        ],
        0,
        3,
    )
    .await
    .unwrap();
    db.bulk_add(
        &[KanjiRecord {
            dictionary: "D1".to_string(),
            character: "語".to_string(),
            onyomi: String::new(),
            kunyomi: String::new(),
            tags: String::new(),
            meanings: vec![],
            stats: None,
        }],
        0,
        1,
    )
    .await
    .unwrap();

    let counts = db
        .get_dictionary_counts(&["D1".to_string()], true)
        .await
        .unwrap();
    let total = counts.total.expect("missing total group");
    assert_eq!(total.terms, 3);
    assert_eq!(total.kanji, 1);
    assert_eq!(counts.counts.len(), 1);
    assert_eq!(counts.counts[0].terms, 2);
    assert_eq!(counts.counts[0].kanji, 1);
    assert_eq!(counts.counts[0].media, 0);
}

#[tokio::test]
async fn bulk_update_relinks_media_rows() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    let id = db
        .add_with_result(&MediaRecord {
            dictionary: "D1".to_string(),
            path: "a.png".to_string(),
            media_type: "image/png".to_string(),
            width: 1,
            height: 1,
            content: vec![1, 2, 3],
        })
        .await
        .unwrap();

    db.bulk_update(
        &[DatabaseUpdateItem {
            primary_key: Some(id),
            data: MediaRecord {
                dictionary: "D1".to_string(),
                path: "b.png".to_string(),
                media_type: "image/png".to_string(),
                width: 1,
                height: 1,
                content: vec![4, 5, 6],
            },
        }],
        0,
        1,
    )
    .await
    .unwrap();

    let media = db
        .get_media(&[
            MediaRequest {
                path: "a.png".to_string(),
                dictionary: "D1".to_string(),
            },
            MediaRequest {
                path: "b.png".to_string(),
                dictionary: "D1".to_string(),
            },
        ])
        .await
        .unwrap();
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].path, "b.png");
    assert_eq!(media[0].content, vec![4, 5, 6]);
}

#[tokio::test]
async fn delete_dictionary_clears_child_stores_and_registry() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    for title in ["D1", "D2"] {
        db.add_with_result(&summary(title)).await.unwrap();
        db.bulk_add(
            &[term(title, "apple", "りんご", Some(1)), term(title, "pear", "なし", None)],
            0,
            2,
        )
        .await
        .unwrap();
        db.bulk_add(
            &[Tag {
                dictionary: title.to_string(),
                name: "noun".to_string(),
                category: String::new(),
                order: 0,
                notes: String::new(),
                score: 0.0,
            }],
            0,
            1,
        )
        .await
        .unwrap();
        db.bulk_add(
            &[MediaRecord {
                dictionary: title.to_string(),
                path: "a.png".to_string(),
                media_type: "image/png".to_string(),
                width: 1,
                height: 1,
                content: vec![0],
            }],
            0,
            1,
        )
        .await
        .unwrap();
    }

    let events: Arc<Mutex<Vec<DeleteDictionaryProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    db.delete_dictionary(
        "D1",
        2,
        Box::new(move |progress| sink.lock().push(*progress)),
    )
    .await
    .unwrap();

    assert!(!db.dictionary_exists("D1").await.unwrap());
    assert!(db.dictionary_exists("D2").await.unwrap());

    let remaining = db
        .find_terms_bulk(
            &["apple".to_string()],
            &dictionaries(&["D1", "D2"]),
            MatchType::Exact,
        )
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].dictionary, "D2");

    let counts = db
        .get_dictionary_counts(&["D1".to_string()], false)
        .await
        .unwrap();
    assert_eq!(counts.counts[0].terms, 0);
    assert_eq!(counts.counts[0].tag_meta, 0);
    assert_eq!(counts.counts[0].media, 0);

    let events = events.lock();
    let last = events.last().expect("no progress events");
    // Two terms, one tag, one media row, one registry row.
    assert_eq!(last.count, 5);
    assert_eq!(last.processed, 5);
    assert_eq!(last.stores_processed, 7);
    assert_eq!(last.store_count, 7);
}

#[tokio::test]
async fn purge_leaves_the_store_usable() {
    let dir = TempDir::new().unwrap();
    let db = prepared(&dir).await;
    db.add_with_result(&summary("D1")).await.unwrap();

    let deleted = db.purge().await.unwrap();
    assert!(deleted);
    assert!(db.is_prepared());
    assert!(!db.dictionary_exists("D1").await.unwrap());

    // Still writable after the purge.
    db.add_with_result(&summary("D2")).await.unwrap();
    assert!(db.dictionary_exists("D2").await.unwrap());
}
