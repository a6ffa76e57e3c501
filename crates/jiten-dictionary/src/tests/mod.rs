mod dictionary_tests;

use jiten_config::{Config, MediaConfig};
use jiten_config::database::DatabaseConfig;
use serde_json::json;
use tempfile::TempDir;

use crate::types::TermRecord;

pub(crate) fn test_config(dir: &TempDir) -> Config {
    Config {
        database: DatabaseConfig {
            path: dir.path().join("dict.redb"),
        },
        media: MediaConfig {
            font_path: None,
            worker_channel_capacity: 16,
            delete_progress_rate: 2,
        },
    }
}

pub(crate) fn term(
    dictionary: &str,
    expression: &str,
    reading: &str,
    sequence: Option<i64>,
) -> TermRecord {
    TermRecord {
        dictionary: dictionary.to_string(),
        expression: expression.to_string(),
        reading: reading.to_string(),
        sequence,
        definition_tags: Some("noun".to_string()),
        tags: None,
        term_tags: "common".to_string(),
        rules: String::new(),
        score: 10.0,
        glossary: vec![json!("a definition")],
    }
}
