use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Font used when rasterizing vector media; text will not render
    /// without one
    pub font_path: Option<PathBuf>,
    /// Worker request channel capacity
    pub worker_channel_capacity: usize,
    /// Fire a delete progress tick every this many processed keys
    pub delete_progress_rate: u64,
}

impl MediaConfig {
    pub fn new() -> Self {
        let font_path = env::var("JITEN_FONT_PATH").ok().map(PathBuf::from);

        let worker_channel_capacity = env::var("JITEN_WORKER_CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(256); // draw burst capacity

        let delete_progress_rate = env::var("JITEN_DELETE_PROGRESS_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000);

        MediaConfig {
            font_path,
            worker_channel_capacity,
            delete_progress_rate,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig::new()
    }
}
