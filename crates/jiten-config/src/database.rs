use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Backing store file
    pub path: PathBuf,
}

impl DatabaseConfig {
    pub fn new() -> Self {
        let path = env::var("JITEN_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("jiten.redb"));

        DatabaseConfig { path }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::new()
    }
}
