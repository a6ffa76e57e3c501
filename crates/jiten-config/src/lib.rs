use serde::{Deserialize, Serialize};

pub mod database;
pub mod media;

pub use self::database::DatabaseConfig;
pub use self::media::MediaConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub media: MediaConfig,
}

impl Config {
    pub fn new() -> Self {
        Config {
            database: DatabaseConfig::new(),
            media: MediaConfig::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}
