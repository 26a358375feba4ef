//! ClickHouse configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// ClickHouse client configuration.
///
/// URL and database have no defaults; they must come from the environment
/// or a config file.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClickHouseConfig {
    /// ClickHouse HTTP URL
    #[validate(required, url)]
    pub url: Option<String>,
    /// Database name
    #[validate(required, length(min = 1))]
    pub database: Option<String>,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<String>,
    /// Query timeout in seconds
    #[serde(default = "default_timeout_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: None,
            database: None,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}
