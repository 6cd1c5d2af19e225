//! Connection configuration for the MongoDB backend.
//!
//! ```json
//! {
//!     "url": "mongo://db.internal:27017/shop",
//!     "schema": "fallback",
//!     "settings": { "database": "shop" }
//! }
//! ```
//!
//! The URL accepts the `mgdb://` and `mongo://` scheme aliases; both are rewritten to
//! `mongodb://`. An empty URL points at a local server.
//!
//! The database name is resolved from several places, later sources winning:
//!
//! 1. the fallback name passed by the caller (usually the connection name),
//! 2. `schema`,
//! 3. the `schema`, `database` and `db` settings, in that order,
//! 4. the path of the URL, when it names a database.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use url::Url;

/// URL used when none is configured.
pub const DEFAULT_URL: &str = "mongodb://127.0.0.1:27017";

const SCHEME_ALIASES: [&str; 3] = ["mgdb://", "mongo://", "mongodb://"];
const DATABASE_SETTINGS: [&str; 3] = ["schema", "database", "db"];

/// Declarative MongoDB connection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MongoDbConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Free-form driver settings.
    #[serde(default, alias = "setting")]
    pub settings: Map<String, JsonValue>,
}

impl MongoDbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// The connection URL with scheme aliases rewritten.
    pub fn connection_url(&self) -> String {
        let url = self.url.trim();
        if url.is_empty() {
            return DEFAULT_URL.to_string();
        }

        SCHEME_ALIASES
            .iter()
            .find_map(|alias| url.strip_prefix(alias))
            .map(|rest| format!("mongodb://{rest}"))
            .unwrap_or_else(|| url.to_string())
    }

    /// Resolves the database name, starting from `fallback`.
    pub fn database(&self, fallback: &str) -> String {
        let mut database = fallback.to_string();

        if let Some(schema) = self.schema.as_deref().filter(|s| !s.is_empty()) {
            database = schema.to_string();
        }

        for key in DATABASE_SETTINGS {
            let name = self
                .settings
                .get(key)
                .and_then(JsonValue::as_str)
                .filter(|s| !s.is_empty());
            if let Some(name) = name {
                database = name.to_string();
            }
        }

        if let Some(path) = self.url_database() {
            database = path;
        }

        database
    }

    fn url_database(&self) -> Option<String> {
        let parsed = Url::parse(&self.connection_url()).ok()?;
        let path = parsed.path().trim_start_matches('/');

        (!path.is_empty()).then(|| path.to_string())
    }
}
