//! Realtime database client.
//!
//! The sink for the climate and telemetry pipelines is a hosted JSON tree
//! addressed by key paths (`/sensor/dht22/2024-03-07/09:05:03`). Writes go
//! through its REST interface: a `PUT` of a JSON document to
//! `<database url><path>.json` replaces whatever was stored at that path.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Characters the database does not allow in keys.
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '$', '#', '[', ']', '/'];

/// A validated, absolute key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbPath {
    segments: Vec<String>,
}

impl DbPath {
    /// Parse an absolute path such as `/sensor/dht22`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the path is relative, has empty
    /// segments, or contains characters the database rejects.
    pub fn parse(path: &str) -> Result<Self> {
        let Some(rest) = path.strip_prefix('/') else {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "path must start with '/'",
            });
        };
        let mut parsed = Self {
            segments: Vec::new(),
        };
        if rest.is_empty() {
            return Ok(parsed);
        }
        for segment in rest.split('/') {
            parsed = parsed.child(segment)?;
        }
        Ok(parsed)
    }

    /// The root of the tree.
    #[must_use]
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Append one key to the path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the key is empty or contains a
    /// forbidden character.
    pub fn child(&self, key: &str) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::InvalidPath {
                path: format!("{self}/"),
                reason: "empty key",
            });
        }
        if key.contains(FORBIDDEN_KEY_CHARS) {
            return Err(Error::InvalidPath {
                path: key.to_string(),
                reason: "keys may not contain '.', '$', '#', '[', ']' or '/'",
            });
        }
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Ok(Self { segments })
    }

    /// The individual keys of the path.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl std::fmt::Display for DbPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Destination for pipeline records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// A short name for logging.
    fn name(&self) -> &'static str;

    /// Store `value` at `path`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected or the service is unreachable.
    async fn set(&self, path: &DbPath, value: Value) -> Result<()>;
}

/// REST client for the realtime database.
#[derive(Debug, Clone)]
pub struct RealtimeDatabase {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl RealtimeDatabase {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        Self::with_timeout(config, config.timeout())
    }

    /// Create a client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(config: &DatabaseConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// The REST URL for a path, without the auth parameter.
    #[must_use]
    pub fn url_for(&self, path: &DbPath) -> String {
        format!("{}{path}.json", self.base_url)
    }
}

#[async_trait]
impl RecordSink for RealtimeDatabase {
    fn name(&self) -> &'static str {
        "realtime-database"
    }

    async fn set(&self, path: &DbPath, value: Value) -> Result<()> {
        let url = self.url_for(path);
        debug!(%url, "PUT record");

        let mut request = self.client.put(&url).json(&value);
        if let Some(token) = &self.auth_token {
            request = request.query(&[("auth", token)]);
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

/// Sink that only logs what would have been written.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunSink;

#[async_trait]
impl RecordSink for DryRunSink {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn set(&self, path: &DbPath, value: Value) -> Result<()> {
        info!(%path, %value, "dry run: record not sent");
        Ok(())
    }
}

/// In-memory sink that keeps every write, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemorySink {
    writes: Mutex<Vec<(DbPath, Value)>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// All writes so far, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<(DbPath, Value)> {
        self.writes
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn set(&self, path: &DbPath, value: Value) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::internal("memory sink set to fail"));
        }
        self.writes
            .lock()
            .map_err(|_| Error::internal("memory sink lock poisoned"))?
            .push((path.clone(), value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::serve_once;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_path() {
        let path = DbPath::parse("/sensor/dht22").unwrap();
        assert_eq!(path.segments(), ["sensor", "dht22"]);
        assert_eq!(path.to_string(), "/sensor/dht22");
    }

    #[test]
    fn test_parse_root() {
        let path = DbPath::parse("/").unwrap();
        assert!(path.segments().is_empty());
        assert_eq!(path, DbPath::root());
        assert_eq!(path.to_string(), "/");
    }

    #[test]
    fn test_parse_rejects_relative() {
        let err = DbPath::parse("sensor/dht22").unwrap_err();
        assert!(err.to_string().contains("must start with '/'"));
    }

    #[test]
    fn test_parse_rejects_empty_segment() {
        assert!(DbPath::parse("/sensor//dht22").is_err());
        assert!(DbPath::parse("/sensor/").is_err());
    }

    #[test]
    fn test_child_accepts_time_keys() {
        let path = DbPath::parse("/sensor/dht22")
            .unwrap()
            .child("2024-03-07")
            .unwrap()
            .child("09:05:03")
            .unwrap();
        assert_eq!(path.to_string(), "/sensor/dht22/2024-03-07/09:05:03");
    }

    #[test]
    fn test_child_rejects_forbidden_characters() {
        let root = DbPath::root();
        for key in ["a.b", "$x", "#", "[0]", "a/b"] {
            assert!(root.child(key).is_err(), "{key} should be rejected");
        }
    }

    #[test]
    fn test_url_for_strips_trailing_slash() {
        let config = DatabaseConfig {
            url: "https://example.firebaseio.com/".to_string(),
            ..DatabaseConfig::default()
        };
        let db = RealtimeDatabase::new(&config).unwrap();
        let path = DbPath::parse("/pixhawk/telemetry").unwrap();
        assert_eq!(
            db.url_for(&path),
            "https://example.firebaseio.com/pixhawk/telemetry.json"
        );
    }

    #[tokio::test]
    async fn test_memory_sink_records_writes() {
        let sink = MemorySink::new();
        let path = DbPath::parse("/a").unwrap();
        sink.set(&path, serde_json::json!({"x": 1})).await.unwrap();

        let writes = sink.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, path);
        assert_eq!(writes[0].1["x"], 1);
    }

    #[tokio::test]
    async fn test_memory_sink_failing() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        let path = DbPath::parse("/a").unwrap();
        assert!(sink.set(&path, Value::Null).await.is_err());
        assert!(sink.writes().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_sink_accepts_everything() {
        let sink = DryRunSink;
        let path = DbPath::parse("/a").unwrap();
        assert!(sink.set(&path, serde_json::json!([1, 2])).await.is_ok());
    }

    #[tokio::test]
    async fn test_realtime_database_put() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, "HTTP/1.1 200 OK"));

        let config = DatabaseConfig {
            url: format!("http://{addr}/"),
            auth_token: Some("secret".to_string()),
            timeout_secs: 5,
        };
        let db = RealtimeDatabase::new(&config).unwrap();
        let path = DbPath::parse("/sensor/dht22/2024-03-07/09:05:03").unwrap();
        db.set(&path, serde_json::json!({"suhu": "23.4"}))
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /sensor/dht22/2024-03-07/09:05:03.json?auth=secret"));
        assert!(request.contains(r#"{"suhu":"23.4"}"#));
    }

    #[tokio::test]
    async fn test_realtime_database_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, "HTTP/1.1 401 Unauthorized"));

        let config = DatabaseConfig {
            url: format!("http://{addr}"),
            auth_token: None,
            timeout_secs: 5,
        };
        let db = RealtimeDatabase::new(&config).unwrap();
        let path = DbPath::parse("/a").unwrap();
        let err = db.set(&path, Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));

        server.await.unwrap();
    }
}
