//! Persistence: insert records into Supabase and report what was stored.
//!
//! Two layers:
//!
//! * [`RecordStore`] — the raw insert calls, surfacing [`UploadError`].
//!   [`SupabaseStore`] implements it over the PostgREST HTTP API.
//! * [`UploadGateway`] — the boundary the orchestrator uses. It never fails:
//!   errors and empty responses are logged and reported as `None`.
//!
//! A batch insert is one request. PostgREST inserts the array in a single
//! statement, so the outcome is all rows or none; there is no partial-success
//! state to reconcile. There is no local queue either: a failed insert loses
//! the records unless the caller kept them.

use crate::config::StoreConfig;
use crate::error::{PipelineError, UploadError};
use crate::model::{Record, StoredRecord};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Raw insert operations against a persistence service.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert one record and return the stored row.
    async fn insert_one(&self, record: &Record) -> Result<StoredRecord, UploadError>;

    /// Insert all records in one request and return the stored rows.
    async fn insert_many(&self, records: &[Record]) -> Result<Vec<StoredRecord>, UploadError>;
}

/// [`RecordStore`] over Supabase's PostgREST endpoint.
pub struct SupabaseStore {
    client: reqwest::Client,
    endpoint: String,
}

impl SupabaseStore {
    /// Build a store from explicit configuration.
    pub fn new(config: &StoreConfig) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| PipelineError::InvalidConfig("Supabase key contains invalid characters".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| PipelineError::InvalidConfig("Supabase key contains invalid characters".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.table_endpoint(),
        })
    }

    async fn post<T: Serialize + ?Sized + Sync>(
        &self,
        body: &T,
    ) -> Result<Vec<serde_json::Value>, UploadError> {
        let response = self.client.post(&self.endpoint).json(body).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(UploadError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let rows = decode_rows(&text)?;
        debug!("Insert returned {} rows", rows.len());
        Ok(rows)
    }
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn insert_one(&self, record: &Record) -> Result<StoredRecord, UploadError> {
        let rows = self.post(record).await?;
        rows.first()
            .map(|row| StoredRecord::from_row(row, record.clone()))
            .ok_or(UploadError::EmptyResponse)
    }

    async fn insert_many(&self, records: &[Record]) -> Result<Vec<StoredRecord>, UploadError> {
        let rows = self.post(records).await?;
        if rows.is_empty() {
            return Err(UploadError::EmptyResponse);
        }
        // PostgREST echoes rows in insertion order.
        Ok(rows
            .iter()
            .zip(records)
            .map(|(row, record)| StoredRecord::from_row(row, record.clone()))
            .collect())
    }
}

/// Decode a PostgREST `return=representation` body into raw rows.
///
/// Only the array shape is checked; row contents are read by
/// [`StoredRecord::from_row`]. An empty body counts as no rows, a lone object
/// as one row.
fn decode_rows(body: &str) -> Result<Vec<serde_json::Value>, UploadError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| UploadError::Decode(e.to_string()))?;
    match value {
        serde_json::Value::Array(rows) => Ok(rows),
        row @ serde_json::Value::Object(_) => Ok(vec![row]),
        other => Err(UploadError::Decode(format!(
            "expected an array of rows, got {other}"
        ))),
    }
}

/// Insert boundary used by the orchestrator. Never fails.
#[derive(Clone)]
pub struct UploadGateway {
    store: Arc<dyn RecordStore>,
}

impl UploadGateway {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Insert one record. `None` (logged) on any failure.
    pub async fn upload_one(&self, record: &Record) -> Option<StoredRecord> {
        match self.store.insert_one(record).await {
            Ok(stored) => {
                info!("Successfully uploaded income data with ID: {}", stored.id_label());
                Some(stored)
            }
            Err(e) => {
                error!(
                    file = record.file_name.as_deref().unwrap_or("<unknown>"),
                    "Error uploading record: {e}"
                );
                None
            }
        }
    }

    /// Insert all records in one request. `None` (logged) when nothing was
    /// persisted, including for an empty input.
    pub async fn upload_batch(&self, records: &[Record]) -> Option<Vec<StoredRecord>> {
        if records.is_empty() {
            debug!("Batch upload skipped: no records");
            return None;
        }

        match self.store.insert_many(records).await {
            Ok(stored) if !stored.is_empty() => {
                info!("Successfully uploaded {} income records", stored.len());
                Some(stored)
            }
            Ok(_) => {
                error!("No data returned from batch insert of {} records", records.len());
                None
            }
            Err(e) => {
                error!("Error batch uploading {} records: {e}", records.len());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComplianceStatus, RowId};
    use chrono::Utc;
    use std::io;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    enum Behaviour {
        Echo,
        Empty,
        Fail,
    }

    struct FakeStore(Behaviour);

    fn stored(id: i64, record: &Record) -> StoredRecord {
        StoredRecord {
            id: Some(RowId::Int(id)),
            created_at: None,
            record: record.clone(),
        }
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn insert_one(&self, record: &Record) -> Result<StoredRecord, UploadError> {
            match self.0 {
                Behaviour::Echo => Ok(stored(1, record)),
                Behaviour::Empty => Err(UploadError::EmptyResponse),
                Behaviour::Fail => Err(UploadError::Status {
                    status: 500,
                    body: "boom".into(),
                }),
            }
        }

        async fn insert_many(&self, records: &[Record]) -> Result<Vec<StoredRecord>, UploadError> {
            match self.0 {
                Behaviour::Echo => Ok(records
                    .iter()
                    .enumerate()
                    .map(|(i, r)| stored(i as i64 + 1, r))
                    .collect()),
                Behaviour::Empty => Ok(Vec::new()),
                Behaviour::Fail => Err(UploadError::Decode("bad json".into())),
            }
        }
    }

    fn record(name: &str) -> Record {
        Record {
            raw_text: "net income".into(),
            income_info: Some("Found income info (details here).".into()),
            compliance_status: ComplianceStatus::Compliant,
            extracted_at: Utc::now(),
            file_name: Some(name.into()),
            applicant_id: None,
            batch_id: Some("BATCH_001".into()),
        }
    }

    fn gateway(b: Behaviour) -> UploadGateway {
        UploadGateway::new(Arc::new(FakeStore(b)))
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Install an error-level subscriber on the current thread.
    fn capture_errors() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::ERROR)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    #[tokio::test]
    async fn upload_one_returns_stored_row() {
        let stored = gateway(Behaviour::Echo).upload_one(&record("a.pdf")).await;
        assert_eq!(stored.and_then(|s| s.id), Some(RowId::Int(1)));
    }

    #[tokio::test]
    async fn upload_one_absorbs_and_logs_failure() {
        let (logs, _guard) = capture_errors();

        assert!(gateway(Behaviour::Fail).upload_one(&record("a.pdf")).await.is_none());
        assert!(gateway(Behaviour::Empty).upload_one(&record("b.pdf")).await.is_none());

        let text = logs.text();
        assert!(text.contains("ERROR"), "{text}");
        assert!(text.contains("Error uploading record: Insert rejected with HTTP 500"), "{text}");
        assert!(text.contains("No data returned from insert"), "{text}");
        assert!(text.contains("b.pdf"), "{text}");
    }

    #[tokio::test]
    async fn upload_batch_outcomes() {
        let records = vec![record("a.pdf"), record("b.pdf")];
        let ok = gateway(Behaviour::Echo).upload_batch(&records).await;
        assert_eq!(ok.map(|rows| rows.len()), Some(2));
        assert!(gateway(Behaviour::Empty).upload_batch(&records).await.is_none());
        assert!(gateway(Behaviour::Fail).upload_batch(&records).await.is_none());
    }

    #[tokio::test]
    async fn upload_batch_failure_is_logged() {
        let (logs, _guard) = capture_errors();
        let records = vec![record("a.pdf"), record("b.pdf")];

        assert!(gateway(Behaviour::Fail).upload_batch(&records).await.is_none());
        assert!(gateway(Behaviour::Empty).upload_batch(&records).await.is_none());

        let text = logs.text();
        assert!(text.contains("Error batch uploading 2 records"), "{text}");
        assert!(text.contains("No data returned from batch insert of 2 records"), "{text}");
    }

    #[tokio::test]
    async fn upload_batch_of_nothing_makes_no_request() {
        assert!(gateway(Behaviour::Fail).upload_batch(&[]).await.is_none());
    }

    #[test]
    fn decode_rows_handles_empty_object_and_garbage() {
        assert!(decode_rows("").unwrap().is_empty());
        assert!(decode_rows("[]").unwrap().is_empty());
        assert_eq!(decode_rows(r#"{"id": 1}"#).unwrap().len(), 1);
        assert!(matches!(decode_rows("{oops"), Err(UploadError::Decode(_))));
        assert!(matches!(decode_rows("42"), Err(UploadError::Decode(_))));
    }

    #[tokio::test]
    async fn unreachable_supabase_is_absorbed() {
        // Port 9 (discard) on localhost refuses connections on CI machines.
        let config = StoreConfig::new("http://127.0.0.1:9", "test-key")
            .unwrap()
            .with_timeout_secs(2);
        let gateway = UploadGateway::new(Arc::new(SupabaseStore::new(&config).unwrap()));
        assert!(gateway.upload_one(&record("a.pdf")).await.is_none());
    }

    // ── PostgREST wire contract ──────────────────────────────────────────

    /// A request as seen by the local server.
    struct Captured {
        /// Request line and headers, lower-cased.
        head: String,
        body: serde_json::Value,
    }

    /// Serve one canned HTTP response on a local port and hand back the
    /// request that produced it.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];

            let (head_len, content_length) = loop {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&raw[..pos]).to_lowercase();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .map(|v| v.trim().parse::<usize>().unwrap())
                        .unwrap_or(0);
                    break (pos + 4, len);
                }
            };
            while raw.len() < head_len + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before body");
                raw.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            Captured {
                head: String::from_utf8_lossy(&raw[..head_len]).to_lowercase(),
                body: serde_json::from_slice(&raw[head_len..head_len + content_length]).unwrap(),
            }
        });

        (url, handle)
    }

    fn store_at(url: &str) -> SupabaseStore {
        let config = StoreConfig::new(url, "service-key")
            .unwrap()
            .with_timeout_secs(5);
        SupabaseStore::new(&config).unwrap()
    }

    #[tokio::test]
    async fn insert_one_posts_object_with_supabase_headers() {
        let (url, server) = serve_once(
            "201 Created",
            r#"[{"id":"3f2a9c1e-8b7d-4e2f-9a61-0c5d2b7e4f10","raw_text":"net income","created_at":"2024-05-01T12:00:01.123456+00:00","extra_column":true}]"#,
        )
        .await;

        let submitted = record("doc1.pdf");
        let stored = store_at(&url).insert_one(&submitted).await.unwrap();
        assert_eq!(
            stored.id,
            Some(RowId::from("3f2a9c1e-8b7d-4e2f-9a61-0c5d2b7e4f10"))
        );
        assert!(stored.created_at.is_some());
        assert_eq!(stored.record, submitted);

        let req = server.await.unwrap();
        assert!(req.head.starts_with("post /rest/v1/income_data "), "{}", req.head);
        assert!(req.head.contains("\r\napikey: service-key\r\n"), "{}", req.head);
        assert!(req.head.contains("\r\nauthorization: bearer service-key\r\n"), "{}", req.head);
        assert!(req.head.contains("\r\nprefer: return=representation\r\n"), "{}", req.head);
        assert!(req.head.contains("\r\ncontent-type: application/json\r\n"), "{}", req.head);
        assert!(req.body.is_object());
        assert_eq!(req.body["file_name"], "doc1.pdf");
        assert_eq!(req.body["compliance_status"], "Compliant");
    }

    #[tokio::test]
    async fn insert_many_posts_one_array() {
        let (url, server) = serve_once("201 Created", r#"[{"id":11},{"id":12}]"#).await;

        let records = vec![record("a.pdf"), record("b.pdf")];
        let stored = store_at(&url).insert_many(&records).await.unwrap();
        let ids: Vec<_> = stored.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![Some(RowId::Int(11)), Some(RowId::Int(12))]);
        assert_eq!(stored[1].record.file_name.as_deref(), Some("b.pdf"));

        let req = server.await.unwrap();
        let rows = req.body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["batch_id"], "BATCH_001");
    }

    #[tokio::test]
    async fn rejected_insert_maps_to_status_error() {
        let (url, server) = serve_once(
            "401 Unauthorized",
            r#"{"message":"Invalid API key"}"#,
        )
        .await;

        match store_at(&url).insert_one(&record("a.pdf")).await {
            Err(UploadError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid API key"), "{body}");
            }
            other => panic!("expected Status error, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn empty_echo_maps_to_empty_response() {
        let (url, server) = serve_once("201 Created", "[]").await;
        assert!(matches!(
            store_at(&url).insert_one(&record("a.pdf")).await,
            Err(UploadError::EmptyResponse)
        ));
        server.await.unwrap();

        let (url, server) = serve_once("201 Created", "[]").await;
        assert!(matches!(
            store_at(&url).insert_many(&[record("a.pdf")]).await,
            Err(UploadError::EmptyResponse)
        ));
        server.await.unwrap();
    }
}
