//! Batch orchestration: items in order, attachments in order, one upload at a time.
//!
//! ```text
//! INIT ─▶ resolve credential (once)
//!   for each item:
//!     select attachments ──✗──▶ item failure (record or abort)
//!     resolve parameters (once per item)
//!     for each attachment:
//!       decode ─▶ build body ─▶ dispatch ──✓──▶ success record
//!                                        └─✗──▶ file failure (record or abort)
//! DONE
//! ```
//!
//! With continue-on-failure enabled every item or file error is turned into a
//! failed [`ResultRecord`] and the run moves on. Otherwise the first error is
//! returned unchanged and the records gathered so far are discarded.

use crate::config::BatchConfig;
use crate::credentials::{ApiKey, CredentialSource};
use crate::error::ConnectorError;
use crate::item::{Attachment, InputItem};
use crate::output::{BatchOutput, BatchStats, ResultRecord};
use crate::pipeline::dispatch::{Dispatch, HttpDispatcher, UploadRequest};
use crate::pipeline::extract::{self, DecodedAttachment};
use crate::pipeline::multipart;
use crate::pipeline::params::{ParameterBag, ParameterResolver};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Upload every attachment of `items` over HTTP.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Credential errors always abort. Item and file errors abort only when
/// `config.continue_on_failure` is false.
pub async fn run<C>(
    items: &[InputItem],
    config: &BatchConfig,
    credentials: &C,
) -> Result<BatchOutput, ConnectorError>
where
    C: CredentialSource + ?Sized,
{
    let dispatcher = HttpDispatcher::new()?;
    run_batch(items, config, credentials, &dispatcher).await
}

/// Run a batch with a caller-supplied [`Dispatch`] implementation.
pub async fn run_batch<C, D>(
    items: &[InputItem],
    config: &BatchConfig,
    credentials: &C,
    dispatcher: &D,
) -> Result<BatchOutput, ConnectorError>
where
    C: CredentialSource + ?Sized,
    D: Dispatch + ?Sized,
{
    let start = Instant::now();
    let api_key = credentials.api_key().await?;
    let url = config.endpoint_url();

    info!(
        items = items.len(),
        profile = %config.profile,
        url = %url,
        api_key = %api_key.masked(),
        continue_on_failure = config.continue_on_failure,
        "Batch upload started"
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(items.len());
    }

    let resolver = ParameterResolver::new(config);
    let mut records = Vec::new();
    let mut stats = BatchStats {
        total_items: items.len(),
        ..BatchStats::default()
    };

    for (index, item) in items.iter().enumerate() {
        let requested = config.binary_property.as_deref();
        let selected = match extract::select_attachments(item, index, requested) {
            Ok(selected) => selected,
            Err(e) => {
                warn!(item = index, error = %e, "Item skipped");
                let key = match e {
                    ConnectorError::MissingAttachment { ref name, .. } => Some(name.clone()),
                    _ => None,
                };
                if let Some(ref cb) = config.progress_callback {
                    cb.on_file_error(index, key.as_deref(), &e.to_string());
                }
                if !config.continue_on_failure {
                    return Err(e);
                }
                records.push(ResultRecord::item_failed(index, key, &e));
                stats.failed_items += 1;
                continue;
            }
        };

        let params = resolver.resolve(index, item);

        for (key, attachment) in selected {
            if let Some(ref cb) = config.progress_callback {
                cb.on_file_start(index, key);
            }

            let mut file_name = None;
            let outcome = upload_attachment(
                index,
                key,
                attachment,
                &params,
                config,
                url,
                &api_key,
                dispatcher,
                &mut file_name,
            )
            .await;
            match outcome {
                Ok(record) => {
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_file_complete(index, key, record.file.as_deref().unwrap_or_default());
                    }
                    records.push(record);
                    stats.uploaded_files += 1;
                }
                Err(e) => {
                    warn!(
                        item = index,
                        binary_property = key,
                        file = file_name.as_deref().unwrap_or_default(),
                        kind = ?e.kind(),
                        status = e.status(),
                        error = %e,
                        "File upload failed"
                    );
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_file_error(index, Some(key), &e.to_string());
                    }
                    if !config.continue_on_failure {
                        return Err(e);
                    }
                    records.push(ResultRecord::file_failed(index, key, file_name, &e));
                    stats.failed_files += 1;
                }
            }
        }
    }

    stats.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        items = stats.total_items,
        uploaded = stats.uploaded_files,
        failed_files = stats.failed_files,
        failed_items = stats.failed_items,
        duration_ms = stats.duration_ms,
        "Batch upload finished"
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(&stats);
    }

    Ok(BatchOutput { records, stats })
}

/// Decode, frame and upload one attachment.
///
/// `file_name` is filled in as soon as it is resolved so failure records can
/// name the file even when the upload itself failed.
#[allow(clippy::too_many_arguments)]
async fn upload_attachment<D>(
    index: usize,
    key: &str,
    attachment: &Attachment,
    params: &ParameterBag,
    config: &BatchConfig,
    url: &str,
    api_key: &ApiKey,
    dispatcher: &D,
    file_name: &mut Option<String>,
) -> Result<ResultRecord, ConnectorError>
where
    D: Dispatch + ?Sized,
{
    let document = extract::decode_attachment(key, attachment)?;
    *file_name = Some(document.file_name.clone());

    info!(
        item = index,
        binary_property = key,
        file = %document.file_name,
        mime = %document.mime_type,
        bytes = document.bytes.len(),
        "Uploading file"
    );

    let body = multipart::build_body(config.profile, params, &document);
    // The decoded bytes are now framed in `body`; release the copy before the round trip.
    let DecodedAttachment { file_name: name, bytes, .. } = document;
    drop(bytes);
    debug!(item = index, boundary = body.boundary(), bytes = body.len(), "Built multipart body");

    let result = dispatcher.dispatch(UploadRequest::new(url, api_key, body)).await?;

    info!(item = index, binary_property = key, file = %name, "File uploaded");
    Ok(ResultRecord::uploaded(index, key, name, result))
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync<C>(
    items: &[InputItem],
    config: &BatchConfig,
    credentials: &C,
) -> Result<BatchOutput, ConnectorError>
where
    C: CredentialSource + ?Sized,
{
    tokio::runtime::Runtime::new()
        .map_err(|e| ConnectorError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(items, config, credentials))
}

/// Run a batch and write the records as a JSON array to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn run_to_file<C>(
    items: &[InputItem],
    output_path: impl AsRef<Path>,
    config: &BatchConfig,
    credentials: &C,
) -> Result<BatchStats, ConnectorError>
where
    C: CredentialSource + ?Sized,
{
    let output = run(items, config, credentials).await?;
    write_records(&output.records, output_path.as_ref()).await?;
    Ok(output.stats)
}

/// Atomically write records as pretty JSON.
pub async fn write_records(records: &[ResultRecord], path: &Path) -> Result<(), ConnectorError> {
    let write_err = |e: std::io::Error| ConnectorError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let json = serde_json::to_vec_pretty(records)
        .map_err(|e| ConnectorError::Internal(format!("Failed to serialise records: {e}")))?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Language, Profile};
    use crate::error::ErrorKind;
    use crate::progress::BatchProgressCallback;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    /// `(name, data)` of every field, read back with `multer`.
    async fn read_fields(body: &[u8], boundary: &str) -> Vec<(String, Vec<u8>)> {
        let reader = std::io::Cursor::new(body.to_vec());
        let mut multipart = multer::Multipart::with_reader(reader, boundary);
        let mut fields = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            fields.push((name, field.bytes().await.unwrap().to_vec()));
        }
        fields
    }

    /// Records every request and answers from a script (default: success).
    #[derive(Default)]
    struct FakeDispatcher {
        seen: Mutex<Vec<(String, String, String, Vec<u8>)>>,
        fail_on: Vec<usize>,
    }

    #[async_trait]
    impl Dispatch for FakeDispatcher {
        async fn dispatch(&self, request: UploadRequest) -> Result<Value, ConnectorError> {
            let mut seen = self.seen.lock().unwrap();
            let n = seen.len();
            seen.push((
                request.url().to_string(),
                request.authorization(),
                request.body().boundary().to_string(),
                request.body().as_bytes().to_vec(),
            ));
            if self.fail_on.contains(&n) {
                return Err(ConnectorError::Remote {
                    status: 500,
                    body: "internal".into(),
                });
            }
            Ok(json!({ "call": n }))
        }
    }

    fn key() -> ApiKey {
        ApiKey::new("secret-key").unwrap()
    }

    fn doc(bytes: &[u8], name: &str) -> Attachment {
        Attachment::from_bytes(bytes)
            .with_file_name(name)
            .with_mime_type("application/pdf")
    }

    fn single(bytes: &[u8], name: &str) -> InputItem {
        InputItem::new().with_attachment("data", doc(bytes, name))
    }

    fn config(continue_on_failure: bool) -> BatchConfig {
        BatchConfig::builder()
            .endpoint("http://parser.test/v1/document-digitization")
            .continue_on_failure(continue_on_failure)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn empty_item_aborts_without_continue() {
        let items = vec![single(b"one", "1.pdf"), InputItem::new(), single(b"three", "3.pdf")];
        let fake = FakeDispatcher::default();

        let err = run_batch(&items, &config(false), &key(), &fake).await.unwrap_err();

        assert!(matches!(err, ConnectorError::NoAttachments { item: 1 }));
        // Item 0 was uploaded before the abort; item 2 never was.
        assert_eq!(fake.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_item_recorded_once_with_continue() {
        let item_with_two = InputItem::new()
            .with_attachment("a", doc(b"aa", "a.pdf"))
            .with_attachment("b", doc(b"bb", "b.pdf"));
        let items = vec![InputItem::new(), item_with_two];
        let fake = FakeDispatcher::default();

        let output = run_batch(&items, &config(true), &key(), &fake).await.unwrap();

        assert_eq!(output.records.len(), 3);
        let first = &output.records[0];
        assert!(!first.success);
        assert_eq!(first.item_index, 0);
        assert_eq!(first.error_kind, Some(ErrorKind::NoAttachments));
        assert_eq!(first.binary_property, None);
        assert!(output.records[1..].iter().all(|r| r.success));
        assert_eq!(output.stats.failed_items, 1);
        assert_eq!(output.stats.uploaded_files, 2);
    }

    #[tokio::test]
    async fn empty_payload_fails_only_its_own_file() {
        let items = vec![
            single(b"first", "1.pdf"),
            InputItem::new().with_attachment("data", Attachment::from_bytes(b"").with_file_name("2.pdf")),
            single(b"third", "3.pdf"),
        ];
        let fake = FakeDispatcher::default();

        let output = run_batch(&items, &config(true), &key(), &fake).await.unwrap();

        let success: Vec<bool> = output.records.iter().map(|r| r.success).collect();
        assert_eq!(success, vec![true, false, true]);
        let failed = &output.records[1];
        assert_eq!(failed.error_kind, Some(ErrorKind::InvalidAttachment));
        assert_eq!(failed.binary_property.as_deref(), Some("data"));
        assert_eq!(output.records[2].file.as_deref(), Some("3.pdf"));
        // The empty payload never reached the dispatcher.
        assert_eq!(fake.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn remote_failure_aborts_without_continue() {
        let items = vec![single(b"a", "a.pdf"), single(b"b", "b.pdf"), single(b"c", "c.pdf")];
        let fake = FakeDispatcher {
            fail_on: vec![1],
            ..FakeDispatcher::default()
        };

        let err = run_batch(&items, &config(false), &key(), &fake).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(fake.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn remote_failure_recorded_with_file_name() {
        let items = vec![single(b"a", "a.pdf"), single(b"b", "b.pdf")];
        let fake = FakeDispatcher {
            fail_on: vec![0],
            ..FakeDispatcher::default()
        };

        let output = run_batch(&items, &config(true), &key(), &fake).await.unwrap();

        let failed = &output.records[0];
        assert!(!failed.success);
        assert_eq!(failed.file.as_deref(), Some("a.pdf"));
        assert_eq!(failed.error_kind, Some(ErrorKind::Remote));
        assert!(failed.error.as_deref().unwrap().contains("500"));
        assert_eq!(output.records[1].result, Some(json!({ "call": 1 })));
    }

    #[tokio::test]
    async fn attachments_of_one_item_share_parameters_but_not_bodies() {
        let item = InputItem::new()
            .with_attachment("first", doc(b"111", "1.pdf"))
            .with_attachment("second", doc(b"222", "2.pdf"));
        let config = BatchConfig::builder()
            .endpoint("http://parser.test/parse")
            .language(Language::Ko)
            .model("document-parse-test")
            .build()
            .unwrap();
        let fake = FakeDispatcher::default();

        run_batch(&[item], &config, &key(), &fake).await.unwrap();

        let seen = fake.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        let (_, _, boundary_a, body_a) = &seen[0];
        let (_, _, boundary_b, body_b) = &seen[1];
        assert_ne!(boundary_a, boundary_b);
        assert_ne!(body_a, body_b);

        let fields_a = read_fields(body_a, boundary_a).await;
        let fields_b = read_fields(body_b, boundary_b).await;
        let field = |fields: &[(String, Vec<u8>)], name: &str| -> Vec<u8> {
            fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, data)| data.clone())
                .unwrap()
        };
        for name in ["language", "model", "output_formats", "ocr", "coordinates"] {
            assert_eq!(field(&fields_a, name), field(&fields_b, name), "{name}");
        }
        assert_eq!(field(&fields_a, "language"), b"ko");
        assert_eq!(field(&fields_a, "model"), b"document-parse-test");
        assert_eq!(field(&fields_a, "document"), b"111");
        assert_eq!(field(&fields_b, "document"), b"222");
    }

    #[tokio::test]
    async fn requests_carry_url_and_bearer_token() {
        let fake = FakeDispatcher::default();
        run_batch(&[single(b"x", "x.pdf")], &config(false), &key(), &fake)
            .await
            .unwrap();

        let seen = fake.seen.lock().unwrap();
        assert_eq!(seen[0].0, "http://parser.test/v1/document-digitization");
        assert_eq!(seen[0].1, "Bearer secret-key");
    }

    #[tokio::test]
    async fn legacy_profile_sends_file_field() {
        let config = BatchConfig::builder()
            .profile(Profile::LegacyDocumentParsing)
            .endpoint("http://parser.test/legacy")
            .build()
            .unwrap();
        let fake = FakeDispatcher::default();
        run_batch(&[single(b"legacy", "l.pdf")], &config, &key(), &fake)
            .await
            .unwrap();

        let (_, _, boundary, body) = fake.seen.lock().unwrap()[0].clone();
        let names: Vec<String> = read_fields(&body, &boundary)
            .await
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["language", "file"]);
    }

    /// Collects the `binary_property` of every error event.
    #[derive(Default)]
    struct ErrorEvents(Mutex<Vec<(usize, Option<String>)>>);

    impl BatchProgressCallback for ErrorEvents {
        fn on_file_error(&self, item_index: usize, binary_property: Option<&str>, _error: &str) {
            self.0
                .lock()
                .unwrap()
                .push((item_index, binary_property.map(str::to_string)));
        }
    }

    #[tokio::test]
    async fn item_error_events_match_their_records() {
        let events = Arc::new(ErrorEvents::default());
        let config = BatchConfig::builder()
            .endpoint("http://parser.test/parse")
            .binary_property("body")
            .continue_on_failure(true)
            .progress_callback(events.clone() as Arc<dyn BatchProgressCallback>)
            .build()
            .unwrap();
        let items = vec![InputItem::new(), single(b"x", "x.pdf")];
        let fake = FakeDispatcher::default();

        let output = run_batch(&items, &config, &key(), &fake).await.unwrap();

        let seen = events.0.lock().unwrap().clone();
        assert_eq!(seen, vec![(0, None), (1, Some("body".to_string()))]);
        let record_keys: Vec<Option<String>> =
            output.records.iter().map(|r| r.binary_property.clone()).collect();
        assert_eq!(record_keys, vec![None, Some("body".to_string())]);
    }

    #[tokio::test]
    async fn binary_property_selects_one_attachment() {
        let item = InputItem::new()
            .with_attachment("cover", doc(b"c", "cover.png"))
            .with_attachment("body", doc(b"b", "body.pdf"));
        let config = BatchConfig::builder()
            .endpoint("http://parser.test/parse")
            .binary_property("body")
            .continue_on_failure(true)
            .build()
            .unwrap();
        let fake = FakeDispatcher::default();

        let output = run_batch(&[item, single(b"x", "x.pdf")], &config, &key(), &fake)
            .await
            .unwrap();

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].file.as_deref(), Some("body.pdf"));
        let missing = &output.records[1];
        assert_eq!(missing.error_kind, Some(ErrorKind::MissingAttachment));
        assert_eq!(missing.binary_property.as_deref(), Some("body"));
    }

    #[tokio::test]
    async fn credential_failure_is_always_fatal() {
        struct NoKey;

        #[async_trait]
        impl CredentialSource for NoKey {
            async fn api_key(&self) -> Result<ApiKey, ConnectorError> {
                Err(ConnectorError::MissingCredential { hint: "none".into() })
            }
        }

        let fake = FakeDispatcher::default();
        let err = run_batch(&[single(b"x", "x.pdf")], &config(true), &NoKey, &fake)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::MissingCredential { .. }));
        assert!(fake.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_output() {
        let fake = FakeDispatcher::default();
        let output = run_batch(&[], &config(false), &key(), &fake).await.unwrap();
        assert!(output.records.is_empty());
        assert_eq!(output.stats.total_items, 0);
    }

    #[tokio::test]
    async fn write_records_is_atomic_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/results.json");
        let records = vec![ResultRecord::uploaded(0, "data", "a.pdf", json!({"ok": true}))];

        write_records(&records, &path).await.unwrap();

        let back: Vec<ResultRecord> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, records);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
