//! Per-candidate relay pipeline: filter, dedup, download, rename, publish,
//! record.

use std::{future::Future, sync::Arc};

use {
    chrono::Utc,
    tracing::{debug, error, info, warn},
};

use courier_store::{
    RelayStore,
    types::{FILE_COUNTER, LedgerEntry},
};

use crate::{
    Result,
    config::{RelayConfig, RelayMode},
    namer::FileNamer,
    transport::{self, Transport},
    types::{ChannelRef, FileFingerprint, RemoteDocument, RemoteMessage},
};

/// What happened to one candidate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// No document, no filename attribute, or extension mismatch.
    FilteredOut,
    /// Fingerprint already in the ledger.
    Duplicate,
    /// Published and recorded.
    Relayed { sequence: u64, filename: String },
}

/// Runs each candidate through the relay state machine.
///
/// The ordering is the system's core correctness property: the extension
/// check happens before the fingerprint check, which happens before any
/// network download.
pub struct RelayPipeline {
    transport: Arc<dyn Transport>,
    store: Arc<dyn RelayStore>,
    namer: FileNamer,
    target_extension: String,
    mode: RelayMode,
    rename: bool,
    destination_id: String,
}

impl RelayPipeline {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn RelayStore>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            transport,
            store,
            namer: FileNamer::from_config(config),
            target_extension: config.normalized_extension(),
            mode: config.mode,
            rename: config.rename,
            destination_id: config.destination_id().to_string(),
        }
    }

    /// Process one candidate message from `channel`, publishing to
    /// `destination` when it matches.
    pub async fn process(
        &self,
        message: &RemoteMessage,
        channel: &ChannelRef,
        destination: &ChannelRef,
    ) -> Result<RelayOutcome> {
        let Some(document) = &message.document else {
            return Ok(RelayOutcome::FilteredOut);
        };
        // A document without a filename can neither be deduplicated by name
        // nor renamed.
        let Some(original_name) = document.file_name.as_deref() else {
            return Ok(RelayOutcome::FilteredOut);
        };
        if !original_name.to_lowercase().ends_with(&self.target_extension) {
            return Ok(RelayOutcome::FilteredOut);
        }

        let fingerprint = FileFingerprint::of(document);
        if self.store.has(fingerprint.as_str()).await? {
            debug!(file = original_name, "already relayed, skipping");
            return Ok(RelayOutcome::Duplicate);
        }

        info!(
            file = original_name,
            channel = channel.display_name(),
            "matching document found"
        );

        let (sequence, filename) = match self.mode {
            RelayMode::Reupload => {
                self.relay_reupload(message, document, original_name, destination)
                    .await?
            },
            RelayMode::Forward => {
                let sequence = self.store.next_sequence(FILE_COUNTER).await?;
                self.publish_with_backoff("forward message", || {
                    self.transport.forward_message(destination, message)
                })
                .await?;
                (sequence, original_name.to_string())
            },
        };

        let entry = LedgerEntry {
            fingerprint: fingerprint.as_str().to_string(),
            original_filename: original_name.to_string(),
            new_filename: filename.clone(),
            sequence,
            channel: channel.input.clone(),
            file_size: document.size,
        };
        if let Err(e) = self.store.record(&entry).await {
            // Published but not recorded: the known at-least-once gap.
            error!(file = %filename, error = %e, "relayed but not recorded in ledger");
            return Err(e.into());
        }
        if let Err(e) = self
            .store
            .log_activity("FILE_SENT", &format!("{filename} - #{sequence}"))
            .await
        {
            warn!(error = %e, "failed to append activity record");
        }

        info!(file = %filename, sequence, "document relayed");
        Ok(RelayOutcome::Relayed { sequence, filename })
    }

    /// Download, allocate a sequence number, generate the published name,
    /// re-upload. The download buffer is scoped to this call and removed on
    /// every exit path.
    async fn relay_reupload(
        &self,
        message: &RemoteMessage,
        document: &RemoteDocument,
        original_name: &str,
        destination: &ChannelRef,
    ) -> Result<(u64, String)> {
        let downloaded = self.transport.download(message).await?;
        let bytes = downloaded.read_bytes().await?;

        let sequence = self.store.next_sequence(FILE_COUNTER).await?;
        let filename = if self.rename {
            self.namer.generate(original_name, sequence)
        } else {
            self.namer.clean_filename(original_name)
        };
        let caption = self.build_caption(&filename, sequence, document.size);

        self.publish_with_backoff("publish document", || {
            self.transport
                .publish_document(destination, &bytes, &filename, &caption)
        })
        .await?;

        Ok((sequence, filename))
    }

    /// Retry the publish operation with identical arguments for as long as
    /// the remote service answers with a flood wait. The wait duration is
    /// the service's authoritative signal, so no retry cap is imposed; any
    /// other error aborts immediately.
    async fn publish_with_backoff<T, F, Fut>(
        &self,
        operation: &'static str,
        mut request: F,
    ) -> transport::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = transport::Result<T>>,
    {
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => match err.retry_after() {
                    Some(wait) => {
                        warn!(
                            operation,
                            wait_secs = wait.as_secs(),
                            "rate limited, honoring flood wait"
                        );
                        tokio::time::sleep(wait).await;
                    },
                    None => return Err(err),
                },
            }
        }
    }

    fn build_caption(&self, filename: &str, sequence: u64, size: u64) -> String {
        let size_mb = size as f64 / (1024.0 * 1024.0);
        let date = Utc::now().format("%Y-%m-%d %H:%M:%S");
        format!(
            "{filename}\n#{sequence} | @{} | {size_mb:.2} MB | {date}",
            self.destination_id
        )
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        io::Write,
        sync::Mutex,
        time::Duration,
    };

    use async_trait::async_trait;

    use courier_store::InMemoryStore;

    use {
        super::*,
        crate::transport::{DownloadedDocument, SessionInfo, TransportError},
    };

    #[derive(Default)]
    struct MockTransport {
        calls: Mutex<Vec<String>>,
        publish_errors: Mutex<VecDeque<TransportError>>,
    }

    impl MockTransport {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        fn record_call(&self, call: String) {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
        }

        fn fail_next_publish(&self, err: TransportError) {
            self.publish_errors
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(err);
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&self) -> transport::Result<SessionInfo> {
            Ok(SessionInfo {
                username: None,
                display_name: "mock".into(),
            })
        }

        async fn resolve_channel(&self, identifier: &str) -> transport::Result<ChannelRef> {
            Ok(ChannelRef {
                input: identifier.to_string(),
                chat_id: 1,
                title: None,
            })
        }

        async fn recent_messages(
            &self,
            _channel: &ChannelRef,
            _limit: usize,
        ) -> transport::Result<Vec<RemoteMessage>> {
            Ok(Vec::new())
        }

        async fn download(&self, message: &RemoteMessage) -> transport::Result<DownloadedDocument> {
            self.record_call(format!("download:{}", message.id));
            let mut file = tempfile::NamedTempFile::new()?;
            file.write_all(b"bytes")?;
            Ok(DownloadedDocument::new(file, 5))
        }

        async fn publish_document(
            &self,
            _destination: &ChannelRef,
            bytes: &[u8],
            filename: &str,
            _caption: &str,
        ) -> transport::Result<()> {
            self.record_call(format!("publish:{filename}:{}", bytes.len()));
            let next = self
                .publish_errors
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();
            match next {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn forward_message(
            &self,
            _destination: &ChannelRef,
            message: &RemoteMessage,
        ) -> transport::Result<()> {
            self.record_call(format!("forward:{}", message.id));
            Ok(())
        }

        async fn disconnect(&self) {}
    }

    fn config() -> RelayConfig {
        RelayConfig {
            source_channels: vec!["@source".into()],
            destination: "@archive".into(),
            file_prefix: "Rel_".into(),
            ..Default::default()
        }
    }

    fn make_pipeline(cfg: RelayConfig) -> (RelayPipeline, Arc<MockTransport>, Arc<InMemoryStore>) {
        let transport = Arc::new(MockTransport::default());
        let store = Arc::new(InMemoryStore::new());
        let pipeline = RelayPipeline::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&store) as Arc<dyn RelayStore>,
            &cfg,
        );
        (pipeline, transport, store)
    }

    fn message(id: i64, file_name: Option<&str>) -> RemoteMessage {
        RemoteMessage {
            id,
            chat_id: 1,
            document: Some(RemoteDocument {
                remote_id: format!("doc{id}"),
                size: 1000,
                timestamp: Some(111),
                file_name: file_name.map(Into::into),
            }),
        }
    }

    fn channel() -> ChannelRef {
        ChannelRef {
            input: "@source".into(),
            chat_id: 1,
            title: Some("Source".into()),
        }
    }

    fn destination() -> ChannelRef {
        ChannelRef {
            input: "@archive".into(),
            chat_id: 2,
            title: None,
        }
    }

    #[tokio::test]
    async fn message_without_document_is_filtered() {
        let (pipeline, transport, _store) = make_pipeline(config());
        let msg = RemoteMessage {
            id: 1,
            chat_id: 1,
            document: None,
        };
        let outcome = pipeline.process(&msg, &channel(), &destination()).await.unwrap();
        assert_eq!(outcome, RelayOutcome::FilteredOut);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_filename_is_filtered_before_any_download() {
        let (pipeline, transport, _store) = make_pipeline(config());
        let outcome = pipeline
            .process(&message(1, None), &channel(), &destination())
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::FilteredOut);
        assert!(transport.calls().is_empty(), "no network call may be issued");
    }

    #[tokio::test]
    async fn extension_mismatch_is_filtered() {
        let (pipeline, transport, _store) = make_pipeline(config());
        let outcome = pipeline
            .process(&message(1, Some("notes.txt")), &channel(), &destination())
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::FilteredOut);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn extension_match_is_case_insensitive() {
        let (pipeline, _transport, store) = make_pipeline(config());
        let outcome = pipeline
            .process(&message(1, Some("DATA.NPVT")), &channel(), &destination())
            .await
            .unwrap();
        assert!(matches!(outcome, RelayOutcome::Relayed { .. }));
        assert_eq!(store.entries().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_is_skipped_without_download() {
        let (pipeline, transport, store) = make_pipeline(config());
        let msg = message(1, Some("report.npvt"));

        let first = pipeline.process(&msg, &channel(), &destination()).await.unwrap();
        assert!(matches!(first, RelayOutcome::Relayed { sequence: 1, .. }));

        // A second message carrying the identical document must be skipped
        // before any download call.
        let calls_before = transport.calls().len();
        let mut second = msg.clone();
        second.id = 2;
        let outcome = pipeline.process(&second, &channel(), &destination()).await.unwrap();
        assert_eq!(outcome, RelayOutcome::Duplicate);
        assert_eq!(transport.calls().len(), calls_before);
        assert_eq!(store.entries().len(), 1);
    }

    #[tokio::test]
    async fn successful_relay_records_ledger_and_audit() {
        let (pipeline, transport, store) = make_pipeline(config());
        let outcome = pipeline
            .process(&message(1, Some("report.npvt")), &channel(), &destination())
            .await
            .unwrap();

        assert_eq!(outcome, RelayOutcome::Relayed {
            sequence: 1,
            filename: "Rel_0001_archive_report.npvt".into(),
        });
        assert_eq!(transport.calls(), vec![
            "download:1".to_string(),
            "publish:Rel_0001_archive_report.npvt:5".to_string(),
        ]);

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fingerprint, "doc1_1000_111");
        assert_eq!(entries[0].original_filename, "report.npvt");
        assert_eq!(entries[0].channel, "@source");
        assert_eq!(entries[0].file_size, 1000);

        assert!(store.activity().iter().any(|(action, _)| action == "FILE_SENT"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_waits_exactly_and_retries_same_publish() {
        let (pipeline, transport, _store) = make_pipeline(config());
        transport.fail_next_publish(TransportError::RateLimited { seconds: 5 });

        let start = tokio::time::Instant::now();
        let outcome = pipeline
            .process(&message(1, Some("report.npvt")), &channel(), &destination())
            .await
            .unwrap();

        assert!(matches!(outcome, RelayOutcome::Relayed { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(5));

        // Exactly one retry, with identical arguments.
        let publishes: Vec<_> = transport
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("publish:"))
            .collect();
        assert_eq!(publishes.len(), 2);
        assert_eq!(publishes[0], publishes[1]);
    }

    #[tokio::test]
    async fn publish_failure_leaves_ledger_untouched() {
        let (pipeline, transport, store) = make_pipeline(config());
        transport.fail_next_publish(TransportError::external(
            "send failed",
            std::io::Error::other("boom"),
        ));

        let result = pipeline
            .process(&message(1, Some("report.npvt")), &channel(), &destination())
            .await;
        assert!(result.is_err());
        // Ledger untouched, so the file stays eligible for a future cycle.
        assert!(store.entries().is_empty());
        assert!(!store.has("doc1_1000_111").await.unwrap());
    }

    #[tokio::test]
    async fn forward_mode_skips_download_and_keeps_name() {
        let cfg = RelayConfig {
            mode: RelayMode::Forward,
            ..config()
        };
        let (pipeline, transport, store) = make_pipeline(cfg);

        let outcome = pipeline
            .process(&message(1, Some("report.npvt")), &channel(), &destination())
            .await
            .unwrap();

        assert_eq!(outcome, RelayOutcome::Relayed {
            sequence: 1,
            filename: "report.npvt".into(),
        });
        assert_eq!(transport.calls(), vec!["forward:1".to_string()]);
        assert_eq!(store.entries()[0].new_filename, "report.npvt");
    }

    #[tokio::test]
    async fn rename_off_publishes_under_cleaned_original_name() {
        let cfg = RelayConfig {
            rename: false,
            ..config()
        };
        let (pipeline, transport, _store) = make_pipeline(cfg);

        let outcome = pipeline
            .process(&message(1, Some("my:report.npvt")), &channel(), &destination())
            .await
            .unwrap();

        assert_eq!(outcome, RelayOutcome::Relayed {
            sequence: 1,
            filename: "myreport.npvt".into(),
        });
        assert!(transport.calls().contains(&"publish:myreport.npvt:5".to_string()));
    }
}
