//! Pipeline orchestration
//!
//! Two driving modes over the same four stages. Batch mode pushes a URL list
//! straight through discovery, ingestion, transformation, and indexing and
//! returns counters. Queued mode hands each stage's output to the next
//! through named channels, with a worker pool draining them.

use crate::config::Config;
use crate::discovery::SnapshotResolver;
use crate::ingestion::{build_http_client, Fetcher, RateLimiter, RetryPolicy};
use crate::models::{
    FetchedBlob, ProcessingStats, QueueEnvelope, RewrittenDocument, SnapshotRecord, SnapshotStatus,
};
use crate::queue::{Channel, EnvelopeHandler, QueueManager};
use crate::storage::{DocumentStore, FsStore, MemoryIndex, SearchIndex};
use crate::transform::Transformer;
use crate::util::format_bytes;
use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// The stage collaborators, shared between batch runs and worker loops
struct Stages {
    resolver: SnapshotResolver,
    fetcher: Fetcher,
    transformer: Transformer,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn SearchIndex>,
    config: Config,
}

/// Drives snapshots through the full pipeline
pub struct Archiver {
    stages: Arc<Stages>,
    queue: Arc<QueueManager>,
}

impl Archiver {
    /// Creates an archiver with the default filesystem store and in-process
    /// search index
    pub fn new(config: Config) -> crate::Result<Self> {
        let store = Arc::new(FsStore::new(config.archive.output_dir.clone()));
        let index = Arc::new(MemoryIndex::new());
        Self::with_storage(config, store, index)
    }

    /// Creates an archiver over caller-supplied storage collaborators
    pub fn with_storage(
        config: Config,
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn SearchIndex>,
    ) -> crate::Result<Self> {
        let client = build_http_client(
            &config.archive.user_agent,
            config.processing.request_timeout_secs,
        )?;
        let limiter = Arc::new(RateLimiter::new(config.processing.requests_per_second));

        let resolver = SnapshotResolver::new(
            client.clone(),
            config.discovery.clone(),
            config.ingestion.snapshot_base_url.clone(),
        );
        let fetcher = Fetcher::new(
            client,
            limiter,
            &config.archive,
            &config.ingestion,
            RetryPolicy::from_config(&config.processing),
        );
        let transformer = Transformer::new(
            config.transformation.clone(),
            &config.ingestion.snapshot_base_url,
        );
        let queue = Arc::new(QueueManager::new(config.queue.clone()));

        Ok(Self {
            stages: Arc::new(Stages {
                resolver,
                fetcher,
                transformer,
                store,
                index,
                config,
            }),
            queue,
        })
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    /// Archives every snapshot of the given URLs, start to finish
    ///
    /// Per-snapshot failures are counted, never fatal; the only errors
    /// surfacing here are storage errors while indexing.
    pub async fn archive_urls(&self, urls: &[String]) -> crate::Result<ProcessingStats> {
        let mut stats = ProcessingStats::new();
        tracing::info!("Archiving {} URLs", urls.len());

        let mut records = self.stages.resolver.batch_discover(urls).await;
        stats.total_snapshots = records.len();
        stats.discovered = records.len();
        tracing::info!("Discovered {} snapshots", records.len());

        let concurrency = self.stages.config.processing.concurrent_downloads as usize;
        let blobs = self.stages.fetcher.batch_download(&mut records, concurrency).await;

        for (record, blob) in records.iter_mut().zip(blobs) {
            let blob = match blob {
                Some(blob) => blob,
                None => {
                    match record.status {
                        SnapshotStatus::Skipped => stats.skipped += 1,
                        _ => stats.failed += 1,
                    }
                    continue;
                }
            };
            stats.downloaded += 1;
            tracing::debug!(
                "Fetched {} ({})",
                record.url,
                format_bytes(blob.content.len() as u64)
            );

            let document = match self.stages.transformer.transform(record, &blob) {
                Some(document) => document,
                None => {
                    stats.failed += 1;
                    continue;
                }
            };
            stats.transformed += 1;

            match self.index_document(record, &document).await {
                Ok(()) => stats.indexed += 1,
                Err(e) => {
                    tracing::error!("Indexing failed for {}: {}", record.url, e);
                    stats.failed += 1;
                }
            }
        }

        stats.finish();
        tracing::info!(
            "Archive run complete: {}/{} indexed ({:.1}%), {} failed, {} skipped in {:.1}s",
            stats.indexed,
            stats.total_snapshots,
            stats.success_rate(),
            stats.failed,
            stats.skipped,
            stats.duration_secs().unwrap_or(0.0)
        );
        Ok(stats)
    }

    async fn index_document(
        &self,
        record: &mut SnapshotRecord,
        document: &RewrittenDocument,
    ) -> crate::Result<()> {
        record.set_status(SnapshotStatus::Indexing);
        let result = index_with(&*self.stages.store, &*self.stages.index, document).await;
        match result {
            Ok(()) => {
                record.set_status(SnapshotStatus::Indexed);
                Ok(())
            }
            Err(e) => {
                record.set_status(SnapshotStatus::Failed);
                Err(e)
            }
        }
    }

    /// Seeds the queued pipeline with a URL to archive
    pub fn enqueue_url(&self, url: &str) -> crate::Result<String> {
        self.queue
            .enqueue(Channel::Discovery, "discover", json!({ "url": url }))
    }

    /// Starts the worker pool draining the stage channels
    pub fn start_workers(&self, count: u32) {
        let handler = Arc::new(StageHandler {
            stages: self.stages.clone(),
            queue: self.queue.clone(),
        });
        self.queue.start_workers(count, handler);
    }

    /// Stops the worker pool, abandoning in-flight work
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}

/// Stores and indexes a document, in that order
async fn index_with(
    store: &dyn DocumentStore,
    index: &dyn SearchIndex,
    document: &RewrittenDocument,
) -> crate::Result<()> {
    let doc_id = store.store(document).await?;
    let accepted = index.index(doc_id, document).await?;
    tracing::info!(
        "Indexed document {} as id {} (searchable: {})",
        document.url,
        doc_id,
        accepted
    );
    Ok(())
}

/// Worker-loop handler routing each channel to its stage
///
/// Payload shapes between stages:
///   discovery       -> `{ "url" }`
///   ingestion       -> a serialized snapshot record
///   transformation  -> `{ "record", "content" (base64), "encoding", "headers" }`
///   indexing        -> `{ "record", "document" }`
struct StageHandler {
    stages: Arc<Stages>,
    queue: Arc<QueueManager>,
}

#[async_trait::async_trait]
impl EnvelopeHandler for StageHandler {
    async fn handle(&self, channel: Channel, envelope: &QueueEnvelope) -> anyhow::Result<()> {
        match channel {
            Channel::Discovery => self.handle_discovery(envelope).await,
            Channel::Ingestion => self.handle_ingestion(envelope).await,
            Channel::Transformation => self.handle_transformation(envelope).await,
            Channel::Indexing => self.handle_indexing(envelope).await,
        }
    }
}

impl StageHandler {
    async fn handle_discovery(&self, envelope: &QueueEnvelope) -> anyhow::Result<()> {
        let url = envelope.payload["url"]
            .as_str()
            .context("discovery payload missing url")?;

        let records = self.stages.resolver.find_snapshots(url).await;
        tracing::info!("Discovered {} snapshots for {}", records.len(), url);

        for record in records {
            self.queue.enqueue(
                Channel::Ingestion,
                "snapshot",
                serde_json::to_value(&record)?,
            )?;
        }
        Ok(())
    }

    async fn handle_ingestion(&self, envelope: &QueueEnvelope) -> anyhow::Result<()> {
        let mut record: SnapshotRecord = serde_json::from_value(envelope.payload.clone())
            .context("ingestion payload is not a snapshot record")?;

        match self.stages.fetcher.download(&mut record).await {
            Some(blob) => {
                self.queue.enqueue(
                    Channel::Transformation,
                    "blob",
                    json!({
                        "record": record,
                        "content": BASE64.encode(&blob.content),
                        "encoding": blob.encoding,
                        "headers": blob.headers,
                    }),
                )?;
                Ok(())
            }
            None if record.status == SnapshotStatus::Skipped => {
                // Resource-limit rejection is final, not worth a retry
                Ok(())
            }
            None => anyhow::bail!("download failed for {}", record.url),
        }
    }

    async fn handle_transformation(&self, envelope: &QueueEnvelope) -> anyhow::Result<()> {
        let mut record: SnapshotRecord = serde_json::from_value(envelope.payload["record"].clone())
            .context("transformation payload missing record")?;
        let content = BASE64
            .decode(
                envelope.payload["content"]
                    .as_str()
                    .context("transformation payload missing content")?,
            )
            .context("transformation payload content is not base64")?;
        let encoding = envelope.payload["encoding"].as_str().map(str::to_string);
        let headers: HashMap<String, String> =
            serde_json::from_value(envelope.payload["headers"].clone()).unwrap_or_default();

        let blob = FetchedBlob {
            url: record.url.clone(),
            content,
            headers,
            encoding,
            downloaded_at: Utc::now(),
        };

        let document = self
            .stages
            .transformer
            .transform(&mut record, &blob)
            .with_context(|| format!("transformation failed for {}", record.url))?;

        self.queue.enqueue(
            Channel::Indexing,
            "document",
            json!({ "record": record, "document": document }),
        )?;
        Ok(())
    }

    async fn handle_indexing(&self, envelope: &QueueEnvelope) -> anyhow::Result<()> {
        let mut record: SnapshotRecord = serde_json::from_value(envelope.payload["record"].clone())
            .context("indexing payload missing record")?;
        let document: RewrittenDocument =
            serde_json::from_value(envelope.payload["document"].clone())
                .context("indexing payload missing document")?;

        record.set_status(SnapshotStatus::Indexing);
        match index_with(&*self.stages.store, &*self.stages.index, &document).await {
            Ok(()) => {
                record.set_status(SnapshotStatus::Indexed);
                Ok(())
            }
            Err(e) => {
                record.set_status(SnapshotStatus::Failed);
                Err(e.into())
            }
        }
    }
}
