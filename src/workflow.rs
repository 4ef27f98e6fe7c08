use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{Catalog, ItemId, ItemMetadata, Reference, YtDlpCatalog};
use crate::config::{AcquisitionMode, Config};
use crate::error::{Result, NagareError};
use crate::media::{Assembler, AssemblerFactory};
use crate::naming::NameRegistry;
use crate::outcome::BatchResult;
use crate::pipeline::PipelineContext;
use crate::progress::ProgressSink;
use crate::scheduler::Scheduler;

pub struct Workflow {
    config: Config,
    catalog: Arc<dyn Catalog>,
    assembler: Arc<dyn Assembler>,
    sink: Arc<dyn ProgressSink>,
}

impl Workflow {
    /// Build a workflow backed by yt-dlp and ffmpeg
    pub fn new(config: Config, sink: Arc<dyn ProgressSink>) -> Result<Self> {
        let catalog: Arc<dyn Catalog> = Arc::new(YtDlpCatalog::new(config.catalog.clone())?);
        let assembler = AssemblerFactory::create_assembler(config.media.clone());
        Ok(Self::with_components(config, catalog, assembler, sink))
    }

    pub fn with_components(
        config: Config,
        catalog: Arc<dyn Catalog>,
        assembler: Arc<dyn Assembler>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            catalog,
            assembler,
            sink,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fail fast when the batch cannot possibly succeed.
    ///
    /// Audio-only batches need the media tool for every item, so a missing
    /// tool is fatal. Combined batches only warn and let each item report its
    /// own assembly failure.
    pub async fn check_preconditions(&self) -> Result<()> {
        self.config.validate()?;

        match self.assembler.check_availability().await {
            Ok(version) => {
                info!("Media tool available: {}", version);
                Ok(())
            }
            Err(e) if self.config.download.mode == AcquisitionMode::AudioOnly => {
                Err(NagareError::Precondition(format!(
                    "audio-only downloads require {}: {}",
                    self.config.media.binary_path, e
                )))
            }
            Err(e) => {
                warn!("Media tool check failed, merging will not work: {}", e);
                Ok(())
            }
        }
    }

    /// Turn a user reference into the item identifiers of the batch
    pub async fn expand(&self, reference: &str) -> Result<Vec<ItemId>> {
        match Reference::parse(reference) {
            Reference::Item(item) => Ok(vec![item]),
            Reference::Collection(collection) => {
                info!("Expanding collection: {}", collection);
                let items = self
                    .catalog
                    .expand_collection(&collection)
                    .await
                    .map_err(|e| match e {
                        NagareError::Resolution(_) | NagareError::Cancelled(_) => e,
                        other => NagareError::Resolution(format!(
                            "failed to expand {}: {}",
                            collection, other
                        )),
                    })?;
                info!("Collection contains {} items", items.len());
                Ok(items)
            }
        }
    }

    /// Download everything `reference` points at.
    ///
    /// Returns `Err` only for batch-level failures (preconditions, expansion,
    /// output directory). Item failures are reported in the `BatchResult`.
    pub async fn download(&self, reference: &str, cancel: CancellationToken) -> Result<BatchResult> {
        self.check_preconditions().await?;

        let download = &self.config.download;
        fs::create_dir_all(&download.output_dir).await?;
        fs::create_dir_all(download.staging_dir()).await?;

        let items = self.expand(reference).await?;
        if items.is_empty() {
            warn!("Nothing to download for {}", reference);
            return Ok(BatchResult::default());
        }

        let batch_cancel = cancel.child_token();
        let deadline = download.batch_timeout().map(|timeout| {
            let token = batch_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!("Batch deadline of {:?} reached, cancelling remaining work", timeout);
                token.cancel();
            })
        });

        let ctx = PipelineContext {
            catalog: Arc::clone(&self.catalog),
            assembler: Arc::clone(&self.assembler),
            sink: Arc::clone(&self.sink),
            names: NameRegistry::new(),
            mode: download.mode,
            selection: self.config.selection.clone(),
            output_dir: download.output_dir.clone(),
            staging_dir: download.staging_dir().to_path_buf(),
            cancel: batch_cancel,
        };

        let result = Scheduler::new(ctx, download.max_concurrent).run(items).await;

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        Ok(result)
    }

    /// Resolve metadata for every item without downloading anything.
    ///
    /// Results keep the order of the expanded reference.
    pub async fn describe(&self, reference: &str) -> Result<Vec<(ItemId, Result<ItemMetadata>)>> {
        let items = self.expand(reference).await?;
        let catalog = Arc::clone(&self.catalog);

        let described: Vec<_> = stream::iter(items)
            .map(|item| {
                let catalog = Arc::clone(&catalog);
                async move {
                    let metadata = catalog.resolve(&item).await;
                    (item, metadata)
                }
            })
            .buffered(self.config.download.max_concurrent.max(1))
            .collect()
            .await;

        Ok(described)
    }
}
