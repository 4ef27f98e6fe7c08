//! Per-item acquisition pipeline.
//!
//! `Resolving -> Selecting -> Fetching -> Staging -> Assembling -> Done`, with
//! `Failed` reachable from every non-terminal state. The assembler writes to a
//! hidden temporary beside the final name, which is renamed into place only
//! on success; staged artifacts and that temporary are removed on every exit
//! path, so a failed item never touches an existing file.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog::{ByteSource, Catalog, ItemId, VariantDescriptor};
use crate::config::{AcquisitionMode, SelectionConfig};
use crate::error::{Result, NagareError};
use crate::media::Assembler;
use crate::naming::{temp_artifact_path, temp_output_path, NameRegistry};
use crate::outcome::ItemOutcome;
use crate::progress::{ProgressSink, StatusEvent};
use crate::scheduler::AdmissionGate;
use crate::select::{select, Selection};
use crate::stage::Stager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Resolving,
    Selecting,
    Fetching,
    Staging,
    Assembling,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything a pipeline needs that is shared across one batch
pub struct PipelineContext {
    pub catalog: Arc<dyn Catalog>,
    pub assembler: Arc<dyn Assembler>,
    pub sink: Arc<dyn ProgressSink>,
    pub names: NameRegistry,
    pub mode: AcquisitionMode,
    pub selection: SelectionConfig,
    pub output_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub cancel: CancellationToken,
}

/// Temporary files owned by one pipeline run.
///
/// `cleanup` runs on every normal exit; `Drop` is the fallback when the
/// pipeline future is dropped before reaching it.
#[derive(Debug, Default)]
struct StagedArtifacts {
    staged: Vec<PathBuf>,
}

impl StagedArtifacts {
    fn register(&mut self, path: PathBuf) {
        self.staged.push(path);
    }

    async fn cleanup(&mut self) {
        for path in self.staged.drain(..) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for StagedArtifacts {
    fn drop(&mut self) {
        for path in &self.staged {
            let _ = std::fs::remove_file(path);
        }
    }
}

pub struct ItemPipeline {
    item: ItemId,
    ctx: Arc<PipelineContext>,
    state: PipelineState,
    artifacts: StagedArtifacts,
}

impl ItemPipeline {
    pub fn new(item: ItemId, ctx: Arc<PipelineContext>) -> Self {
        Self {
            item,
            ctx,
            state: PipelineState::Resolving,
            artifacts: StagedArtifacts::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Drive the item to `Done` or `Failed`, producing its single outcome
    pub async fn run(mut self, gate: &AdmissionGate) -> ItemOutcome {
        let result = self.execute(gate).await;
        self.artifacts.cleanup().await;

        match result {
            Ok((title, path)) => {
                self.transition(PipelineState::Done);
                self.ctx.sink.emit(StatusEvent::Finished {
                    item: self.item.clone(),
                    path: path.clone(),
                });
                ItemOutcome::Success {
                    item: self.item,
                    title,
                    path,
                }
            }
            Err(error) => {
                warn!("[{}] Failed while {}: {}", self.item, self.state, error);
                self.transition(PipelineState::Failed);
                self.ctx.sink.emit(StatusEvent::Failed {
                    item: self.item.clone(),
                    error: error.to_string(),
                });
                ItemOutcome::Failure {
                    item: self.item,
                    error,
                }
            }
        }
    }

    async fn execute(&mut self, gate: &AdmissionGate) -> Result<(String, PathBuf)> {
        let ctx = Arc::clone(&self.ctx);

        self.transition(PipelineState::Resolving);
        let metadata = {
            let _lookup = gate.acquire_lookup(&ctx.cancel).await?;
            cancellable(&ctx.cancel, "resolution", ctx.catalog.resolve(&self.item))
                .await
                .map_err(as_resolution)?
        };
        ctx.sink.emit(StatusEvent::Resolved {
            item: self.item.clone(),
            title: metadata.title.clone(),
        });

        self.transition(PipelineState::Selecting);
        let selection = select(&metadata.variants, ctx.mode, &ctx.selection)?;
        let output = ctx.names.claim(
            &ctx.output_dir,
            &metadata.title,
            &self.item,
            ctx.mode.extension(),
        );

        // Held until this function returns, whichever way it exits.
        let _permit = gate.acquire(&ctx.cancel).await?;
        ctx.sink.emit(StatusEvent::Admitted {
            item: self.item.clone(),
        });

        self.transition(PipelineState::Fetching);
        let labelled: Vec<(&'static str, &VariantDescriptor)> = match &selection {
            Selection::Combined { video, audio } => vec![("video", video), ("audio", audio)],
            Selection::AudioOnly { audio } => vec![("audio", audio)],
        };
        let mut streams: Vec<(&'static str, ByteSource, Option<u64>)> = Vec::new();
        for &(label, variant) in &labelled {
            let (source, size_hint) = cancellable(
                &ctx.cancel,
                "stream request",
                ctx.catalog.open_stream(&self.item, variant),
            )
            .await
            .map_err(as_resolution)?;
            streams.push((label, source, size_hint.or(variant.size)));
        }

        self.transition(PipelineState::Staging);
        let stager = Stager::new(Arc::clone(&ctx.sink), ctx.cancel.clone());
        let mut staged = Vec::with_capacity(streams.len());
        for (label, mut source, size_hint) in streams {
            let path = temp_artifact_path(&ctx.staging_dir, &output, label);
            self.artifacts.register(path.clone());
            let display = format!("{} ({})", metadata.title, label);
            stager
                .stage(&mut source, &path, &self.item, &display, size_hint)
                .await?;
            staged.push(path);
        }

        self.transition(PipelineState::Assembling);
        ctx.sink.emit(StatusEvent::Assembling {
            item: self.item.clone(),
        });
        let assembled = temp_output_path(&output);
        self.artifacts.register(assembled.clone());
        match staged.as_slice() {
            [video, audio] => {
                ctx.assembler
                    .merge_video_audio(video, audio, &assembled, &ctx.cancel)
                    .await?
            }
            [audio] => {
                ctx.assembler
                    .transcode_audio(audio, &assembled, &ctx.cancel)
                    .await?
            }
            other => {
                return Err(NagareError::Assembly(format!(
                    "unexpected number of staged artifacts: {}",
                    other.len()
                )));
            }
        }
        tokio::fs::rename(&assembled, &output).await?;

        Ok((metadata.title, output))
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            debug!("[{}] {} -> {}", self.item, self.state, next);
            self.state = next;
        }
    }
}

async fn cancellable<T, F>(cancel: &CancellationToken, what: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(NagareError::Cancelled(format!("{} interrupted", what))),
        result = future => result,
    }
}

/// Catalog failures are reported as resolution errors whatever their source
fn as_resolution(error: NagareError) -> NagareError {
    match error {
        NagareError::Resolution(_) | NagareError::Cancelled(_) => error,
        other => NagareError::Resolution(other.to_string()),
    }
}
