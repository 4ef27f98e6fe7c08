// Assembly through an external media tool
//
// - Processor: ffmpeg-backed `Assembler` implementation
// - Commands: command builders for the fixed invocation templates

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Merges or transcodes staged artifacts into final output files.
///
/// Each operation succeeds or fails as a unit and is never retried.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Assembler: Send + Sync {
    /// Copy the video stream and encode the audio stream into one container
    async fn merge_video_audio(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Drop any video stream and re-encode audio to the target profile
    async fn transcode_audio(
        &self,
        input_path: &Path,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Verify the tool can be launched, returning its version line
    async fn check_availability(&self) -> Result<String>;
}

/// Factory for creating assembler instances
pub struct AssemblerFactory;

impl AssemblerFactory {
    /// Create the default assembler implementation (FFmpeg-based)
    pub fn create_assembler(config: MediaConfig) -> Arc<dyn Assembler> {
        Arc::new(processor::FfmpegAssembler::new(config))
    }
}
