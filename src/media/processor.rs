use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, debug};

use crate::config::MediaConfig;
use crate::error::{Result, NagareError};
use super::{Assembler, MediaCommandBuilder};

/// Concrete assembler backed by the ffmpeg binary
pub struct FfmpegAssembler {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegAssembler {
    /// Create a new ffmpeg assembler
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl Assembler for FfmpegAssembler {
    async fn merge_video_audio(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Merging {} and {} -> {}",
              video_path.display(), audio_path.display(), output_path.display());

        let command = self.command_builder.merge_video_audio(
            video_path,
            audio_path,
            output_path,
            &self.config.merge_audio_codec,
        );
        command.execute(self.config.timeout(), cancel).await?;

        info!("Merge completed");
        Ok(())
    }

    async fn transcode_audio(
        &self,
        input_path: &Path,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Converting to {}: {}",
              output_path.extension().and_then(|e| e.to_str()).unwrap_or("audio"),
              output_path.display());

        let command = self.command_builder.transcode_audio(
            input_path,
            output_path,
            &self.config.audio_bitrate,
            self.config.audio_sample_rate,
        );
        command.execute(self.config.timeout(), cancel).await?;

        info!("Audio conversion completed");
        Ok(())
    }

    async fn check_availability(&self) -> Result<String> {
        debug!("Getting media processor version information");

        let output = tokio::process::Command::new(&self.config.binary_path)
            .args(&self.command_builder.version_check().args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                NagareError::Precondition(format!(
                    "{} is required but could not be executed: {}",
                    self.config.binary_path, e
                ))
            })?;

        if output.status.success() {
            let version_info = String::from_utf8_lossy(&output.stdout);
            // First line carries the version
            let first_line = version_info.lines().next().unwrap_or("Unknown version");
            info!("Media processor is available: {}", first_line);
            Ok(first_line.to_string())
        } else {
            Err(NagareError::Precondition(format!(
                "{} version check failed ({})",
                self.config.binary_path, output.status
            )))
        }
    }
}
