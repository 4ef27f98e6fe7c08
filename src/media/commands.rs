use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, NagareError};

/// Lines of stderr kept when a command fails
const STDERR_TAIL_LINES: usize = 5;

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Keep the tool's own diagnostics down to errors
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner").arg("-loglevel").arg("error")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Copy video stream
    pub fn copy_video(self) -> Self {
        self.video_codec("copy")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-ab").arg(bitrate)
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Run the command to completion.
    ///
    /// Only the exit status decides success; stderr is kept for the error
    /// message. The child is killed when `cancel` fires or `timeout` elapses.
    pub async fn execute(&self, timeout: Duration, cancel: &CancellationToken) -> Result<()> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let child = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NagareError::Assembly(format!("Failed to execute media processor: {}", e)))?;

        let output = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(NagareError::Cancelled(format!("{} interrupted", self.description)));
            }
            waited = tokio::time::timeout(timeout, child.wait_with_output()) => match waited {
                Ok(output) => output.map_err(|e| {
                    NagareError::Assembly(format!("{} could not be awaited: {}", self.description, e))
                })?,
                Err(_) => {
                    return Err(NagareError::Assembly(format!(
                        "{} timed out after {}s",
                        self.description,
                        timeout.as_secs()
                    )));
                }
            },
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NagareError::Assembly(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr_tail(&stderr)
            )));
        }

        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

/// Builder for the fixed ffmpeg invocations
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build video/audio merge command: video copied, audio re-encoded
    pub fn merge_video_audio<P: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: P,
        output_path: P,
        audio_codec: &str,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Video/audio merge")
            .quiet()
            .input(video_path)
            .input(audio_path)
            .copy_video()
            .audio_codec(audio_codec)
            .arg("-strict")
            .arg("experimental")
            .overwrite()
            .output(output_path)
    }

    /// Build audio transcode command: video dropped, audio re-encoded
    pub fn transcode_audio<P: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: P,
        bitrate: &str,
        sample_rate: u32,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio transcode")
            .quiet()
            .input(input_path)
            .no_video()
            .audio_bitrate(bitrate)
            .audio_sample_rate(sample_rate)
            .overwrite()
            .output(output_path)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}
