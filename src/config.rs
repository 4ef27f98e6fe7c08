use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Result, NagareError};

fn default_max_concurrent() -> usize {
    3
}

fn default_media_timeout_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory receiving the final output files
    pub output_dir: PathBuf,
    /// Maximum number of items inside fetch/stage/assemble at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Acquisition mode applied to every item of a batch
    #[serde(default)]
    pub mode: AcquisitionMode,
    /// Directory for staged artifacts; the output directory when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Deadline for the whole batch
    #[serde(default)]
    pub batch_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    /// Combined: merge a video-only stream with an audio stream into an mp4
    #[default]
    Combined,
    /// AudioOnly: transcode the first audio-bearing stream into an mp3
    AudioOnly,
}

impl AcquisitionMode {
    /// File extension of the final artifact
    pub fn extension(&self) -> &'static str {
        match self {
            AcquisitionMode::Combined => "mp4",
            AcquisitionMode::AudioOnly => "mp3",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Video quality tiers in order of preference (primary, then fallback)
    pub preferred_qualities: Vec<String>,
    /// Mime fragment the audio variant must contain in combined mode
    pub audio_mime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Audio codec used when merging video and audio
    pub merge_audio_codec: String,
    /// Audio bitrate for audio-only transcoding
    pub audio_bitrate: String,
    /// Audio sample rate for audio-only transcoding
    pub audio_sample_rate: u32,
    /// Upper bound for a single ffmpeg invocation
    #[serde(default = "default_media_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path to yt-dlp binary used for metadata resolution
    pub binary_path: String,
    /// User agent for stream requests
    pub user_agent: String,
    /// Connect timeout for stream requests
    pub request_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            max_concurrent: default_max_concurrent(),
            mode: AcquisitionMode::Combined,
            temp_dir: None,
            batch_timeout_secs: None,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            preferred_qualities: vec!["hd720".to_string(), "medium".to_string()],
            audio_mime: "audio/mp4".to_string(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            merge_audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            audio_sample_rate: 44100,
            timeout_secs: default_media_timeout_secs(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            binary_path: "yt-dlp".to_string(),
            user_agent: format!("nagare/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
        }
    }
}

impl MediaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DownloadConfig {
    /// Directory where staged artifacts are written
    pub fn staging_dir(&self) -> &Path {
        self.temp_dir.as_deref().unwrap_or(&self.output_dir)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NagareError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| NagareError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NagareError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| NagareError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent == 0 {
            return Err(NagareError::Config(
                "download.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.media.binary_path.trim().is_empty() {
            return Err(NagareError::Config("media.binary_path is empty".to_string()));
        }
        if self.catalog.binary_path.trim().is_empty() {
            return Err(NagareError::Config("catalog.binary_path is empty".to_string()));
        }
        if self.selection.preferred_qualities.is_empty() {
            return Err(NagareError::Config(
                "selection.preferred_qualities needs at least one tier".to_string(),
            ));
        }
        Ok(())
    }
}
