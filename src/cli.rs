use clap::Parser;
use std::path::PathBuf;

use crate::config::{AcquisitionMode, Config};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video or playlist URL (or a bare video identifier)
    pub reference: String,

    /// Download audio only and convert it to MP3
    #[arg(long)]
    pub mp3: bool,

    /// Output directory for downloaded files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum number of concurrent downloads
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Print item metadata and available streams without downloading
    #[arg(long)]
    pub metadata_only: bool,

    /// Abort the whole batch after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Command line flags take precedence over the configuration file
    pub fn apply_to(&self, config: &mut Config) {
        if self.mp3 {
            config.download.mode = AcquisitionMode::AudioOnly;
        }
        if let Some(output) = &self.output {
            config.download.output_dir = output.clone();
        }
        if let Some(jobs) = self.jobs {
            config.download.max_concurrent = jobs;
        }
        if let Some(timeout) = self.timeout {
            config.download.batch_timeout_secs = Some(timeout);
        }
    }
}
