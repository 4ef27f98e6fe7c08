//! Nagare - Concurrent Video and Audio Downloader
//!
//! Resolves video or playlist references through a remote catalog, stages the
//! selected streams to disk under a bounded concurrency limit, and assembles
//! them into MP4 or MP3 files with ffmpeg.

pub mod cli;
pub mod config;
pub mod error;
pub mod catalog;
pub mod select;
pub mod stage;
pub mod media;
pub mod naming;
pub mod outcome;
pub mod pipeline;
pub mod scheduler;
pub mod progress;
pub mod workflow;
