use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::ItemId;

/// Status notifications emitted while a batch runs
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Resolved { item: ItemId, title: String },
    Admitted { item: ItemId },
    Staging {
        item: ItemId,
        label: String,
        bytes: u64,
        total: Option<u64>,
    },
    Staged { item: ItemId, label: String, bytes: u64 },
    Assembling { item: ItemId },
    Finished { item: ItemId, path: PathBuf },
    Failed { item: ItemId, error: String },
}

/// Receiver of status events; shared by every pipeline of a batch
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

/// Percentage of `bytes` against a known total
pub fn percent(bytes: u64, total: Option<u64>) -> Option<f64> {
    total
        .filter(|total| *total > 0)
        .map(|total| bytes as f64 / total as f64 * 100.0)
}

/// Sink that writes every event to the tracing log
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: StatusEvent) {
        match event {
            StatusEvent::Resolved { item, title } => info!("[{}] Resolved \"{}\"", item, title),
            StatusEvent::Admitted { item } => debug!("[{}] Admitted", item),
            StatusEvent::Staging { item, label, bytes, total } => match percent(bytes, total) {
                Some(pct) => debug!("[{}] Downloading {}: {:.2}%", item, label, pct),
                None => debug!("[{}] Downloading {}: {} bytes", item, label, bytes),
            },
            StatusEvent::Staged { item, label, bytes } => {
                info!("[{}] Downloaded {} ({} bytes)", item, label, bytes)
            }
            StatusEvent::Assembling { item } => info!("[{}] Assembling output", item),
            StatusEvent::Finished { item, path } => {
                info!("[{}] Successfully downloaded: {}", item, path.display())
            }
            StatusEvent::Failed { item, error } => warn!("[{}] Failed: {}", item, error),
        }
    }
}

/// Sink that renders one byte counter per staging step
pub struct BarSink {
    multi: MultiProgress,
    bars: Mutex<HashMap<(ItemId, String), ProgressBar>>,
}

impl BarSink {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn bar_for(&self, item: &ItemId, label: &str, total: Option<u64>) -> ProgressBar {
        let mut bars = match self.bars.lock() {
            Ok(bars) => bars,
            Err(poisoned) => poisoned.into_inner(),
        };
        bars.entry((item.clone(), label.to_string()))
            .or_insert_with(|| {
                let bar = match total {
                    Some(total) => {
                        let bar = ProgressBar::new(total);
                        if let Ok(style) = ProgressStyle::default_bar()
                            .template("{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                        {
                            bar.set_style(style.progress_chars("#>-"));
                        }
                        bar
                    }
                    None => {
                        let bar = ProgressBar::new_spinner();
                        if let Ok(style) = ProgressStyle::default_spinner()
                            .template("{spinner:.green} {msg} {bytes}")
                        {
                            bar.set_style(style);
                        }
                        bar
                    }
                };
                bar.set_message(label.to_string());
                self.multi.add(bar)
            })
            .clone()
    }

    fn finish(&self, item: &ItemId, label: &str) {
        let mut bars = match self.bars.lock() {
            Ok(bars) => bars,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(bar) = bars.remove(&(item.clone(), label.to_string())) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarSink {
    fn emit(&self, event: StatusEvent) {
        match event {
            StatusEvent::Staging { item, label, bytes, total } => {
                self.bar_for(&item, &label, total).set_position(bytes);
            }
            StatusEvent::Staged { item, label, .. } => self.finish(&item, &label),
            StatusEvent::Finished { path, .. } => {
                let _ = self.multi.println(format!("done    {}", path.display()));
            }
            StatusEvent::Failed { item, error } => {
                let _ = self.multi.println(format!("failed  {}: {}", item, error));
            }
            StatusEvent::Resolved { .. }
            | StatusEvent::Admitted { .. }
            | StatusEvent::Assembling { .. } => {}
        }
    }
}
