//! Copies a variant's byte stream into a staged artifact on local storage.

use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::catalog::ItemId;
use crate::error::{Result, NagareError};
use crate::progress::{ProgressSink, StatusEvent};

const COPY_BUFFER_SIZE: usize = 64 * 1024;
const PROGRESS_STEP: u64 = 1024 * 1024;

pub struct Stager {
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl Stager {
    pub fn new(sink: Arc<dyn ProgressSink>, cancel: CancellationToken) -> Self {
        Self { sink, cancel }
    }

    /// Copy `source` into a newly created `destination`, returning the number
    /// of bytes written.
    ///
    /// The file is flushed, synced and closed before this returns `Ok`. On
    /// error the partially written file is left in place; removing it is the
    /// caller's job.
    pub async fn stage<R>(
        &self,
        source: &mut R,
        destination: &Path,
        item: &ItemId,
        label: &str,
        size_hint: Option<u64>,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        debug!("Staging {} into {}", label, destination.display());

        let mut file = File::create(destination).await?;
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut written: u64 = 0;
        let mut next_report = PROGRESS_STEP;

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(NagareError::Cancelled(format!("staging {} interrupted", label)));
                }
                read = source.read(&mut buffer) => read?,
            };
            if read == 0 {
                break;
            }

            file.write_all(&buffer[..read]).await?;
            written += read as u64;

            if written >= next_report {
                self.sink.emit(StatusEvent::Staging {
                    item: item.clone(),
                    label: label.to_string(),
                    bytes: written,
                    total: size_hint,
                });
                next_report = written + PROGRESS_STEP;
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        self.sink.emit(StatusEvent::Staged {
            item: item.clone(),
            label: label.to_string(),
            bytes: written,
        });
        Ok(written)
    }
}
