//! End-to-end batch behaviour against in-memory catalog and assembler fakes.

use async_trait::async_trait;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use nagare::catalog::{ByteSource, Catalog, ItemId, ItemMetadata, VariantDescriptor};
use nagare::config::{AcquisitionMode, Config};
use nagare::error::{ErrorKind, NagareError, Result};
use nagare::media::Assembler;
use nagare::progress::LogSink;
use nagare::workflow::Workflow;

const PLAYLIST: &str = "https://www.youtube.com/playlist?list=PLfake";

/// Tracks how many callers are inside a region at once
#[derive(Default)]
struct Occupancy {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct FakeCatalog {
    items: Vec<ItemId>,
    unavailable: Vec<ItemId>,
    calls: AtomicUsize,
    lookup_delay: Duration,
    resolving: Occupancy,
    /// Entered when an item opens its first stream, left by the assembler
    transferring: Arc<Occupancy>,
}

impl FakeCatalog {
    fn new(ids: &[&str]) -> Self {
        Self {
            items: ids.iter().map(|id| ItemId::new(*id)).collect(),
            unavailable: Vec::new(),
            calls: AtomicUsize::new(0),
            lookup_delay: Duration::ZERO,
            resolving: Occupancy::default(),
            transferring: Arc::new(Occupancy::default()),
        }
    }

    fn slow_lookups(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    fn unavailable(mut self, id: &str) -> Self {
        self.unavailable.push(ItemId::new(id));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn variant(format_id: &str, quality: &str, mime: &str, has_audio: bool) -> VariantDescriptor {
    VariantDescriptor {
        format_id: format_id.to_string(),
        quality: quality.to_string(),
        mime_type: mime.to_string(),
        has_audio,
        size: None,
        locator: format_id.to_string(),
        http_headers: Default::default(),
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn resolve(&self, item: &ItemId) -> Result<ItemMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.resolving.enter();
        tokio::time::sleep(self.lookup_delay).await;
        self.resolving.leave();
        if self.unavailable.contains(item) {
            return Err(NagareError::Resolution(format!("{} is unavailable", item)));
        }
        Ok(ItemMetadata {
            id: item.clone(),
            title: format!("Title {}", item),
            author: "Fake Channel".to_string(),
            duration: Some(Duration::from_secs(61)),
            description: String::new(),
            variants: vec![
                variant("22", "hd720", "video/mp4; codecs=\"avc1.64001F, mp4a.40.2\"", true),
                variant("136", "hd720", "video/mp4; codecs=\"avc1.4d401f\"", false),
                variant("140", "medium", "audio/mp4; codecs=\"mp4a.40.2\"", true),
            ],
        })
    }

    async fn open_stream(
        &self,
        item: &ItemId,
        variant: &VariantDescriptor,
    ) -> Result<(ByteSource, Option<u64>)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Audio format 140 is only ever the second stream of a combined item.
        if variant.format_id != "140" {
            self.transferring.enter();
        }
        tokio::task::yield_now().await;
        let body = format!("{}:{};", item, variant.format_id).into_bytes();
        let len = body.len() as u64;
        Ok((Box::new(Cursor::new(body)), Some(len)))
    }

    async fn expand_collection(&self, _reference: &str) -> Result<Vec<ItemId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.clone())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum AssemblyBehaviour {
    Succeed,
    /// Leave a partial output behind, then fail
    Fail,
    /// Fail without touching any file, like a tool that cannot start
    FailToLaunch,
    /// Block until cancelled
    Hang,
}

struct FakeAssembler {
    behaviour: AssemblyBehaviour,
    tool_available: bool,
    delay: Duration,
    active: Occupancy,
    transferring: Option<Arc<Occupancy>>,
}

impl FakeAssembler {
    fn new(behaviour: AssemblyBehaviour) -> Self {
        Self {
            behaviour,
            tool_available: true,
            delay: Duration::from_millis(50),
            active: Occupancy::default(),
            transferring: None,
        }
    }

    /// Close the transfer region the catalog opened for each item
    fn ending_transfers_of(mut self, catalog: &FakeCatalog) -> Self {
        self.transferring = Some(Arc::clone(&catalog.transferring));
        self
    }

    fn missing_tool() -> Self {
        Self {
            tool_available: false,
            ..Self::new(AssemblyBehaviour::Succeed)
        }
    }

    fn max_active(&self) -> usize {
        self.active.peak()
    }

    async fn assemble(
        &self,
        inputs: &[&Path],
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.active.enter();
        let result = self.run(inputs, output, cancel).await;
        self.active.leave();
        if let Some(transferring) = &self.transferring {
            transferring.leave();
        }
        result
    }

    async fn run(&self, inputs: &[&Path], output: &Path, cancel: &CancellationToken) -> Result<()> {
        match self.behaviour {
            AssemblyBehaviour::Hang => {
                cancel.cancelled().await;
                Err(NagareError::Cancelled("assembly interrupted".to_string()))
            }
            AssemblyBehaviour::Fail => {
                tokio::fs::write(output, b"partial").await?;
                Err(NagareError::Assembly("muxer exploded".to_string()))
            }
            AssemblyBehaviour::FailToLaunch => {
                Err(NagareError::Assembly("could not launch ffmpeg".to_string()))
            }
            AssemblyBehaviour::Succeed => {
                tokio::time::sleep(self.delay).await;
                let mut merged = Vec::new();
                for input in inputs {
                    merged.extend(tokio::fs::read(input).await?);
                }
                tokio::fs::write(output, merged).await?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Assembler for FakeAssembler {
    async fn merge_video_audio(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.assemble(&[video_path, audio_path], output_path, cancel).await
    }

    async fn transcode_audio(
        &self,
        input_path: &Path,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.assemble(&[input_path], output_path, cancel).await
    }

    async fn check_availability(&self) -> Result<String> {
        if self.tool_available {
            Ok("fake-ffmpeg version 1.0".to_string())
        } else {
            Err(NagareError::Precondition("fake-ffmpeg not found".to_string()))
        }
    }
}

fn config(output: &Path, max_concurrent: usize) -> Config {
    let mut config = Config::default();
    config.download.output_dir = output.to_path_buf();
    config.download.max_concurrent = max_concurrent;
    config
}

fn workflow(config: Config, catalog: Arc<FakeCatalog>, assembler: Arc<FakeAssembler>) -> Workflow {
    Workflow::with_components(config, catalog, assembler, Arc::new(LogSink))
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_failed_item_does_not_affect_siblings() {
    let tmp = TempDir::new().unwrap();
    let catalog = Arc::new(FakeCatalog::new(&["one", "two", "three"]).unavailable("two"));
    let assembler = Arc::new(FakeAssembler::new(AssemblyBehaviour::Succeed));
    let wf = workflow(config(tmp.path(), 2), catalog, assembler);

    let result = wf.download(PLAYLIST, CancellationToken::new()).await.unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result.successes().count(), 2);
    let failures: Vec<_> = result.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].item().as_str(), "two");
    assert_eq!(failures[0].error_kind(), Some(ErrorKind::Resolution));

    assert_eq!(dir_entries(tmp.path()), vec!["Title one.mp4", "Title three.mp4"]);
    let merged = std::fs::read(tmp.path().join("Title one.mp4")).unwrap();
    assert_eq!(merged, b"one:136;one:140;");
}

#[tokio::test]
async fn test_every_item_reports_exactly_once() {
    let tmp = TempDir::new().unwrap();
    let ids: Vec<String> = (0..8).map(|i| format!("item{}", i)).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let catalog = Arc::new(
        FakeCatalog::new(&id_refs)
            .unavailable("item1")
            .unavailable("item4")
            .unavailable("item6"),
    );
    let assembler = Arc::new(FakeAssembler::new(AssemblyBehaviour::Succeed));
    let wf = workflow(config(tmp.path(), 3), catalog, assembler);

    let result = wf.download(PLAYLIST, CancellationToken::new()).await.unwrap();

    let mut reported: Vec<&str> = result.outcomes().iter().map(|o| o.item().as_str()).collect();
    reported.sort();
    assert_eq!(reported, id_refs);
    assert_eq!(result.failures().count(), 3);
    assert!(!result.all_succeeded());
    assert_eq!(result.summary(), "5 of 8 items downloaded, 3 failed");
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    for limit in [1, 2] {
        let tmp = TempDir::new().unwrap();
        let catalog = Arc::new(FakeCatalog::new(&["a", "b", "c", "d", "e"]));
        let assembler = Arc::new(
            FakeAssembler::new(AssemblyBehaviour::Succeed).ending_transfers_of(&catalog),
        );
        let wf = workflow(
            config(tmp.path(), limit),
            Arc::clone(&catalog),
            Arc::clone(&assembler),
        );

        let result = wf.download(PLAYLIST, CancellationToken::new()).await.unwrap();

        assert!(result.all_succeeded());
        // From the first stream request through the end of assembly.
        assert_eq!(catalog.transferring.peak(), limit);
        assert_eq!(assembler.max_active(), limit);
    }
}

#[tokio::test]
async fn test_resolution_is_bounded_by_limit() {
    let ids: Vec<String> = (0..20).map(|i| format!("item{}", i)).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    for limit in [1, 3] {
        let tmp = TempDir::new().unwrap();
        let catalog =
            Arc::new(FakeCatalog::new(&id_refs).slow_lookups(Duration::from_millis(20)));
        let assembler = Arc::new(FakeAssembler::new(AssemblyBehaviour::FailToLaunch));
        let wf = workflow(config(tmp.path(), limit), Arc::clone(&catalog), assembler);

        let result = wf.download(PLAYLIST, CancellationToken::new()).await.unwrap();

        assert_eq!(result.len(), 20);
        assert_eq!(catalog.resolving.peak(), limit);
    }
}

#[tokio::test]
async fn test_failed_launch_keeps_existing_download() {
    let tmp = TempDir::new().unwrap();
    let existing = tmp.path().join("Title https---youtu.be-solo.mp4");
    std::fs::write(&existing, b"good download").unwrap();

    let catalog = Arc::new(FakeCatalog::new(&[]));
    let assembler = Arc::new(FakeAssembler::new(AssemblyBehaviour::FailToLaunch));
    let wf = workflow(config(tmp.path(), 1), catalog, assembler);

    let result = wf
        .download("https://youtu.be/solo", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.outcomes()[0].error_kind(), Some(ErrorKind::Assembly));
    assert_eq!(dir_entries(tmp.path()), vec!["Title https---youtu.be-solo.mp4"]);
    assert_eq!(std::fs::read(&existing).unwrap(), b"good download");
}

#[tokio::test]
async fn test_audio_only_without_tool_fails_before_dispatch() {
    let tmp = TempDir::new().unwrap();
    let catalog = Arc::new(FakeCatalog::new(&["a", "b"]));
    let assembler = Arc::new(FakeAssembler::missing_tool());
    let mut config = config(tmp.path(), 2);
    config.download.mode = AcquisitionMode::AudioOnly;
    let wf = workflow(config, Arc::clone(&catalog), assembler);

    let err = wf.download(PLAYLIST, CancellationToken::new()).await.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(catalog.calls(), 0);
}

#[tokio::test]
async fn test_audio_only_writes_mp3() {
    let tmp = TempDir::new().unwrap();
    let catalog = Arc::new(FakeCatalog::new(&[]));
    let assembler = Arc::new(FakeAssembler::new(AssemblyBehaviour::Succeed));
    let mut config = config(tmp.path(), 2);
    config.download.mode = AcquisitionMode::AudioOnly;
    let wf = workflow(config, catalog, assembler);

    let result = wf
        .download("https://youtu.be/solo", CancellationToken::new())
        .await
        .unwrap();

    assert!(result.all_succeeded());
    let path: PathBuf = result.outcomes()[0].path().unwrap().to_path_buf();
    assert_eq!(path.extension().unwrap(), "mp3");
    // First audio-bearing variant wins, muxed or not.
    assert_eq!(std::fs::read(&path).unwrap(), b"https://youtu.be/solo:22;");
    assert_eq!(dir_entries(tmp.path()).len(), 1);
}

#[tokio::test]
async fn test_failed_assembly_leaves_no_files() {
    let tmp = TempDir::new().unwrap();
    let catalog = Arc::new(FakeCatalog::new(&["a", "b"]));
    let assembler = Arc::new(FakeAssembler::new(AssemblyBehaviour::Fail));
    let wf = workflow(config(tmp.path(), 2), catalog, assembler);

    let result = wf.download(PLAYLIST, CancellationToken::new()).await.unwrap();

    assert_eq!(result.len(), 2);
    assert!(result
        .failures()
        .all(|o| o.error_kind() == Some(ErrorKind::Assembly)));
    assert!(dir_entries(tmp.path()).is_empty());
}

#[tokio::test]
async fn test_separate_staging_dir_is_cleaned() {
    let out = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let catalog = Arc::new(FakeCatalog::new(&["a", "b"]));
    let assembler = Arc::new(FakeAssembler::new(AssemblyBehaviour::Succeed));
    let mut config = config(out.path(), 2);
    config.download.temp_dir = Some(staging.path().to_path_buf());
    let wf = workflow(config, catalog, assembler);

    let result = wf.download(PLAYLIST, CancellationToken::new()).await.unwrap();

    assert!(result.all_succeeded());
    assert_eq!(dir_entries(out.path()), vec!["Title a.mp4", "Title b.mp4"]);
    assert!(dir_entries(staging.path()).is_empty());
}

#[tokio::test]
async fn test_cancellation_fails_every_item_and_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let catalog = Arc::new(FakeCatalog::new(&["a", "b", "c"]));
    let assembler = Arc::new(FakeAssembler::new(AssemblyBehaviour::Hang));
    let wf = workflow(config(tmp.path(), 1), catalog, assembler);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = wf.download(PLAYLIST, cancel).await.unwrap();

    assert_eq!(result.len(), 3);
    assert!(result
        .failures()
        .all(|o| o.error_kind() == Some(ErrorKind::Cancelled)));
    assert_eq!(result.failures().count(), 3);
    assert!(dir_entries(tmp.path()).is_empty());
}

#[tokio::test]
async fn test_batch_deadline_cancels_outstanding_work() {
    let tmp = TempDir::new().unwrap();
    let catalog = Arc::new(FakeCatalog::new(&["a", "b"]));
    let assembler = Arc::new(FakeAssembler::new(AssemblyBehaviour::Hang));
    let mut config = config(tmp.path(), 2);
    config.download.batch_timeout_secs = Some(1);
    let wf = workflow(config, catalog, assembler);

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        wf.download(PLAYLIST, CancellationToken::new()),
    )
    .await
    .expect("deadline should end the batch")
    .unwrap();

    assert_eq!(result.len(), 2);
    assert!(result
        .outcomes()
        .iter()
        .all(|o| o.error_kind() == Some(ErrorKind::Cancelled)));
    assert!(dir_entries(tmp.path()).is_empty());
}
