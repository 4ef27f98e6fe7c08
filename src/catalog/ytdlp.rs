use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use super::{ByteSource, Catalog, ItemId, ItemMetadata, VariantDescriptor};
use crate::config::CatalogConfig;
use crate::error::{Result, NagareError};

#[derive(Debug, Deserialize)]
struct YtDlpVideo {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    filesize: Option<f64>,
    #[serde(default)]
    filesize_approx: Option<f64>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    format_note: Option<String>,
    #[serde(default)]
    http_headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct YtDlpPlaylist {
    #[serde(default)]
    entries: Vec<Option<YtDlpEntry>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Catalog backed by `yt-dlp` for metadata and plain HTTP for stream bytes
pub struct YtDlpCatalog {
    config: CatalogConfig,
    client: Client,
}

impl YtDlpCatalog {
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// GET for a variant's bytes, carrying the headers yt-dlp reported for it
    fn stream_request(&self, variant: &VariantDescriptor) -> RequestBuilder {
        variant
            .http_headers
            .iter()
            .fold(self.client.get(&variant.locator), |request, (name, value)| {
                request.header(name.as_str(), value.as_str())
            })
    }

    /// Run yt-dlp with the given arguments and return its JSON stdout
    async fn dump_json(&self, args: &[&str], reference: &str) -> Result<Vec<u8>> {
        debug!("Executing {} {:?} {}", self.config.binary_path, args, reference);

        let output = Command::new(&self.config.binary_path)
            .args(args)
            .arg("--")
            .arg(reference)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                NagareError::Resolution(format!(
                    "Failed to execute {}: {}",
                    self.config.binary_path, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NagareError::Resolution(format!(
                "Lookup of {} failed: {}",
                reference,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Catalog for YtDlpCatalog {
    async fn resolve(&self, item: &ItemId) -> Result<ItemMetadata> {
        let stdout = self
            .dump_json(&["-J", "--no-playlist", "--no-warnings"], item.as_str())
            .await?;
        let video: YtDlpVideo = serde_json::from_slice(&stdout).map_err(|e| {
            NagareError::Resolution(format!("Unreadable metadata for {}: {}", item, e))
        })?;

        let metadata = metadata_from_video(item, video);
        info!(
            "Resolved {}: \"{}\" by {} ({} variants)",
            item,
            metadata.title,
            metadata.author,
            metadata.variants.len()
        );
        Ok(metadata)
    }

    async fn open_stream(
        &self,
        item: &ItemId,
        variant: &VariantDescriptor,
    ) -> Result<(ByteSource, Option<u64>)> {
        debug!("Opening stream {} of {}", variant.format_id, item);

        let response = self
            .stream_request(variant)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                NagareError::Resolution(format!(
                    "Failed to open stream {} of {}: {}",
                    variant.format_id, item, e
                ))
            })?;

        let size_hint = response.content_length().or(variant.size);
        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let reader: ByteSource = Box::new(StreamReader::new(Box::pin(stream)));

        Ok((reader, size_hint))
    }

    async fn expand_collection(&self, reference: &str) -> Result<Vec<ItemId>> {
        let stdout = self
            .dump_json(&["-J", "--flat-playlist", "--no-warnings"], reference)
            .await?;
        let playlist: YtDlpPlaylist = serde_json::from_slice(&stdout).map_err(|e| {
            NagareError::Resolution(format!("Unreadable collection {}: {}", reference, e))
        })?;

        let items = items_from_playlist(playlist);
        info!("Collection {} expanded to {} items", reference, items.len());
        Ok(items)
    }
}

fn metadata_from_video(item: &ItemId, video: YtDlpVideo) -> ItemMetadata {
    let variants = video.formats.iter().filter_map(variant_from_format).collect();

    ItemMetadata {
        id: item.clone(),
        title: video.title.unwrap_or_else(|| video.id.clone()),
        author: video.uploader.or(video.channel).unwrap_or_default(),
        duration: video
            .duration
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64),
        description: video.description.unwrap_or_default(),
        variants,
    }
}

fn items_from_playlist(playlist: YtDlpPlaylist) -> Vec<ItemId> {
    playlist
        .entries
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.url.or(entry.id))
        .map(ItemId::new)
        .collect()
}

/// Convert a yt-dlp format into a variant; manifests, storyboards and formats
/// without a direct URL are skipped.
fn variant_from_format(format: &YtDlpFormat) -> Option<VariantDescriptor> {
    let locator = format.url.clone()?;
    if let Some(protocol) = &format.protocol {
        if protocol != "https" && protocol != "http" {
            return None;
        }
    }

    let codec = |c: &Option<String>| c.as_deref().filter(|c| *c != "none").map(str::to_string);
    let video_codec = codec(&format.vcodec);
    let audio_codec = codec(&format.acodec);
    if video_codec.is_none() && audio_codec.is_none() {
        return None;
    }

    let container = match format.ext.as_deref() {
        Some("m4a") | None => "mp4",
        Some(ext) => ext,
    };
    let kind = if video_codec.is_some() { "video" } else { "audio" };
    let codecs: Vec<String> = video_codec.iter().chain(audio_codec.iter()).cloned().collect();

    let quality = if video_codec.is_some() {
        format.height.map(quality_tier).unwrap_or("unknown").to_string()
    } else {
        format
            .format_note
            .clone()
            .unwrap_or_else(|| "audio".to_string())
    };

    Some(VariantDescriptor {
        format_id: format.format_id.clone(),
        quality,
        mime_type: format!("{}/{}; codecs=\"{}\"", kind, container, codecs.join(", ")),
        has_audio: audio_codec.is_some(),
        size: format
            .filesize
            .or(format.filesize_approx)
            .filter(|size| *size > 0.0)
            .map(|size| size as u64),
        locator,
        http_headers: format.http_headers.clone(),
    })
}

/// YouTube-style quality tier name for a frame height
fn quality_tier(height: u32) -> &'static str {
    match height {
        0..=144 => "tiny",
        145..=240 => "small",
        241..=360 => "medium",
        361..=480 => "large",
        481..=720 => "hd720",
        721..=1080 => "hd1080",
        1081..=1440 => "hd1440",
        1441..=2160 => "hd2160",
        _ => "highres",
    }
}
