// Remote catalog abstraction
//
// The core only talks to the catalog through the `Catalog` trait:
// - resolve: identifier -> metadata and variant list
// - open_stream: identifier + variant -> readable byte source
// - expand_collection: collection reference -> item identifiers
//
// `ytdlp` provides the concrete implementation used by the binary.

pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::io::AsyncRead;

pub use ytdlp::YtDlpCatalog;

use crate::error::Result;

/// Opaque name of one fetchable unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One encoded rendition of an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDescriptor {
    /// Catalog-side format identifier
    pub format_id: String,
    /// Quality tier tag (e.g. "hd720", "medium")
    pub quality: String,
    /// Container classification, e.g. `video/mp4; codecs="avc1.4d401f"`
    pub mime_type: String,
    /// Whether the rendition carries an audio channel
    pub has_audio: bool,
    /// Size in bytes when the catalog knows it
    pub size: Option<u64>,
    /// Catalog-specific handle used to open the byte stream
    pub locator: String,
    /// Request headers the host expects when the stream is opened
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
}

impl VariantDescriptor {
    pub fn is_video_only(&self) -> bool {
        !self.has_audio && self.mime_type.starts_with("video/")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub id: ItemId,
    pub title: String,
    pub author: String,
    pub duration: Option<Duration>,
    pub description: String,
    pub variants: Vec<VariantDescriptor>,
}

/// Readable byte stream of one variant
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// What a user-supplied reference points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Item(ItemId),
    Collection(String),
}

impl Reference {
    /// Classify a reference; playlist URLs are collections, everything else is
    /// treated as a single item.
    pub fn parse(reference: &str) -> Self {
        let reference = reference.trim();
        let is_collection = reference.contains("playlist?list=")
            || (reference.contains("list=") && !reference.contains("v="));
        if is_collection {
            Reference::Collection(reference.to_string())
        } else {
            Reference::Item(ItemId::new(reference))
        }
    }
}

/// Remote catalog that resolves identifiers into variants and byte streams
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch metadata and the available variants of one item
    async fn resolve(&self, item: &ItemId) -> Result<ItemMetadata>;

    /// Open the byte stream of one variant, with a size hint when known
    async fn open_stream(
        &self,
        item: &ItemId,
        variant: &VariantDescriptor,
    ) -> Result<(ByteSource, Option<u64>)>;

    /// Expand a collection reference into its ordered item identifiers
    async fn expand_collection(&self, reference: &str) -> Result<Vec<ItemId>>;
}
