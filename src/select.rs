//! Variant selection.
//!
//! Selection is deterministic: within a quality tier the first matching
//! variant in catalog order wins, and the catalog is never re-sorted.

use crate::catalog::VariantDescriptor;
use crate::config::{AcquisitionMode, SelectionConfig};
use crate::error::{Result, NagareError};

/// Variants chosen for one item
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// A video-only stream and an audio stream to be merged
    Combined {
        video: VariantDescriptor,
        audio: VariantDescriptor,
    },
    /// A single audio-bearing stream to be transcoded
    AudioOnly { audio: VariantDescriptor },
}

impl Selection {
    /// Variants in the order they are staged
    pub fn variants(&self) -> Vec<&VariantDescriptor> {
        match self {
            Selection::Combined { video, audio } => vec![video, audio],
            Selection::AudioOnly { audio } => vec![audio],
        }
    }
}

pub fn select(
    variants: &[VariantDescriptor],
    mode: AcquisitionMode,
    preferences: &SelectionConfig,
) -> Result<Selection> {
    match mode {
        AcquisitionMode::Combined => {
            let video = preferences.preferred_qualities.iter().find_map(|tier| {
                variants
                    .iter()
                    .find(|v| v.is_video_only() && v.quality == *tier)
            });
            let audio = variants
                .iter()
                .find(|v| v.mime_type.contains(&preferences.audio_mime));

            match (video, audio) {
                (Some(video), Some(audio)) => Ok(Selection::Combined {
                    video: video.clone(),
                    audio: audio.clone(),
                }),
                (None, _) => Err(NagareError::NoSuitableVariant(format!(
                    "no video-only variant at {}",
                    preferences.preferred_qualities.join(" or ")
                ))),
                (_, None) => Err(NagareError::NoSuitableVariant(format!(
                    "no {} audio variant",
                    preferences.audio_mime
                ))),
            }
        }
        AcquisitionMode::AudioOnly => variants
            .iter()
            .find(|v| v.has_audio)
            .map(|audio| Selection::AudioOnly {
                audio: audio.clone(),
            })
            .ok_or_else(|| {
                NagareError::NoSuitableVariant("no variant with an audio channel".to_string())
            }),
    }
}
