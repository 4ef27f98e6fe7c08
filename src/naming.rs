//! File names for final outputs and staged artifacts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::catalog::ItemId;

/// Characters that may not appear in an output file name
pub const FORBIDDEN_CHARS: &str = r#"<>:"/\|?*"#;
/// Replacement for each forbidden character
pub const PLACEHOLDER: char = '-';

const TEMP_STEM_CHARS: usize = 48;

pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if FORBIDDEN_CHARS.contains(c) { PLACEHOLDER } else { c })
        .collect()
}

/// Final output names claimed within one batch.
///
/// Two items whose sanitized titles collide get the item identifier appended
/// (`Title [id].mp4`), so siblings never write the same path.
#[derive(Debug, Default)]
pub struct NameRegistry {
    claimed: Mutex<HashSet<String>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, dir: &Path, title: &str, item: &ItemId, extension: &str) -> PathBuf {
        let mut base = sanitize_title(title).trim().to_string();
        if base.is_empty() || base.chars().all(|c| c == '.') {
            base = sanitize_title(item.as_str());
        }

        let mut claimed = match self.claimed.lock() {
            Ok(claimed) => claimed,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut name = format!("{}.{}", base, extension);
        if claimed.contains(&name.to_lowercase()) {
            let suffixed = format!("{} [{}]", base, sanitize_title(item.as_str()));
            name = format!("{}.{}", suffixed, extension);
            let mut counter = 2;
            while claimed.contains(&name.to_lowercase()) {
                name = format!("{} ({}).{}", suffixed, counter, extension);
                counter += 1;
            }
        }

        claimed.insert(name.to_lowercase());
        dir.join(name)
    }
}

/// Unique hidden path for one staged artifact.
///
/// The `.part` extension and random component keep it distinct from every
/// final output and from all other artifacts of the batch.
pub fn temp_artifact_path(dir: &Path, output: &Path, label: &str) -> PathBuf {
    dir.join(format!(".{}.{}.{}.part", temp_stem(output), label, Uuid::new_v4().simple()))
}

/// Unique hidden path the assembler writes before the result is renamed onto
/// `output`. It keeps the final extension so the tool picks the same container.
pub fn temp_output_path(output: &Path) -> PathBuf {
    let dir = output.parent().unwrap_or_else(|| Path::new(""));
    let name = format!(".{}.{}.part", temp_stem(output), Uuid::new_v4().simple());
    match output.extension() {
        Some(ext) => dir.join(format!("{}.{}", name, ext.to_string_lossy())),
        None => dir.join(name),
    }
}

fn temp_stem(output: &Path) -> String {
    output
        .file_stem()
        .map(|s| s.to_string_lossy().chars().take(TEMP_STEM_CHARS).collect())
        .unwrap_or_default()
}
