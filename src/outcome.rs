use std::fmt;
use std::path::{Path, PathBuf};

use crate::catalog::ItemId;
use crate::error::{ErrorKind, NagareError};

/// Result of one item's pipeline; produced exactly once per item
#[derive(Debug)]
pub enum ItemOutcome {
    Success {
        item: ItemId,
        title: String,
        path: PathBuf,
    },
    Failure {
        item: ItemId,
        error: NagareError,
    },
}

impl ItemOutcome {
    pub fn item(&self) -> &ItemId {
        match self {
            ItemOutcome::Success { item, .. } | ItemOutcome::Failure { item, .. } => item,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ItemOutcome::Success { path, .. } => Some(path),
            ItemOutcome::Failure { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ItemOutcome::Success { .. } => None,
            ItemOutcome::Failure { error, .. } => Some(error.kind()),
        }
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemOutcome::Success { item, title, path } => {
                write!(f, "OK     {} \"{}\" -> {}", item, title, path.display())
            }
            ItemOutcome::Failure { item, error } => write!(f, "FAILED {}: {}", item, error),
        }
    }
}

/// Outcomes of one batch, in completion order
#[derive(Debug, Default)]
pub struct BatchResult {
    outcomes: Vec<ItemOutcome>,
}

impl BatchResult {
    pub fn new(outcomes: Vec<ItemOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[ItemOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ItemOutcome::is_success)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} of {} items downloaded, {} failed",
            self.successes().count(),
            self.len(),
            self.failures().count()
        )
    }
}
