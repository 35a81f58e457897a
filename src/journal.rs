//! Activity Journal
//!
//! Append-only record of everything the agent does to itself: one
//! timestamp-prefixed line per state transition. The control loop only ever
//! writes here; nothing in the runtime reads the journal back except the
//! status command. Rotation is left to external tooling.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::error;

use crate::types::CycleRecord;

/// Journal line categories, one per kind of state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Initialization,
    ProviderConsultation,
    ValidationResult,
    MutationAttempt,
    Error,
    Restart,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Initialization => "initialization",
            Category::ProviderConsultation => "provider-consultation",
            Category::ValidationResult => "validation-result",
            Category::MutationAttempt => "mutation-attempt",
            Category::Error => "error",
            Category::Restart => "restart",
        }
    }
}

/// Handle to the append-only journal file.
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Open the journal at `path`, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create journal directory: {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line. Best-effort: the journal exists for observability
    /// only, so a write failure is logged and swallowed rather than allowed
    /// to abort the cycle that produced it.
    pub fn record(&self, category: Category, message: &str) {
        let line = format!(
            "[{}] [{}] {}\n",
            Utc::now().to_rfc3339(),
            category.as_str(),
            message.replace('\n', " ")
        );

        if let Err(e) = self.append(&line) {
            error!("journal write failed: {:#}", e);
        }
    }

    /// Append a full cycle record as a JSON payload.
    pub fn record_cycle(&self, record: &CycleRecord) {
        let payload = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
        self.record(Category::MutationAttempt, &payload);
    }

    /// The last `n` journal lines, oldest first. Used by the status command.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        let lines: Vec<&str> = contents.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].iter().map(|l| l.to_string()).collect()
    }

    fn append(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open journal: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .context("failed to append journal line")?;
        Ok(())
    }
}
