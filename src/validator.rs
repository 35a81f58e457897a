//! Syntax Validator
//!
//! Full-grammar parse gate for candidate source images. A candidate that
//! fails to parse never reaches the Code Store. Validation is syntax-only:
//! code that parses but misbehaves at runtime is accepted here and caught
//! only after rebirth, by manual restore from a backup.

use tracing::debug;

/// Verdict on a candidate source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Accepted,
    Rejected { reason: String },
}

impl Validation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Validation::Accepted)
    }

    /// "accepted", or the rejection reason.
    pub fn describe(&self) -> String {
        match self {
            Validation::Accepted => "accepted".to_string(),
            Validation::Rejected { reason } => reason.clone(),
        }
    }
}

/// Parse `candidate` as a complete Rust source file.
pub fn validate(candidate: &str) -> Validation {
    if candidate.trim().is_empty() {
        return Validation::Rejected {
            reason: "candidate is empty".to_string(),
        };
    }

    match syn::parse_file(candidate) {
        Ok(_) => {
            debug!("candidate parsed cleanly ({} bytes)", candidate.len());
            Validation::Accepted
        }
        Err(e) => Validation::Rejected {
            reason: format!("parse error: {}", e),
        },
    }
}
