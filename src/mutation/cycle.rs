//! The Evolution Cycle
//!
//! One pass of the state machine:
//! INTROSPECT -> CONSULT -> VALIDATE -> {COMMIT | REJECT}.
//! Rebirth is not performed here; a `Committed` outcome tells the
//! supervisor to take over, and this engine never resumes the loop after
//! a commit. Rejections and provider exhaustion leave the Code Store
//! byte-for-byte untouched.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CycleError, GatewayError};
use crate::gateway::ProviderGateway;
use crate::journal::{Category, Journal};
use crate::store::CodeStore;
use crate::types::{AgentConfig, CycleOutcome, CycleRecord};
use crate::validator::{self, Validation};

use super::prompt::{build_user_prompt, extract_candidate, MUTATION_SYSTEM_PROMPT};

pub struct MutationEngine<'a> {
    store: &'a CodeStore,
    gateway: &'a ProviderGateway,
    journal: &'a Journal,
    config: &'a AgentConfig,
}

impl<'a> MutationEngine<'a> {
    pub fn new(
        store: &'a CodeStore,
        gateway: &'a ProviderGateway,
        journal: &'a Journal,
        config: &'a AgentConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            journal,
            config,
        }
    }

    /// Run one evolution cycle to completion.
    ///
    /// `Ok` carries the cycle record whatever the outcome; `Err` is reserved
    /// for the faults that must stop or back off the loop (unreadable image,
    /// commit failure).
    pub async fn run_cycle(&self, directive: Option<&str>) -> Result<CycleRecord, CycleError> {
        // --- INTROSPECT ---
        let current = self.store.read().map_err(|e| {
            self.journal
                .record(Category::Error, &format!("introspection failed: {}", e));
            CycleError::Introspect(e)
        })?;

        info!(
            "cycle start: image {} bytes, directive: {}",
            current.len(),
            directive.unwrap_or("(autonomous)")
        );

        let user_prompt = build_user_prompt(&current, directive);
        let mut start = 0;

        loop {
            // --- CONSULT ---
            let consultation = match self
                .gateway
                .consult_from(start, MUTATION_SYSTEM_PROMPT, &user_prompt)
                .await
            {
                Ok(c) => c,
                Err(GatewayError::AllProvidersExhausted { attempted }) => {
                    self.journal.record(
                        Category::Error,
                        &format!("all providers exhausted ({} attempted)", attempted),
                    );
                    return Ok(self.finish(directive, None, None, CycleOutcome::ProviderExhausted));
                }
                Err(e) => {
                    self.journal
                        .record(Category::Error, &format!("consultation failed: {}", e));
                    return Err(CycleError::Consult(e));
                }
            };

            for failure in &consultation.failures {
                self.journal.record(
                    Category::ProviderConsultation,
                    &format!("{} failed: {}", failure.provider, failure.reason),
                );
            }
            self.journal.record(
                Category::ProviderConsultation,
                &format!(
                    "{} answered ({} bytes)",
                    consultation.provider,
                    consultation.body.len()
                ),
            );

            // --- VALIDATE ---
            let candidate = extract_candidate(&consultation.body);
            let rejection = match validator::validate(&candidate) {
                Validation::Rejected { reason } => Some(reason),
                Validation::Accepted => match &self.config.smoke_command {
                    Some(cmd) => self.run_smoke_test(cmd, &candidate).await.err(),
                    None => None,
                },
            };

            if let Some(reason) = rejection {
                self.journal.record(
                    Category::ValidationResult,
                    &format!("{}: rejected: {}", consultation.provider, reason),
                );
                warn!(
                    "candidate from '{}' rejected: {}",
                    consultation.provider, reason
                );

                // A provider that answers with bad syntax did not fail
                // transport; trying the rest of the list is gateway policy.
                if self.config.failover_on_invalid
                    && consultation.provider_index + 1 < self.gateway.len()
                {
                    start = consultation.provider_index + 1;
                    continue;
                }

                return Ok(self.finish(
                    directive,
                    Some(consultation.provider),
                    Some(reason),
                    CycleOutcome::Rejected,
                ));
            }

            self.journal.record(
                Category::ValidationResult,
                &format!("{}: accepted", consultation.provider),
            );

            // --- COMMIT ---
            let backup = self.store.snapshot_and_replace(&candidate).map_err(|e| {
                self.journal
                    .record(Category::Error, &format!("commit failed: {}", e));
                CycleError::Commit(e)
            })?;

            let pruned = self
                .store
                .prune_backups(self.config.max_backups)
                .map_err(|e| {
                    self.journal
                        .record(Category::Error, &format!("backup prune failed: {}", e));
                    CycleError::Commit(e)
                })?;

            info!(
                "committed candidate from '{}' ({} bytes), backup {}, {} pruned",
                consultation.provider,
                candidate.len(),
                backup.path.display(),
                pruned
            );

            return Ok(self.finish(
                directive,
                Some(consultation.provider),
                Some("accepted".to_string()),
                CycleOutcome::Committed,
            ));
        }
    }

    /// Run the configured smoke command against a scratch copy of the
    /// candidate. `Err` carries the rejection reason.
    async fn run_smoke_test(&self, command: &[String], candidate: &str) -> Result<(), String> {
        let Some((program, args)) = command.split_first() else {
            return Err("smoke command is empty".to_string());
        };

        let scratch: PathBuf =
            std::env::temp_dir().join(format!("metamorph-smoke-{}.rs", Uuid::new_v4()));
        if let Err(e) = std::fs::write(&scratch, candidate) {
            return Err(format!("failed to stage smoke test candidate: {}", e));
        }

        let result = tokio::process::Command::new(program)
            .args(args)
            .arg(&scratch)
            .output()
            .await;

        let _ = std::fs::remove_file(&scratch);

        match result {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(format!(
                    "smoke test failed ({}): {}",
                    output.status,
                    stderr.trim()
                ))
            }
            Err(e) => Err(format!("smoke test could not run: {}", e)),
        }
    }

    fn finish(
        &self,
        directive: Option<&str>,
        provider: Option<String>,
        validation: Option<String>,
        outcome: CycleOutcome,
    ) -> CycleRecord {
        let record = CycleRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            directive: directive.map(|d| d.to_string()),
            provider,
            validation,
            outcome,
        };
        self.journal.record_cycle(&record);
        record
    }
}
