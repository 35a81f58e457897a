//! Lifecycle Supervisor
//!
//! Owns the outer loop around the mutation engine: cadence between cycles,
//! backoff and give-up policy after failed cycles, and the rebirth that
//! activates a committed image. Rebirth replaces this process outright --
//! nothing in memory survives it; all continuity comes from the Code Store
//! and the configuration on disk.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config;
use crate::gateway::ProviderGateway;
use crate::journal::{Category, Journal};
use crate::mutation::MutationEngine;
use crate::store::CodeStore;
use crate::types::{AgentConfig, CycleOutcome, CycleRecord, ExhaustAction};

/// What the supervisor does between cycles.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryAction {
    Wait(Duration),
    Terminate,
}

/// Retry policy: normal cadence after a clean cycle, short backoff after a
/// failed one, and a configured action once failures pile up.
pub fn next_action(config: &AgentConfig, consecutive_failures: u32) -> RetryAction {
    if consecutive_failures == 0 {
        return RetryAction::Wait(Duration::from_secs(config.cycle_interval_secs));
    }

    if consecutive_failures >= config.max_consecutive_failures {
        return match config.exhaust_action {
            ExhaustAction::Terminate => RetryAction::Terminate,
            ExhaustAction::Wait => {
                RetryAction::Wait(Duration::from_secs(config.cycle_interval_secs))
            }
        };
    }

    RetryAction::Wait(Duration::from_secs(config.failure_backoff_secs))
}

/// The store, gateway, and journal for one process lifetime.
pub struct Runtime {
    pub store: CodeStore,
    pub gateway: ProviderGateway,
    pub journal: Journal,
}

pub fn build_runtime(config: &AgentConfig) -> Result<Runtime> {
    let journal = Journal::open(config::resolve_path(&config.journal_path))?;
    let store = CodeStore::new(
        config::resolve_path(&config.source_path),
        config::resolve_path(&config.backup_dir),
    );
    let gateway = ProviderGateway::from_config(config).context("Failed to build provider gateway")?;

    journal.record(
        Category::Initialization,
        &format!(
            "{} v{} supervising {} ({} provider(s))",
            config.name,
            config.version,
            store.source_path().display(),
            gateway.len()
        ),
    );

    Ok(Runtime {
        store,
        gateway,
        journal,
    })
}

/// Run the supervised mutation loop.
///
/// Returns only on a terminal condition: a fatal cycle error, the
/// configured give-up policy firing, or a failed exec. A successful commit
/// ends in `rebirth`, which does not return.
pub async fn run_supervisor(config: &AgentConfig, directive: Option<String>) -> Result<()> {
    let runtime = build_runtime(config)?;
    let directive = directive.or_else(|| config.directive.clone());
    let engine = MutationEngine::new(&runtime.store, &runtime.gateway, &runtime.journal, config);

    let mut consecutive_failures: u32 = 0;

    loop {
        match engine.run_cycle(directive.as_deref()).await {
            Ok(record) => match record.outcome {
                CycleOutcome::Committed => {
                    // Clean handoff: no store or gateway calls past this point.
                    return rebirth(config, &runtime.journal);
                }
                CycleOutcome::Rejected | CycleOutcome::ProviderExhausted => {
                    consecutive_failures += 1;
                    info!(
                        "cycle ended without commit ({:?}); {} consecutive",
                        record.outcome, consecutive_failures
                    );
                }
            },
            Err(e) if e.is_fatal() => {
                error!("fatal cycle error: {:#}", e);
                return Err(e).context("mutation cycle requires manual intervention");
            }
            Err(e) => {
                warn!("cycle failed: {:#}", e);
                consecutive_failures += 1;
            }
        }

        match next_action(config, consecutive_failures) {
            RetryAction::Terminate => {
                runtime.journal.record(
                    Category::Error,
                    &format!(
                        "{} consecutive failed cycles; terminating",
                        consecutive_failures
                    ),
                );
                anyhow::bail!("{} consecutive failed cycles", consecutive_failures);
            }
            RetryAction::Wait(delay) => {
                if consecutive_failures >= config.max_consecutive_failures {
                    consecutive_failures = 0;
                }
                info!("next cycle in {}s", delay.as_secs());
                sleep(delay).await;
            }
        }
    }
}

/// Run exactly one cycle and return its record, without re-exec. Activation
/// of a committed image is left to an external process manager.
pub async fn run_once(config: &AgentConfig, directive: Option<String>) -> Result<CycleRecord> {
    let runtime = build_runtime(config)?;
    let directive = directive.or_else(|| config.directive.clone());
    let engine = MutationEngine::new(&runtime.store, &runtime.gateway, &runtime.journal, config);

    let record = engine
        .run_cycle(directive.as_deref())
        .await
        .context("mutation cycle failed")?;

    if record.outcome == CycleOutcome::Committed {
        runtime.journal.record(
            Category::Restart,
            "commit complete; restart deferred to the process manager",
        );
    }

    Ok(record)
}

/// Replace the running process with a fresh instance so the committed image
/// becomes the executing program. Preserves no in-memory state.
///
/// Only returns on failure.
pub fn rebirth(config: &AgentConfig, journal: &Journal) -> Result<()> {
    let (program, args): (String, Vec<String>) = match config.rebirth_command {
        Some(ref cmd) => (cmd[0].clone(), cmd[1..].to_vec()),
        None => {
            let exe = std::env::current_exe().context("Failed to resolve current executable")?;
            (
                exe.to_string_lossy().to_string(),
                std::env::args().skip(1).collect(),
            )
        }
    };

    journal.record(
        Category::Restart,
        &format!("rebirth: exec {} {}", program, args.join(" ")),
    );
    info!("rebirth: exec {} {:?}", program, args);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        let err = std::process::Command::new(&program).args(&args).exec();
        // exec only returns when it failed to replace the process.
        journal.record(Category::Error, &format!("rebirth exec failed: {}", err));
        Err(err).with_context(|| format!("failed to exec '{}'", program))
    }

    #[cfg(not(unix))]
    {
        anyhow::bail!("rebirth requires a Unix host");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::default_config;

    #[test]
    fn test_clean_cycle_waits_full_interval() {
        let config = default_config();
        assert_eq!(
            next_action(&config, 0),
            RetryAction::Wait(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_failed_cycle_backs_off() {
        let config = default_config();
        assert_eq!(
            next_action(&config, 1),
            RetryAction::Wait(Duration::from_secs(10))
        );
        assert_eq!(
            next_action(&config, 4),
            RetryAction::Wait(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_exhaust_action_wait_returns_to_cadence() {
        let config = default_config();
        assert_eq!(
            next_action(&config, 5),
            RetryAction::Wait(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_exhaust_action_terminate() {
        let mut config = default_config();
        config.exhaust_action = ExhaustAction::Terminate;
        assert_eq!(next_action(&config, 5), RetryAction::Terminate);
        assert_eq!(next_action(&config, 4), RetryAction::Wait(Duration::from_secs(10)));
    }
}
