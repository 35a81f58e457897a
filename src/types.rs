//! Metamorph - Type Definitions
//!
//! All shared types for the self-rewriting agent runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ─── Configuration ───────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub name: String,
    /// Path to the live source image this agent rewrites.
    pub source_path: String,
    /// Directory holding rolling backups. Empty means `.backups/` next to
    /// the source image.
    pub backup_dir: String,
    pub max_backups: usize,
    pub journal_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directive: Option<String>,
    pub providers: Vec<ProviderDescriptor>,
    pub provider_timeout_secs: u64,
    pub max_output_tokens: u32,
    /// When true, a candidate that fails syntax validation advances to the
    /// next unconsulted provider within the same cycle.
    pub failover_on_invalid: bool,
    /// Optional pre-commit smoke test. The candidate is written to a scratch
    /// file whose path is appended as the final argument.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoke_command: Option<Vec<String>>,
    pub cycle_interval_secs: u64,
    pub failure_backoff_secs: u64,
    pub max_consecutive_failures: u32,
    pub exhaust_action: ExhaustAction,
    /// Command exec'd on rebirth. Absent means re-exec the current process
    /// with its original arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebirth_command: Option<Vec<String>>,
    pub log_level: LogLevel,
    pub version: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// What the supervisor does once `max_consecutive_failures` is reached.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustAction {
    /// Keep waiting and retrying on the normal cadence.
    Wait,
    /// Exit the process and leave recovery to an external manager.
    Terminate,
}

/// Returns a default (partial) `AgentConfig`. Fields that have no sensible
/// default are set to empty strings so callers can override them.
pub fn default_config() -> AgentConfig {
    AgentConfig {
        name: String::new(),
        source_path: String::new(),
        backup_dir: String::new(),
        max_backups: 3,
        journal_path: "~/.metamorph/journal.log".to_string(),
        directive: None,
        providers: Vec::new(),
        provider_timeout_secs: 60,
        max_output_tokens: 8192,
        failover_on_invalid: false,
        smoke_command: None,
        cycle_interval_secs: 60,
        failure_backoff_secs: 10,
        max_consecutive_failures: 5,
        exhaust_action: ExhaustAction::Wait,
        rebirth_command: None,
        log_level: LogLevel::Info,
        version: "0.1.0".to_string(),
    }
}

// ─── Providers ───────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat-completions endpoint (OpenRouter, Z.AI, ...).
    Openai,
    /// Google Gemini generateContent endpoint.
    Gemini,
}

/// One entry in the ordered failover list.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub name: String,
    pub kind: ProviderKind,
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    /// Environment variable consulted when `api_key` is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// An external code-generation backend. Stateless between calls: the prompt
/// carries all context.
#[async_trait]
pub trait Provider: Send + Sync {
    fn identity(&self) -> &str;

    /// Request a completion. Any transport error, non-success status,
    /// timeout, or malformed/empty body is an `Err`.
    async fn generate(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

/// A raw answer from the gateway, with provenance attached.
#[derive(Debug)]
pub struct Consultation {
    pub body: String,
    /// Identity of the provider that answered.
    pub provider: String,
    /// Index of that provider in the failover list.
    pub provider_index: usize,
    /// Providers that failed before one answered, in order.
    pub failures: Vec<ProviderFailure>,
}

#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

// ─── Cycle records ───────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CycleOutcome {
    Committed,
    Rejected,
    ProviderExhausted,
}

/// One journal entry per attempted cycle. Append-only; never read back by
/// the control loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    pub id: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directive: Option<String>,
    /// Identity of the provider whose answer was used, if any answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// "accepted" or the rejection reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
    pub outcome: CycleOutcome,
}
