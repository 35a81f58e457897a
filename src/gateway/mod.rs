//! Provider Gateway
//!
//! Uniform interface over an ordered list of LLM backends. A consultation
//! walks the failover list once: each provider gets exactly one attempt,
//! failures are logged and carried in the result, and running out of
//! providers is a hard abort for the cycle. No session state is kept
//! between calls.

pub mod gemini;
pub mod openai;

use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::types::{
    AgentConfig, Consultation, Provider, ProviderFailure, ProviderKind,
};

pub struct ProviderGateway {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderGateway {
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// Build the gateway from the configured descriptor list, in order.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.provider_timeout_secs);
        let mut providers: Vec<Box<dyn Provider>> = Vec::new();

        for desc in &config.providers {
            let provider: Box<dyn Provider> = match desc.kind {
                ProviderKind::Openai => Box::new(openai::OpenAiProvider::new(
                    desc,
                    timeout,
                    config.max_output_tokens,
                )?),
                ProviderKind::Gemini => Box::new(gemini::GeminiProvider::new(
                    desc,
                    timeout,
                    config.max_output_tokens,
                )?),
            };
            providers.push(provider);
        }

        Ok(Self::new(providers))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Consult the full failover list from the top.
    pub async fn consult(&self, system: &str, user: &str) -> Result<Consultation, GatewayError> {
        self.consult_from(0, system, user).await
    }

    /// Consult providers starting at `start`, advancing on failure.
    ///
    /// The caller uses a non-zero `start` to continue down the unconsulted
    /// tail of the list within the same cycle; a provider already consulted
    /// this cycle is never consulted again.
    pub async fn consult_from(
        &self,
        start: usize,
        system: &str,
        user: &str,
    ) -> Result<Consultation, GatewayError> {
        if self.providers.is_empty() {
            return Err(GatewayError::NoProviders);
        }

        let mut failures: Vec<ProviderFailure> = Vec::new();

        for (index, provider) in self.providers.iter().enumerate().skip(start) {
            info!("consulting provider: {}", provider.identity());

            match provider.generate(system, user).await {
                Ok(body) => {
                    return Ok(Consultation {
                        body,
                        provider: provider.identity().to_string(),
                        provider_index: index,
                        failures,
                    });
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!("provider '{}' failed: {}", provider.identity(), reason);
                    failures.push(ProviderFailure {
                        provider: provider.identity().to_string(),
                        reason,
                    });
                }
            }
        }

        Err(GatewayError::AllProvidersExhausted {
            attempted: failures.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted provider: fails or answers, counting every attempt.
    struct ScriptedProvider {
        name: String,
        answer: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        fn boxed(name: &str, answer: Option<&str>, calls: Arc<AtomicUsize>) -> Box<dyn Provider> {
            Box::new(Self {
                name: name.to_string(),
                answer: answer.map(|s| s.to_string()),
                calls,
            })
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn identity(&self) -> &str {
            &self.name
        }

        async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Some(body) => Ok(body.clone()),
                None => anyhow::bail!("simulated transport failure"),
            }
        }
    }

    #[tokio::test]
    async fn test_failover_order_and_single_attempt_per_provider() {
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));
        let c_calls = Arc::new(AtomicUsize::new(0));

        let gateway = ProviderGateway::new(vec![
            ScriptedProvider::boxed("a", None, a_calls.clone()),
            ScriptedProvider::boxed("b", None, b_calls.clone()),
            ScriptedProvider::boxed("c", Some("fn main() {}"), c_calls.clone()),
        ]);

        let result = gateway.consult("sys", "user").await.unwrap();

        assert_eq!(result.provider, "c");
        assert_eq!(result.provider_index, 2);
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].provider, "a");
        assert_eq!(result.failures[1].provider, "b");
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_total_exhaustion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway = ProviderGateway::new(vec![
            ScriptedProvider::boxed("a", None, calls.clone()),
            ScriptedProvider::boxed("b", None, calls.clone()),
        ]);

        let err = gateway.consult("sys", "user").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::AllProvidersExhausted { attempted: 2 }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_consult_from_skips_consumed_head() {
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));

        let gateway = ProviderGateway::new(vec![
            ScriptedProvider::boxed("a", Some("ignored"), a_calls.clone()),
            ScriptedProvider::boxed("b", Some("fn main() {}"), b_calls.clone()),
        ]);

        let result = gateway.consult_from(1, "sys", "user").await.unwrap();
        assert_eq!(result.provider, "b");
        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_consult_from_past_end_is_exhaustion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway =
            ProviderGateway::new(vec![ScriptedProvider::boxed("a", Some("x"), calls.clone())]);

        let err = gateway.consult_from(1, "sys", "user").await.unwrap_err();
        assert!(matches!(err, GatewayError::AllProvidersExhausted { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_gateway() {
        let gateway = ProviderGateway::new(Vec::new());
        let err = gateway.consult("sys", "user").await.unwrap_err();
        assert!(matches!(err, GatewayError::NoProviders));
    }
}
