//! Gemini Provider
//!
//! Client for Google's generateContent endpoint. The system prompt rides
//! in `systemInstruction`; an empty candidate list usually means a safety
//! block, which counts as a provider failure and triggers failover.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::types::{Provider, ProviderDescriptor};

pub struct GeminiProvider {
    name: String,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    http: Client,
}

impl GeminiProvider {
    pub fn new(desc: &ProviderDescriptor, timeout: Duration, max_tokens: u32) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            name: desc.name.clone(),
            endpoint: desc.endpoint.trim_end_matches('/').to_string(),
            model: desc.model.clone(),
            api_key: desc.api_key.clone(),
            max_tokens,
            http,
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn identity(&self) -> &str {
        &self.name
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "systemInstruction": {
                "parts": [ { "text": system } ],
            },
            "contents": [
                { "role": "user", "parts": [ { "text": user } ] },
            ],
            "generationConfig": {
                "maxOutputTokens": self.max_tokens,
            },
        });

        let resp = self
            .http
            .post(self.generate_url())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Generation request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("generation error: {}: {}", status.as_u16(), text);
        }

        let data: Value = resp
            .json()
            .await
            .context("Failed to parse generation response")?;

        let parts = data["candidates"]
            .get(0)
            .and_then(|c| c["content"]["parts"].as_array())
            .cloned()
            .unwrap_or_default();

        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            anyhow::bail!(
                "empty or unstructured response from {} (possible safety block)",
                self.name
            );
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;

    #[test]
    fn test_generate_url_includes_model() {
        let p = GeminiProvider::new(
            &ProviderDescriptor {
                name: "gemini".to_string(),
                kind: ProviderKind::Gemini,
                endpoint: "https://generativelanguage.googleapis.com/v1beta/".to_string(),
                model: "gemini-2.0-flash".to_string(),
                api_key: "test".to_string(),
                api_key_env: None,
            },
            Duration::from_secs(5),
            4096,
        )
        .unwrap();

        assert_eq!(
            p.generate_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
