//! OpenAI-Compatible Provider
//!
//! Chat-completions client for any OpenAI-shaped endpoint (OpenRouter,
//! Z.AI, and friends). One request per consultation, bounded by the
//! gateway-wide timeout.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::types::{Provider, ProviderDescriptor};

pub struct OpenAiProvider {
    name: String,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    http: Client,
}

impl OpenAiProvider {
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

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn identity(&self) -> &str {
        &self.name
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        let resp = self
            .http
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("Completion request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("completion error: {}: {}", status.as_u16(), text);
        }

        let data: Value = resp
            .json()
            .await
            .context("Failed to parse completion response")?;

        let content = data["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("")
            .to_string();

        if content.is_empty() {
            anyhow::bail!("empty completion from {}", self.name);
        }

        Ok(content)
    }
}
