//! Secret resolution for the gateway.
//!
//! With `BWS_ACCESS_TOKEN` set, secrets are read from Bitwarden Secrets
//! Manager; otherwise (or when Bitwarden fails) from a plain environment
//! variable, which keeps local development account-free.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::warn;

pub struct SecretsClient {
    access_token: Option<String>,
    api_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct BwsSecretResponse {
    value: String,
}

impl SecretsClient {
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("BWS_ACCESS_TOKEN").ok(),
            std::env::var("BWS_API_URL").unwrap_or_else(|_| "https://api.bitwarden.com".to_string()),
        )
    }

    pub fn new(access_token: Option<String>, api_url: String) -> Self {
        Self {
            access_token,
            api_url,
            http: reqwest::Client::new(),
        }
    }

    /// Bitwarden secret `secret_id`, else environment variable `env_fallback`.
    pub async fn resolve(&self, secret_id: &str, env_fallback: &str) -> Result<String> {
        if let Some(token) = &self.access_token {
            match self.fetch(token, secret_id).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(secret_id, error = %e, "Bitwarden lookup failed, using env var");
                }
            }
        }

        std::env::var(env_fallback).with_context(|| {
            format!("secret '{secret_id}' unavailable and env var '{env_fallback}' is not set")
        })
    }

    async fn fetch(&self, token: &str, secret_id: &str) -> Result<String> {
        let url = format!("{}/secrets/{}", self.api_url, secret_id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("request to Bitwarden Secrets Manager failed")?;

        if !resp.status().is_success() {
            return Err(anyhow!("Bitwarden API returned status {}", resp.status()));
        }

        let body: BwsSecretResponse = resp.json().await.context("bad Bitwarden response body")?;
        Ok(body.value)
    }
}

/// The PostgreSQL URL of the insights database.
pub async fn database_url() -> Result<String> {
    let secret_id = std::env::var("BWS_DATABASE_URL_ID")
        .unwrap_or_else(|_| "insights-database-url".to_string());
    SecretsClient::from_env()
        .resolve(&secret_id, "DATABASE_URL")
        .await
}
