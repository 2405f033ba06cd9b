use std::time::Duration;

use dotalytics_core::AppError;
use dotalytics_core::models::{HeroSummary, MatchDetail, MatchSummary};
use dotalytics_core::traits::MatchDataApi;
use reqwest::Client;

use crate::config::OpenDotaConfig;

/// OpenDota API client using reqwest.
///
/// List endpoints fail loudly on any transport or HTTP error; a single
/// match detail degrades to `Ok(None)` so one bad record never stops a
/// batch. Rate limiting is the caller's concern.
#[derive(Clone)]
pub struct OpenDotaClient {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl OpenDotaClient {
    pub fn new(config: &OpenDotaConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("dotalytics/0.2")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::HttpError(e.to_string())
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to decode response body: {e}")))
    }
}

impl MatchDataApi for OpenDotaClient {
    async fn get_heroes(&self) -> Result<Vec<HeroSummary>, AppError> {
        let heroes: Vec<HeroSummary> = self.get_json("/api/heroStats").await?;
        tracing::debug!(count = heroes.len(), "Fetched hero catalog");
        Ok(heroes)
    }

    async fn get_recent_matches(&self, limit: usize) -> Result<Vec<MatchSummary>, AppError> {
        let mut matches: Vec<MatchSummary> = self.get_json("/api/proMatches").await?;
        matches.truncate(limit);
        tracing::debug!(count = matches.len(), "Fetched recent matches");
        Ok(matches)
    }

    async fn get_match_detail(&self, match_id: i64) -> Result<Option<MatchDetail>, AppError> {
        let path = format!("/api/matches/{match_id}");
        match self.get_json::<MatchDetail>(&path).await {
            Ok(detail) => Ok(Some(detail)),
            Err(e) => {
                // One unfetchable match must not sink the whole batch.
                tracing::warn!(%match_id, error = %e, "Match detail unavailable");
                Ok(None)
            }
        }
    }
}
