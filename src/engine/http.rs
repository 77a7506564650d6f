//! HTTP client for the reconstruction engine's REST API.

use async_trait::async_trait;
use reconflow_common::{Artifact, Phase, ProbeResult};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::types::{ModelAnalysis, PhaseParams, ProgressReport, ResetReport, StartResponse};
use super::{EngineApi, TimeoutPolicy};
use crate::errors::EngineError;

/// Engine client bound to one project on one engine instance.
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
    project: String,
    timeouts: TimeoutPolicy,
}

impl HttpEngine {
    /// Create a client for `project` on the engine at `base_url`
    /// (e.g. `http://localhost:5000`).
    pub fn new(base_url: impl Into<String>, project: impl Into<String>, timeouts: TimeoutPolicy) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, project, timeouts)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        project: impl Into<String>,
        timeouts: TimeoutPolicy,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            project: project.into(),
            timeouts,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request under `timeout`, mapping deadline expiry to
    /// [`EngineError::Timeout`].
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<reqwest::Response, EngineError> {
        request
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout {
                        seconds: timeout.as_secs(),
                    }
                } else {
                    EngineError::from(e)
                }
            })
    }

    /// Ensure the response has a success status code.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, EngineError> {
        let response = Self::ensure_success(response).await?;
        response.json::<T>().await.map_err(EngineError::from)
    }
}

#[async_trait]
impl EngineApi for HttpEngine {
    async fn start_phase(
        &self,
        phase: Phase,
        params: &PhaseParams,
    ) -> Result<StartResponse, EngineError> {
        let body = serde_json::json!({
            "project": self.project,
            "params": params,
        });
        let request = self
            .client
            .post(self.url(&format!("/api/phases/{}/start", phase)))
            .json(&body);
        let response = self.send(request, self.timeouts.for_phase(phase)).await?;
        let parsed: StartResponse = Self::parse_response(response).await?;

        tracing::info!(
            %phase,
            session_id = parsed.session_id.as_deref().unwrap_or("-"),
            status = ?parsed.status,
            "Start request answered",
        );
        Ok(parsed)
    }

    async fn progress(&self, session_id: &str, phase: Phase) -> Result<ProgressReport, EngineError> {
        let request = self
            .client
            .get(self.url(&format!("/api/progress/{}", session_id)));
        let response = self.send(request, self.timeouts.for_phase(phase)).await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }
        Self::parse_response(response).await
    }

    async fn probe(&self, artifact: Artifact) -> Result<ProbeResult, EngineError> {
        let request = self
            .client
            .get(self.url(&format!("/api/artifacts/{}", artifact)))
            .query(&[("project", self.project.as_str())]);
        let response = self.send(request, self.timeouts.for_probe()).await?;
        let probe: ProbeResult = Self::parse_response(response).await?;

        tracing::debug!(%artifact, present = probe.present, count = ?probe.count, "Artifact probed");
        Ok(probe)
    }

    async fn analyze_models(&self) -> Result<ModelAnalysis, EngineError> {
        let request = self
            .client
            .get(self.url("/api/models"))
            .query(&[("project", self.project.as_str())]);
        let response = self.send(request, self.timeouts.for_probe()).await?;
        Self::parse_response(response).await
    }

    async fn select_model(&self, model_id: &str) -> Result<(), EngineError> {
        let body = serde_json::json!({
            "project": self.project,
            "modelId": model_id,
        });
        let request = self.client.post(self.url("/api/models/select")).json(&body);
        let response = self.send(request, self.timeouts.for_probe()).await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn reset_project(&self) -> Result<ResetReport, EngineError> {
        let body = serde_json::json!({ "project": self.project });
        let request = self.client.post(self.url("/api/project/reset")).json(&body);
        let response = self.send(request, self.timeouts.for_probe()).await?;
        Self::parse_response(response).await
    }
}
