//! REST batch backend
//!
//! Speaks the abstract submit/status/cancel contract over HTTP:
//! `POST {base}/jobs`, `GET {base}/jobs/{id}`, `DELETE {base}/jobs/{id}`.
//! Intended for scheduler REST frontends; anything that answers these three
//! routes can serve as a backend.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::backend::{BatchBackend, JobRequest, JobState, JobStatus};

/// Timeout for individual backend requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Batch backend speaking JSON over HTTP
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpBackend {
    /// Create a backend against a scheduler REST endpoint
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid backend base URL")?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("gantry/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            auth_token: None,
        })
    }

    /// Bearer token sent with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn jobs_url(&self, job_id: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("backend base URL cannot carry paths"))?;
            segments.pop_if_empty().push("jobs");
            if let Some(id) = job_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    command: &'a str,
    job_name: &'a str,
    resources: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    state: String,
    #[serde(default)]
    reason: Option<String>,
}

fn parse_state(raw: &str) -> Result<JobState> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" | "queued" => Ok(JobState::Pending),
        "submitted" => Ok(JobState::Submitted),
        "running" => Ok(JobState::Running),
        "succeeded" | "completed" => Ok(JobState::Succeeded),
        "failed" => Ok(JobState::Failed),
        "cancelled" | "canceled" => Ok(JobState::Cancelled),
        other => bail!("backend reported unknown job state '{other}'"),
    }
}

#[async_trait]
impl BatchBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, request: &JobRequest) -> Result<String> {
        let body = SubmitBody {
            command: &request.command,
            job_name: &request.job_name,
            resources: &request.resources,
        };
        let response = self
            .authorize(self.client.post(self.jobs_url(None)?))
            .json(&body)
            .send()
            .await
            .context("submit request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            bail!("submit rejected with {status}: {detail}");
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .context("submit response was not valid JSON")?;
        Ok(parsed.job_id)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let response = self
            .authorize(self.client.get(self.jobs_url(Some(job_id))?))
            .send()
            .await
            .context("status request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            bail!("status query for '{job_id}' returned {status}");
        }

        let parsed: StatusResponse = response
            .json()
            .await
            .context("status response was not valid JSON")?;
        let state = parse_state(&parsed.state)?;
        Ok(JobStatus {
            state,
            reason: parsed.reason,
        })
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        let response = self
            .authorize(self.client.delete(self.jobs_url(Some(job_id))?))
            .send()
            .await
            .context("cancel request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            bail!("cancel of '{job_id}' returned {status}");
        }
        Ok(())
    }
}
