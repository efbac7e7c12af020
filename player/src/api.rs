use std::fmt;
use std::time::Duration;

use log::info;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::interaction::InteractionPoint;

/// Errors that can occur while talking to the interaction API.
#[derive(Debug)]
pub enum ApiError {
    Http(reqwest::Error),
    UnexpectedStatus { status: StatusCode, body: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Http(err) => write!(f, "http error: {err}"),
            ApiError::UnexpectedStatus { status, body } => {
                write!(f, "unexpected status {status}: {body}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        ApiError::Http(value)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveDurationResponse {
    duration: Option<u64>,
    source: String,
}

/// Blocking client for the video endpoints the player needs.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    /// Create a new client targeting the provided base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Active interaction points of a video, ordered by start time.
    pub fn fetch_interactions(&self, video_id: &str) -> Result<Vec<InteractionPoint>, ApiError> {
        let url = format!("{}/videos/{}/interactions", self.base_url, video_id);
        let response = self.http.get(url).send()?;
        Self::parse(response)
    }

    /// Ask the server to resolve the video's duration. `None` when it is still unknown.
    pub fn resolve_duration(&self, video_id: &str) -> Result<Option<u64>, ApiError> {
        let url = format!("{}/videos/{}/duration/resolve", self.base_url, video_id);
        let response = self.http.post(url).send()?;
        let resolved: ResolveDurationResponse = Self::parse(response)?;

        info!(
            "Duration for {} resolved from {}: {:?}",
            video_id, resolved.source, resolved.duration
        );
        Ok(resolved.duration)
    }

    /// Returns the base URL configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        if response.status().is_success() {
            return response.json().map_err(ApiError::from);
        }

        let status = response.status();
        let body = response.text().unwrap_or_default();
        Err(ApiError::UnexpectedStatus { status, body })
    }
}
