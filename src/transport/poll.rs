//! HTTP client for the tracker's REST endpoints.
//!
//! Used for the fallback poll (`GET {api}/status`) whenever the push channel
//! is down, and for the one-shot component load (`GET {api}/components`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{PartialStatus, ProgressData};

/// User agent for API requests
const USER_AGENT: &str = concat!("migration-status/", env!("CARGO_PKG_VERSION"));

/// Errors from the REST endpoints. Always recoverable: the update is dropped.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

/// One entry of `GET /components`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentListing {
    pub name: String,
    #[serde(flatten)]
    pub status: PartialStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

#[derive(Deserialize)]
struct ComponentsResponse {
    components: Vec<ComponentListing>,
}

/// Convert a component listing into a snapshot keyed by name
pub fn components_snapshot(listing: Vec<ComponentListing>) -> BTreeMap<String, PartialStatus> {
    listing.into_iter().map(|c| (c.name, c.status)).collect()
}

/// Tracker REST client
#[derive(Clone)]
pub struct StatusClient {
    client: reqwest::Client,
    api_url: String,
}

impl StatusClient {
    /// Create a client for the given API base (e.g. `http://localhost:8080/api`)
    pub fn new(api_url: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.api_url, path);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status(),
            });
        }

        Ok(response.json().await?)
    }

    /// Fetch overall progress
    pub async fn fetch_status(&self) -> Result<ProgressData, FetchError> {
        self.get_json("status").await
    }

    /// Fetch the list of tracked components
    pub async fn fetch_components(&self) -> Result<Vec<ComponentListing>, FetchError> {
        let response: ComponentsResponse = self.get_json("components").await?;
        tracing::info!("Loaded {} components from {}", response.components.len(), self.api_url);
        Ok(response.components)
    }
}
