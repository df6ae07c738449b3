//! faro-http
//!
//! One `Endpoint` implementation speaking the public randomness-beacon HTTP
//! API: `GET /info` for the chain identity, `GET /public/latest` and
//! `GET /public/{round}` for beacons, JSON with hex-encoded byte fields.
//!
//! The transport has no native push capability; streaming against HTTP-only
//! endpoint sets is provided by the composition layer's schedule-aligned
//! polling.
#![warn(missing_docs)]

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use faro_core::{Beacon, BeaconInfo, Endpoint, FaroError, LATEST_ROUND};

/// One HTTP connection to one remote beacon source.
///
/// Cloning is cheap: the underlying `reqwest::Client` is a shared handle,
/// and the assembler hands the same client to every URL-built endpoint so
/// they share a connection pool.
#[derive(Clone, Debug)]
pub struct HttpEndpoint {
    url: Url,
    http: reqwest::Client,
}

impl HttpEndpoint {
    /// Build an endpoint for `url` with a fresh HTTP client.
    ///
    /// # Errors
    /// `Config` when the URL does not parse.
    pub fn new(url: &str) -> Result<Self, FaroError> {
        Self::with_client(url, reqwest::Client::new())
    }

    /// Build an endpoint for `url` over a shared HTTP client.
    ///
    /// # Errors
    /// `Config` when the URL does not parse.
    pub fn with_client(url: &str, http: reqwest::Client) -> Result<Self, FaroError> {
        let mut parsed = Url::parse(url)
            .map_err(|e| FaroError::config(format!("invalid endpoint url {url}: {e}")))?;
        // Relative joins below need a trailing slash to keep any base path.
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        Ok(Self { url: parsed, http })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FaroError> {
        let url = self
            .url
            .join(path)
            .map_err(|e| FaroError::endpoint(self.url.as_str(), e.to_string()))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FaroError::endpoint(self.url.as_str(), e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FaroError::endpoint(
                self.url.as_str(),
                format!("unexpected status {status}"),
            ));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| FaroError::endpoint(self.url.as_str(), format!("invalid body: {e}")))
    }
}

#[async_trait]
impl Endpoint for HttpEndpoint {
    fn name(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch(&self, round: u64) -> Result<Beacon, FaroError> {
        if round == LATEST_ROUND {
            self.get_json("public/latest").await
        } else {
            self.get_json(&format!("public/{round}")).await
        }
    }

    async fn chain_info(&self) -> Result<BeaconInfo, FaroError> {
        self.get_json("info").await
    }
}
