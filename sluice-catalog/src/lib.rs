//! Sluice replica catalog client
//!
//! A small, typed HTTP client for a Rucio-style replica catalog. The rest of
//! the workspace only sees the [`ReplicaCatalog`] trait, so services can be
//! exercised against in-memory catalogs.
//!
//! # Example
//!
//! ```no_run
//! use sluice_catalog::CatalogClient;
//! use sluice_core::domain::replica::Did;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CatalogClient::new("https://rucio.example:443").with_token("secret");
//!
//!     let did: Did = "mc:v12-4GeV-1e-inclusive".parse()?;
//!     for file in client.list_replicas(&did).await? {
//!         println!("{}:{} at {:?}", file.scope, file.name, file.rses.keys());
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod dids;
mod replicas;
mod rses;

// Re-export commonly used types
pub use error::{ClientError, Result};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sluice_core::domain::replica::{Did, LogicalFile, RseProtocol};

/// Header carrying the catalog authentication token
const AUTH_TOKEN_HEADER: &str = "X-Rucio-Auth-Token";

/// Operations the pipeline needs from the replica catalog
#[async_trait]
pub trait ReplicaCatalog: Send + Sync {
    /// Lists every logical file of a dataset with its physical copies
    async fn list_replicas(&self, did: &Did) -> Result<Vec<LogicalFile>>;

    /// Fetches the metadata attached to a data identifier
    async fn get_metadata(&self, did: &Did) -> Result<Map<String, Value>>;

    /// Fetches the access protocols of a storage endpoint
    async fn get_protocols(&self, rse: &str) -> Result<Vec<RseProtocol>>;
}

/// HTTP client for the replica catalog REST API
#[derive(Debug, Clone)]
pub struct CatalogClient {
    /// Base URL of the catalog (e.g., "https://rucio.example:443")
    base_url: String,
    /// Authentication token sent with every request
    token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl CatalogClient {
    /// Create a new catalog client
    ///
    /// # Example
    /// ```
    /// use sluice_catalog::CatalogClient;
    ///
    /// let client = CatalogClient::new("https://rucio.example");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new catalog client with a custom HTTP client
    ///
    /// This allows configuring timeouts, client certificates, proxies, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client,
        }
    }

    /// Attach an authentication token to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the base URL of the catalog
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(url))
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(url))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTH_TOKEN_HEADER, token),
            None => request,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and return the response body as text
    ///
    /// A 404 maps to [`ClientError::NotFound`] so callers can tell an unknown
    /// identifier apart from a catalog fault.
    async fn handle_text(&self, response: reqwest::Response, what: &str) -> Result<String> {
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(what.to_string()));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response.text().await?)
    }

    /// Check the status code and deserialize a JSON body
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<T> {
        let body = self.handle_text(response, what).await?;

        serde_json::from_str(&body)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[async_trait]
impl ReplicaCatalog for CatalogClient {
    async fn list_replicas(&self, did: &Did) -> Result<Vec<LogicalFile>> {
        CatalogClient::list_replicas(self, did).await
    }

    async fn get_metadata(&self, did: &Did) -> Result<Map<String, Value>> {
        CatalogClient::get_metadata(self, did).await
    }

    async fn get_protocols(&self, rse: &str) -> Result<Vec<RseProtocol>> {
        CatalogClient::get_protocols(self, rse).await
    }
}
