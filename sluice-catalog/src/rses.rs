//! Storage endpoint (RSE) endpoints

use serde::Deserialize;
use sluice_core::domain::replica::RseProtocol;

use crate::CatalogClient;
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct ProtocolsResponse {
    #[serde(default)]
    protocols: Vec<RseProtocol>,
}

impl CatalogClient {
    /// Get the access protocols of a storage endpoint
    ///
    /// # Arguments
    /// * `rse` - The storage endpoint name
    ///
    /// # Returns
    /// Protocols in the catalog's preference order
    pub async fn get_protocols(&self, rse: &str) -> Result<Vec<RseProtocol>> {
        let url = format!("{}/rses/{}/protocols", self.base_url, rse);
        let response = self.get(&url).send().await?;

        let info: ProtocolsResponse = self.handle_response(response, rse).await?;
        Ok(info.protocols)
    }
}
