//! Data identifier metadata endpoint

use serde_json::{Map, Value};
use sluice_core::domain::replica::Did;

use crate::CatalogClient;
use crate::error::Result;

impl CatalogClient {
    /// Get the metadata attached to a data identifier
    ///
    /// # Arguments
    /// * `did` - The file or dataset identifier
    pub async fn get_metadata(&self, did: &Did) -> Result<Map<String, Value>> {
        let url = format!("{}/dids/{}/{}/meta", self.base_url, did.scope, did.name);
        let response = self.get(&url).send().await?;

        self.handle_response(response, &did.to_string()).await
    }
}
