//! Dataset catalog listing.
//!
//! Read-only companion to the ingestion client: lists the Analytics datasets
//! visible to the current user so callers can pick or verify upload targets.

use std::sync::Arc;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::error::UploadError;
use crate::salesforce::{error_from_response, API_VERSION};

/// One dataset from the Analytics catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub dataset_type: Option<String>,
    #[serde(default)]
    pub current_version_id: Option<String>,
    #[serde(default)]
    pub created_by: Option<DatasetAuthor>,
}

/// Owner reference embedded in a dataset record.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetAuthor {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatasetListResponse {
    #[serde(default)]
    datasets: Vec<DatasetSummary>,
}

/// Client for the dataset catalog endpoint.
#[derive(Clone)]
pub struct DatasetCatalogClient {
    client: Arc<Client>,
    base_url: Url,
    access_token: SecretString,
}

impl DatasetCatalogClient {
    /// Creates a new catalog client.
    pub fn new(client: Arc<Client>, base_url: Url, access_token: SecretString) -> Self {
        Self {
            client,
            base_url,
            access_token,
        }
    }

    /// Lists the datasets visible to the current user.
    ///
    /// # Errors
    ///
    /// - `UploadError::Api` - API error
    /// - `UploadError::ConnectionFailed` - Network error
    /// - `UploadError::Parse` - Malformed response body
    pub async fn list_datasets(&self) -> Result<Vec<DatasetSummary>, UploadError> {
        let path = format!("/services/data/{}/wave/datasets", API_VERSION);
        let url = self
            .base_url
            .join(&path)
            .map_err(|e| UploadError::Internal(format!("failed to build datasets URL: {}", e)))?;

        info!("[WAVE] GET /wave/datasets");

        let response = self
            .client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| UploadError::ConnectionFailed(format!("dataset list failed: {}", e)))?;

        let status = response.status();
        info!("[WAVE] GET /wave/datasets -> {}", status.as_u16());

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let list: DatasetListResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Parse(format!("dataset list response: {}", e)))?;

        Ok(list.datasets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_client(mock_url: &str) -> DatasetCatalogClient {
        let client = Arc::new(Client::new());
        let base_url = Url::parse(mock_url).unwrap();
        DatasetCatalogClient::new(client, base_url, SecretString::new("test_token".into()))
    }

    #[tokio::test]
    async fn lists_datasets_with_typed_fields() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        let response_body = serde_json::json!({
            "datasets": [
                {
                    "id": "0Fb5e000000DataCAS",
                    "name": "opportunities",
                    "datasetType": "default",
                    "currentVersionId": "0Fc5e000000VersCAS",
                    "createdBy": { "name": "Integration User" }
                },
                {
                    "id": "0Fb5e000000Dat2CAS",
                    "name": "accounts"
                }
            ],
            "totalSize": 2
        });

        Mock::given(method("GET"))
            .and(path(format!("/services/data/{}/wave/datasets", API_VERSION)))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let datasets = client.list_datasets().await.unwrap();

        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].name, "opportunities");
        assert_eq!(datasets[0].dataset_type.as_deref(), Some("default"));
        assert_eq!(
            datasets[0].created_by.as_ref().and_then(|c| c.name.as_deref()),
            Some("Integration User")
        );
        assert!(datasets[1].current_version_id.is_none());
    }

    #[tokio::test]
    async fn empty_catalog_is_empty_vec() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path(format!("/services/data/{}/wave/datasets", API_VERSION)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&mock_server)
            .await;

        assert!(client.list_datasets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_success_surfaces_api_error() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path(format!("/services/data/{}/wave/datasets", API_VERSION)))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            client.list_datasets().await.unwrap_err(),
            UploadError::Api(_)
        ));
    }
}
