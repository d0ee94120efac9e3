//! Client for the compute API's zone and region listings.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{HttpClient, ServiceEndpoint};
use crate::errors::{JobflowError, Result};
use crate::resources::{LocationKind, LocationLister};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationPage {
    #[serde(default)]
    items: Vec<LocationItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationItem {
    name: String,
}

/// Lists zones and regions, following pagination.
#[derive(Debug, Clone)]
pub struct ComputeClient {
    http: HttpClient,
}

impl ComputeClient {
    /// Creates a client for `endpoint`.
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(endpoint)?,
        })
    }
}

#[async_trait]
impl LocationLister for ComputeClient {
    async fn list(&self, project: &str, kind: LocationKind) -> std::result::Result<Vec<String>, JobflowError> {
        let path = format!("compute/v1/projects/{project}/{kind}");
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let query: Vec<(&str, &str)> = page_token
                .as_deref()
                .map(|token| vec![("pageToken", token)])
                .unwrap_or_default();
            let page: LocationPage = self.http.get(&path, &query).await?;
            names.extend(page.items.into_iter().map(|item| item.name));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(%kind, project, count = names.len(), "Listed locations");
        Ok(names)
    }
}
