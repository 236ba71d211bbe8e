//! Directory listing scraping for the ANS file server

use crate::errors::{AnsError, Result};
use crate::models::RemoteEntry;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;

/// Fetches directory pages and turns their anchors into [`RemoteEntry`] values
#[derive(Debug, Clone)]
pub struct RemoteListing {
    client: Client,
}

impl RemoteListing {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// GET `url` and return every anchor href in document order.
    ///
    /// Each call hits the server again; nothing is cached.
    pub async fn fetch_entries(&self, url: &str) -> Result<Vec<RemoteEntry>> {
        debug!("Fetching directory listing from: {}", url);

        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,*/*")
            .send()
            .await
            .map_err(|source| AnsError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnsError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| AnsError::Request {
            url: url.to_string(),
            source,
        })?;

        let entries = parse_entries(&body);
        debug!("Found {} links at {}", entries.len(), url);
        Ok(entries)
    }
}

/// Extract anchor hrefs from an HTML listing page
pub fn parse_entries(html: &str) -> Vec<RemoteEntry> {
    let document = Html::parse_document(html);
    let anchors = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .map(RemoteEntry::from_href)
        .collect()
}
