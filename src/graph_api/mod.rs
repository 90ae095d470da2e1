//! Remote directory access
//!
//! This module provides:
//! - [`Resource`] naming every collection the explorer reads
//! - [`RemoteSource`] trait abstracting paginated collection retrieval
//! - [`GraphClient`] production client (OAuth2 client credentials + `@odata.nextLink` paging)
//! - [`MockSource`] canned responses for tests

mod mock;

pub use mock::MockSource;

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client as ReqwestClient, Url};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::artifacts::{ArtifactKind, Surface};
use crate::config_file::Settings;

pub const STABLE_VERSION: &str = "v1.0";
pub const EXTENDED_VERSION: &str = "beta";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Authentication failed (HTTP {status}): {description}")]
    Auth { status: u16, description: String },
    #[error("No credential available; authenticate before calling the API")]
    NoCredential,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("Unable to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Refresh interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// A remote collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    /// All groups, optionally only those whose display name starts with `prefix`
    Groups { prefix: Option<String> },
    /// Direct members of a group (of every member type)
    GroupMembers { group_id: String },
    /// Every artifact of a kind
    Artifacts(ArtifactKind),
    /// Assignments of a single artifact
    Assignments {
        kind: ArtifactKind,
        artifact_id: String,
    },
}

impl Resource {
    /// API version serving this resource for the given feature set
    #[must_use]
    pub fn api_version(&self, extended: bool) -> &'static str {
        let kind = match self {
            Resource::Groups { .. } | Resource::GroupMembers { .. } => return STABLE_VERSION,
            Resource::Artifacts(kind) | Resource::Assignments { kind, .. } => *kind,
        };
        match kind.surface() {
            Surface::Stable => STABLE_VERSION,
            Surface::Both if extended => EXTENDED_VERSION,
            Surface::Both => STABLE_VERSION,
            Surface::Extended => EXTENDED_VERSION,
        }
    }

    /// Path relative to the version root
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Resource::Groups { .. } => "groups".to_string(),
            Resource::GroupMembers { group_id } => format!("groups/{group_id}/members"),
            Resource::Artifacts(kind) => kind.collection_path().to_string(),
            Resource::Assignments { kind, artifact_id } => {
                format!("{}/{artifact_id}/assignments", kind.collection_path())
            }
        }
    }

    /// OData `$filter` expression, if any
    #[must_use]
    pub fn filter(&self) -> Option<String> {
        match self {
            Resource::Groups {
                prefix: Some(prefix),
            } if !prefix.is_empty() => Some(format!(
                "startswith(displayName,'{}')",
                prefix.replace('\'', "''")
            )),
            _ => None,
        }
    }

    /// Full URL of the first page under `graph_url`
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidUrl` if `graph_url` does not form a valid URL.
    pub fn url(&self, graph_url: &str, extended: bool) -> Result<Url> {
        let raw = format!(
            "{}/{}/{}",
            graph_url.trim_end_matches('/'),
            self.api_version(extended),
            self.path()
        );
        let mut url = Url::parse(&raw).map_err(|e| FetchError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if let Some(filter) = self.filter() {
            url.query_pairs_mut().append_pair("$filter", &filter);
        }
        Ok(url)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Trait for listing remote collections.
///
/// Implementations follow pagination transparently and return the fully
/// materialized collection as raw JSON records. Production code uses
/// [`GraphClient`], tests use [`MockSource`].
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn list(&self, resource: &Resource) -> Result<Vec<Value>>;
}

/// Bearer token obtained from the authority
#[derive(Clone)]
pub struct Credential(String);

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// One page of a collection
#[derive(Debug, Deserialize)]
pub(crate) struct Page {
    #[serde(default)]
    pub value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

pub(crate) fn parse_page(url: &str, body: &str) -> Result<Page> {
    serde_json::from_str(body).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Interpret the authority's token response
pub(crate) fn parse_token(status: u16, body: &str) -> Result<Credential> {
    let token: TokenResponse = serde_json::from_str(body).unwrap_or_default();
    match token.access_token {
        Some(access_token) if (200..300).contains(&status) => Ok(Credential(access_token)),
        _ => Err(FetchError::Auth {
            status,
            description: token
                .error_description
                .or(token.error)
                .unwrap_or_else(|| "no access token in response".to_string()),
        }),
    }
}

/// Production client for the Graph API.
pub struct GraphClient {
    http: ReqwestClient,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority_url: String,
    graph_url: String,
    extended: bool,
    credential: Option<Credential>,
}

impl GraphClient {
    /// Build a client whose every request is bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be constructed.
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = ReqwestClient::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(GraphClient {
            http,
            tenant_id: settings.tenant_id.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            authority_url: settings.authority_url.clone(),
            graph_url: settings.graph_url.clone(),
            extended: settings.extended,
            credential: None,
        })
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// Exchange the client secret for a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Auth` if the authority rejects the credentials, or
    /// `FetchError::Http` on transport failure.
    pub async fn authenticate(&mut self) -> Result<()> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_url.trim_end_matches('/'),
            self.tenant_id
        );
        let scope = format!("{}/.default", self.graph_url.trim_end_matches('/'));
        let form = [
            ("client_id", self.client_id.as_str()),
            ("scope", scope.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];
        debug!("Requesting token from {url}");
        let response = self.http.post(&url).form(&form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        self.credential = Some(parse_token(status, &body)?);
        info!("Authenticated against tenant {}", self.tenant_id);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.credential = None;
    }
}

#[async_trait]
impl RemoteSource for GraphClient {
    async fn list(&self, resource: &Resource) -> Result<Vec<Value>> {
        let Some(Credential(token)) = &self.credential else {
            return Err(FetchError::NoCredential);
        };

        let mut url = resource.url(&self.graph_url, self.extended)?.to_string();
        let mut visited = HashSet::new();
        let mut records = Vec::new();
        let mut pages = 0usize;
        loop {
            let response = self.http.get(&url).bearer_auth(token).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url,
                    status: status.as_u16(),
                });
            }
            let body = response.text().await?;
            let page = parse_page(&url, &body)?;
            pages += 1;
            records.extend(page.value);
            visited.insert(url);
            match page.next_link {
                Some(next) if visited.contains(&next) => {
                    warn!("Stopping at repeated next link for {resource}: {next}");
                    break;
                }
                Some(next) => url = next,
                None => break,
            }
        }
        debug!(
            "Listed {} records from {resource} in {pages} page(s)",
            records.len()
        );
        Ok(records)
    }
}
