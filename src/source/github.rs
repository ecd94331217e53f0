//! Plugin downloads from GitHub releases.
//!
//! `github://<api-host>/<org>[/<repo>]`; the repository defaults to
//! `iacpm-<name>`. A release is looked up by tag `v<version>` and the asset is
//! fetched through its API URL, which works for private repositories when
//! `GITHUB_TOKEN` is set.

use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use super::{Download, PluginSource, asset_name, split_source_url};
use crate::constants::PLUGIN_BINARY_PREFIX;
use crate::core::IacpmError;
use crate::plugin::{PluginKind, PluginSpec, parse_version_tolerant};
use crate::utils::platform::Platform;
use anyhow::Result;
use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    url: String,
}

pub struct GitHubSource {
    host: String,
    organization: String,
    repository: String,
    kind: PluginKind,
    name: String,
    token: Option<String>,
    transport: Arc<dyn HttpTransport>,
}

impl GitHubSource {
    pub fn new(
        url: &str,
        spec: &PluginSpec,
        transport: Arc<dyn HttpTransport>,
        token: Option<String>,
    ) -> Result<Self> {
        let (host, segments) = split_source_url(url, "github")?;
        let name = spec.bare_name().to_string();
        let (organization, repository) = match segments.as_slice() {
            [org] => ((*org).to_string(), format!("{PLUGIN_BINARY_PREFIX}-{name}")),
            [org, repo] => ((*org).to_string(), (*repo).to_string()),
            _ => {
                return Err(IacpmError::InvalidPluginSpec {
                    reason: format!("expected github://<host>/<org>[/<repo>], got '{url}'"),
                }
                .into());
            }
        };

        Ok(Self {
            host: host.to_string(),
            organization,
            repository,
            kind: spec.kind,
            name,
            token: token.filter(|t| !t.is_empty()),
            transport,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("https://{}/repos/{}/{}/{path}", self.host, self.organization, self.repository)
    }

    fn request(&self, url: &str, accept: &str) -> HttpRequest {
        let request = HttpRequest::get(url).header("Accept", accept);
        match &self.token {
            Some(token) => request.header("Authorization", format!("token {token}")),
            None => request,
        }
    }

    /// Maps GitHub's auth and rate-limit answers onto typed errors.
    fn check(&self, response: HttpResponse, url: &str, version: Option<&Version>) -> Result<HttpResponse> {
        match response.status {
            401 => Err(IacpmError::Unauthorized {
                url: url.to_string(),
            }
            .into()),
            403 if response.header("x-ratelimit-remaining") == Some("0") => {
                Err(IacpmError::RateLimited {
                    url: url.to_string(),
                }
                .into())
            }
            404 => Err(IacpmError::PluginNotFound {
                kind: self.kind.to_string(),
                name: self.name.clone(),
                version: version.map(ToString::to_string),
            }
            .into()),
            _ => response.error_for_status(url),
        }
    }
}

#[async_trait]
impl PluginSource for GitHubSource {
    fn url(&self) -> String {
        format!("github://{}/{}/{}", self.host, self.organization, self.repository)
    }

    async fn download(&self, version: &Version, platform: &Platform) -> Result<Download> {
        let release_url = self.api_url(&format!("releases/tags/v{version}"));
        let response =
            self.transport.get(self.request(&release_url, "application/json")).await?;
        let release: Release = self.check(response, &release_url, Some(version))?.json(&release_url)?;

        let wanted = asset_name(self.kind, &self.name, version, platform);
        let asset = release.assets.iter().find(|a| a.name == wanted).ok_or_else(|| {
            IacpmError::ArtifactNotFound {
                name: self.name.clone(),
                version: version.to_string(),
                os: platform.os.clone(),
                arch: platform.arch.clone(),
            }
        })?;

        tracing::debug!(asset = %asset.name, url = %asset.url, "Downloading release asset");
        let response =
            self.transport.get(self.request(&asset.url, "application/octet-stream")).await?;
        let response = self.check(response, &asset.url, Some(version))?;
        let size = response.content_length();
        Ok(Download::tar_gz(response.body, Some(size)))
    }

    async fn latest_version(&self) -> Result<Version> {
        let url = self.api_url("releases/latest");
        let response = self.transport.get(self.request(&url, "application/json")).await?;
        let release: Release = self.check(response, &url, None)?.json(&url)?;
        let tag = release.tag_name.ok_or_else(|| IacpmError::VersionAnnotationMissing {
            reference: url.clone(),
        })?;
        parse_version_tolerant(&tag)
    }
}
