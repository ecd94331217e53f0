//! Plugin downloads from GitLab release packages.
//!
//! `gitlab://<host>/<project-id>`. Assets are expected as release package links
//! named after the asset file, so they are reachable under
//! `/api/v4/projects/<id>/releases/v<version>/downloads/<asset>`.

use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use super::{Download, PluginSource, asset_name, split_source_url};
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
}

pub struct GitLabSource {
    url: String,
    host: String,
    project: String,
    kind: PluginKind,
    name: String,
    token: Option<String>,
    transport: Arc<dyn HttpTransport>,
}

impl GitLabSource {
    pub fn new(
        url: &str,
        spec: &PluginSpec,
        transport: Arc<dyn HttpTransport>,
        token: Option<String>,
    ) -> Result<Self> {
        let (host, segments) = split_source_url(url, "gitlab")?;
        if segments.is_empty() {
            return Err(IacpmError::InvalidPluginSpec {
                reason: format!("expected gitlab://<host>/<project-id>, got '{url}'"),
            }
            .into());
        }

        Ok(Self {
            url: url.to_string(),
            host: host.to_string(),
            project: segments.join("/"),
            kind: spec.kind,
            name: spec.bare_name().to_string(),
            token: token.filter(|t| !t.is_empty()),
            transport,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("https://{}/api/v4/projects/{}/{path}", self.host, self.project)
    }

    fn request(&self, url: &str, accept: &str) -> HttpRequest {
        let request = HttpRequest::get(url).header("Accept", accept);
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    fn check(&self, response: HttpResponse, url: &str, not_found: IacpmError) -> Result<HttpResponse> {
        match response.status {
            401 => Err(IacpmError::Unauthorized {
                url: url.to_string(),
            }
            .into()),
            404 => Err(not_found.into()),
            _ => response.error_for_status(url),
        }
    }
}

#[async_trait]
impl PluginSource for GitLabSource {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn download(&self, version: &Version, platform: &Platform) -> Result<Download> {
        let asset = asset_name(self.kind, &self.name, version, platform);
        let url = self.api_url(&format!("releases/v{version}/downloads/{asset}"));
        let response = self.transport.get(self.request(&url, "application/octet-stream")).await?;

        let not_found = IacpmError::ArtifactNotFound {
            name: self.name.clone(),
            version: version.to_string(),
            os: platform.os.clone(),
            arch: platform.arch.clone(),
        };
        let response = self.check(response, &url, not_found)?;
        let size = response.content_length();
        Ok(Download::tar_gz(response.body, Some(size)))
    }

    async fn latest_version(&self) -> Result<Version> {
        let url = self.api_url("releases/permalink/latest");
        let response = self.transport.get(self.request(&url, "application/json")).await?;

        let not_found = IacpmError::PluginNotFound {
            kind: self.kind.to_string(),
            name: self.name.clone(),
            version: None,
        };
        let release: Release = self.check(response, &url, not_found)?.json(&url)?;
        let tag = release.tag_name.ok_or_else(|| IacpmError::VersionAnnotationMissing {
            reference: url.clone(),
        })?;
        parse_version_tolerant(&tag)
    }
}
