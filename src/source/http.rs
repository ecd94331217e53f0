//! Plain HTTP(S) plugin downloads.
//!
//! Both backends fetch `<base>/<asset>` with a single GET. [`HttpSource`] serves
//! custom server URLs and expands `${VERSION}`, `${OS}`, `${ARCH}` and `${NAME}`
//! in the base first. [`LegacyHttpSource`] serves the default release bucket.
//! Neither can answer "what is the latest version".

use super::transport::{HttpRequest, HttpTransport};
use super::{Download, PluginSource, asset_name};
use crate::core::IacpmError;
use crate::plugin::{PluginKind, PluginSpec};
use crate::utils::platform::Platform;
use anyhow::Result;
use async_trait::async_trait;
use semver::Version;
use std::sync::Arc;

/// Custom `http://` / `https://` server URL.
pub struct HttpSource {
    url: String,
    kind: PluginKind,
    name: String,
    transport: Arc<dyn HttpTransport>,
}

impl HttpSource {
    pub fn new(url: &str, spec: &PluginSpec, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            url: url.to_string(),
            kind: spec.kind,
            name: spec.bare_name().to_string(),
            transport,
        }
    }

    fn expand(&self, version: &Version, platform: &Platform) -> String {
        self.url
            .replace("${VERSION}", &version.to_string())
            .replace("${OS}", &platform.os)
            .replace("${ARCH}", &platform.arch)
            .replace("${NAME}", &self.name)
    }
}

#[async_trait]
impl PluginSource for HttpSource {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn download(&self, version: &Version, platform: &Platform) -> Result<Download> {
        let base = self.expand(version, platform);
        fetch_asset(self.transport.as_ref(), &base, self.kind, &self.name, version, platform).await
    }

    async fn latest_version(&self) -> Result<Version> {
        Err(latest_unsupported())
    }
}

/// The default release bucket, used after GitHub in the fallback chain.
pub struct LegacyHttpSource {
    base_url: String,
    kind: PluginKind,
    name: String,
    transport: Arc<dyn HttpTransport>,
}

impl LegacyHttpSource {
    pub fn new(base_url: &str, spec: &PluginSpec, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            base_url: base_url.to_string(),
            kind: spec.kind,
            name: spec.bare_name().to_string(),
            transport,
        }
    }
}

#[async_trait]
impl PluginSource for LegacyHttpSource {
    fn url(&self) -> String {
        self.base_url.clone()
    }

    async fn download(&self, version: &Version, platform: &Platform) -> Result<Download> {
        fetch_asset(self.transport.as_ref(), &self.base_url, self.kind, &self.name, version, platform)
            .await
    }

    async fn latest_version(&self) -> Result<Version> {
        Err(latest_unsupported())
    }
}

fn latest_unsupported() -> anyhow::Error {
    IacpmError::Other {
        message: "latest_version is not supported for plugins from http sources".to_string(),
    }
    .into()
}

async fn fetch_asset(
    transport: &dyn HttpTransport,
    base: &str,
    kind: PluginKind,
    name: &str,
    version: &Version,
    platform: &Platform,
) -> Result<Download> {
    let url = format!("{}/{}", base.trim_end_matches('/'), asset_name(kind, name, version, platform));
    let response = transport.get(HttpRequest::get(&url)).await?;

    if response.status == 404 {
        return Err(IacpmError::ArtifactNotFound {
            name: name.to_string(),
            version: version.to_string(),
            os: platform.os.clone(),
            arch: platform.arch.clone(),
        }
        .into());
    }
    let response = response.error_for_status(&url)?;
    let size = response.content_length();
    Ok(Download::tar_gz(response.body, Some(size)))
}
