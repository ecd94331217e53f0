//! Plugin downloads from an OCI-distribution style content registry.
//!
//! `registry://<host>[/<namespace>]`. A plugin `name` (or `namespace/name`)
//! lives in repository `<namespace>/<kind>-<name>`:
//!
//! - the version tag's manifest is the plugin's root artifact;
//! - per-platform binaries are attached to it as referrers annotated with
//!   `dev.iacpm.plugin=true`, `dev.iacpm.os` and `dev.iacpm.arch`;
//! - the mutable `latest` tag carries the package version in
//!   `org.opencontainers.image.version`.
//!
//! Binaries are fetched by content digest.

use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use super::{Download, PluginSource, split_source_url};
use crate::constants::DEFAULT_REGISTRY_NAMESPACE;
use crate::core::IacpmError;
use crate::plugin::{PluginKind, PluginSpec, parse_version_tolerant};
use crate::utils::platform::Platform;
use anyhow::Result;
use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

pub const PLUGIN_ANNOTATION: &str = "dev.iacpm.plugin";
pub const OS_ANNOTATION: &str = "dev.iacpm.os";
pub const ARCH_ANNOTATION: &str = "dev.iacpm.arch";
pub const VERSION_ANNOTATION: &str = "org.opencontainers.image.version";

const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
const INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    annotations: HashMap<String, String>,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct Index {
    #[serde(default)]
    manifests: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    digest: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    annotations: HashMap<String, String>,
}

impl Descriptor {
    fn is_plugin_for(&self, platform: &Platform) -> bool {
        let get = |key: &str| self.annotations.get(key).map(String::as_str);
        get(PLUGIN_ANNOTATION) == Some("true")
            && get(OS_ANNOTATION) == Some(platform.os.as_str())
            && get(ARCH_ANNOTATION) == Some(platform.arch.as_str())
    }
}

pub struct RegistrySource {
    url: String,
    host: String,
    repository: String,
    kind: PluginKind,
    name: String,
    transport: Arc<dyn HttpTransport>,
}

impl RegistrySource {
    pub fn new(url: &str, spec: &PluginSpec, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let (host, segments) = split_source_url(url, "registry")?;

        // A namespace in the plugin name wins over the one in the URL
        let namespace = match spec.name.rsplit_once('/') {
            Some((namespace, _)) => namespace.to_string(),
            None if segments.is_empty() => DEFAULT_REGISTRY_NAMESPACE.to_string(),
            None => segments.join("/"),
        };
        let name = spec.bare_name().to_string();

        Ok(Self {
            url: url.to_string(),
            host: host.to_string(),
            repository: format!("{namespace}/{}-{name}", spec.kind),
            kind: spec.kind,
            name,
            transport,
        })
    }

    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn endpoint(&self, path: &str) -> String {
        format!("https://{}/v2/{}/{path}", self.host, self.repository)
    }

    async fn get(&self, url: &str, accept: &str) -> Result<HttpResponse> {
        self.transport.get(HttpRequest::get(url).header("Accept", accept)).await
    }

    fn check(response: HttpResponse, url: &str, not_found: impl FnOnce() -> IacpmError) -> Result<HttpResponse> {
        match response.status {
            401 => Err(IacpmError::Unauthorized {
                url: url.to_string(),
            }
            .into()),
            404 => Err(not_found().into()),
            _ => response.error_for_status(url),
        }
    }

    fn plugin_not_found(&self, version: Option<&Version>) -> IacpmError {
        IacpmError::PluginNotFound {
            kind: self.kind.to_string(),
            name: self.name.clone(),
            version: version.map(ToString::to_string),
        }
    }

    fn artifact_not_found(&self, version: &Version, platform: &Platform) -> IacpmError {
        IacpmError::ArtifactNotFound {
            name: self.name.clone(),
            version: version.to_string(),
            os: platform.os.clone(),
            arch: platform.arch.clone(),
        }
    }
}

#[async_trait]
impl PluginSource for RegistrySource {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn download(&self, version: &Version, platform: &Platform) -> Result<Download> {
        // Tags cannot contain '+', registries conventionally use '_'
        let tag = version.to_string().replace('+', "_");
        let tag_url = self.endpoint(&format!("manifests/{tag}"));
        let response = self.get(&tag_url, MANIFEST_MEDIA_TYPE).await?;
        let response = Self::check(response, &tag_url, || self.plugin_not_found(Some(version)))?;
        let root_digest = match response.header("docker-content-digest") {
            Some(digest) => digest.to_string(),
            None => format!("sha256:{}", hex::encode(Sha256::digest(&response.body))),
        };

        let referrers_url = self.endpoint(&format!("referrers/{root_digest}"));
        let response = self.get(&referrers_url, INDEX_MEDIA_TYPE).await?;
        let index: Index =
            Self::check(response, &referrers_url, || self.artifact_not_found(version, platform))?
                .json(&referrers_url)?;
        let artifact = index
            .manifests
            .iter()
            .find(|d| d.is_plugin_for(platform))
            .ok_or_else(|| self.artifact_not_found(version, platform))?;
        tracing::debug!(repository = %self.repository, digest = %artifact.digest, "Found plugin artifact");

        let manifest_url = self.endpoint(&format!("manifests/{}", artifact.digest));
        let response = self.get(&manifest_url, MANIFEST_MEDIA_TYPE).await?;
        let manifest: Manifest =
            Self::check(response, &manifest_url, || self.artifact_not_found(version, platform))?
                .json(&manifest_url)?;
        let layer = manifest
            .layers
            .first()
            .ok_or_else(|| self.artifact_not_found(version, platform))?;

        let blob_url = self.endpoint(&format!("blobs/{}", layer.digest));
        let response = self.get(&blob_url, "application/octet-stream").await?;
        let response =
            Self::check(response, &blob_url, || self.artifact_not_found(version, platform))?;
        let size = layer.size.unwrap_or_else(|| response.content_length());
        Ok(Download::tar_gz(response.body, Some(size)))
    }

    async fn latest_version(&self) -> Result<Version> {
        let url = self.endpoint("manifests/latest");
        let response = self.get(&url, MANIFEST_MEDIA_TYPE).await?;
        let manifest: Manifest =
            Self::check(response, &url, || self.plugin_not_found(None))?.json(&url)?;

        let value = manifest.annotations.get(VERSION_ANNOTATION).ok_or_else(|| {
            IacpmError::VersionAnnotationMissing {
                reference: format!("{}:latest", self.repository),
            }
        })?;
        parse_version_tolerant(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ErrorKind, error_kind};
    use crate::test_utils::FakeTransport;

    const BASE: &str = "https://registry.iacpm.dev/v2/iacpm/resource-aws";

    fn spec() -> PluginSpec {
        PluginSpec::new(PluginKind::Resource, "aws", Some(Version::new(6, 0, 0)))
    }

    fn linux() -> Platform {
        Platform::from_rust("linux", "x86_64").unwrap()
    }

    fn seed_release(transport: &FakeTransport) {
        transport.respond(
            &format!("{BASE}/manifests/6.0.0"),
            HttpResponse::new(200, "{}").with_header("Docker-Content-Digest", "sha256:root"),
        );
        transport.respond(
            &format!("{BASE}/referrers/sha256:root"),
            HttpResponse::new(
                200,
                r#"{"manifests": [
                    {"digest": "sha256:sig", "annotations": {"dev.iacpm.signature": "true"}},
                    {"digest": "sha256:darwin", "annotations": {"dev.iacpm.plugin": "true", "dev.iacpm.os": "darwin", "dev.iacpm.arch": "arm64"}},
                    {"digest": "sha256:linux", "annotations": {"dev.iacpm.plugin": "true", "dev.iacpm.os": "linux", "dev.iacpm.arch": "amd64"}}
                ]}"#,
            ),
        );
        transport.respond(
            &format!("{BASE}/manifests/sha256:linux"),
            HttpResponse::new(200, r#"{"layers": [{"digest": "sha256:blob", "size": 4}]}"#),
        );
        transport.respond(&format!("{BASE}/blobs/sha256:blob"), HttpResponse::new(200, vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_repository_naming() {
        let transport = Arc::new(FakeTransport::new());
        let source = RegistrySource::new("registry://registry.iacpm.dev", &spec(), transport.clone()).unwrap();
        assert_eq!(source.repository(), "iacpm/resource-aws");

        let source =
            RegistrySource::new("registry://registry.iacpm.dev/corp", &spec(), transport.clone()).unwrap();
        assert_eq!(source.repository(), "corp/resource-aws");

        let namespaced = PluginSpec::new(PluginKind::Resource, "acme/widgets", None);
        let source =
            RegistrySource::new("registry://registry.iacpm.dev/corp", &namespaced, transport).unwrap();
        assert_eq!(source.repository(), "acme/resource-widgets");
    }

    #[tokio::test]
    async fn test_download_by_digest() {
        let transport = Arc::new(FakeTransport::new());
        seed_release(&transport);
        let source = RegistrySource::new("registry://registry.iacpm.dev/iacpm", &spec(), transport.clone()).unwrap();

        let download = source.download(&Version::new(6, 0, 0), &linux()).await.unwrap();
        assert_eq!(download.bytes, vec![1, 2, 3, 4]);
        assert_eq!(download.size, Some(4));
        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test]
    async fn test_no_artifact_for_platform() {
        let transport = Arc::new(FakeTransport::new());
        seed_release(&transport);
        let source = RegistrySource::new("registry://registry.iacpm.dev/iacpm", &spec(), transport).unwrap();

        let windows = Platform::from_rust("windows", "x86_64").unwrap();
        let err = source.download(&Version::new(6, 0, 0), &windows).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<IacpmError>(), Some(IacpmError::ArtifactNotFound { .. })));
    }

    #[tokio::test]
    async fn test_unknown_version_is_plugin_not_found() {
        let transport = Arc::new(FakeTransport::new());
        let source = RegistrySource::new("registry://registry.iacpm.dev/iacpm", &spec(), transport).unwrap();
        let err = source.download(&Version::new(9, 9, 9), &linux()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<IacpmError>(), Some(IacpmError::PluginNotFound { .. })));
    }

    #[tokio::test]
    async fn test_latest_version_annotation() {
        let transport = Arc::new(FakeTransport::new());
        let source =
            RegistrySource::new("registry://registry.iacpm.dev/iacpm", &spec(), transport.clone()).unwrap();
        let url = format!("{BASE}/manifests/latest");

        transport.respond(
            &url,
            HttpResponse::new(200, r#"{"annotations": {"org.opencontainers.image.version": "6.2.0"}}"#),
        );
        assert_eq!(source.latest_version().await.unwrap(), Version::new(6, 2, 0));

        transport.respond(&url, HttpResponse::new(200, r#"{"annotations": {}}"#));
        let err = source.latest_version().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IacpmError>(),
            Some(IacpmError::VersionAnnotationMissing { .. })
        ));

        transport.respond(
            &url,
            HttpResponse::new(200, r#"{"annotations": {"org.opencontainers.image.version": "banana"}}"#),
        );
        let err = source.latest_version().await.unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::VersionParse));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_not_found() {
        let transport = Arc::new(FakeTransport::new());
        transport.fail(&format!("{BASE}/manifests/latest"), "connection refused");
        let source = RegistrySource::new("registry://registry.iacpm.dev/iacpm", &spec(), transport).unwrap();
        let err = source.latest_version().await.unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Transport));
    }
}
