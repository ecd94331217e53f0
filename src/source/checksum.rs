//! SHA-256 verification of downloaded plugin archives.

use super::{Download, PluginSource};
use crate::core::IacpmError;
use crate::utils::platform::Platform;
use anyhow::Result;
use async_trait::async_trait;
use semver::Version;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Wraps a source and checks each download against the expected digest for
/// its platform. Platforms without an entry are not checked.
pub struct ChecksumSource {
    inner: Box<dyn PluginSource>,
    name: String,
    checksums: BTreeMap<String, String>,
}

impl ChecksumSource {
    pub fn new(
        inner: Box<dyn PluginSource>,
        name: impl Into<String>,
        checksums: BTreeMap<String, String>,
    ) -> Self {
        Self {
            inner,
            name: name.into(),
            checksums,
        }
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl PluginSource for ChecksumSource {
    fn url(&self) -> String {
        self.inner.url()
    }

    async fn download(&self, version: &Version, platform: &Platform) -> Result<Download> {
        let download = self.inner.download(version, platform).await?;

        if let Some(expected) = self.checksums.get(&platform.key()) {
            let actual = sha256_hex(&download.bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(IacpmError::ChecksumMismatch {
                    name: self.name.clone(),
                    expected: expected.clone(),
                    actual,
                }
                .into());
            }
            tracing::debug!(plugin = %self.name, platform = %platform, "Checksum verified");
        }
        Ok(download)
    }

    async fn latest_version(&self) -> Result<Version> {
        self.inner.latest_version().await
    }
}
