//! Try one source, then another when the first does not have the plugin.

use super::{Download, PluginSource};
use crate::core::IacpmError;
use crate::utils::platform::Platform;
use anyhow::Result;
use async_trait::async_trait;
use semver::Version;

/// Consults `secondary` only when `primary` reports the plugin or artifact as
/// absent. Transport, auth and rate-limit failures are returned as is.
pub struct FallbackSource {
    primary: Box<dyn PluginSource>,
    secondary: Box<dyn PluginSource>,
}

impl FallbackSource {
    pub fn new(primary: Box<dyn PluginSource>, secondary: Box<dyn PluginSource>) -> Self {
        Self {
            primary,
            secondary,
        }
    }
}

fn is_absent(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<IacpmError>(),
        Some(IacpmError::PluginNotFound { .. } | IacpmError::ArtifactNotFound { .. })
    )
}

#[async_trait]
impl PluginSource for FallbackSource {
    fn url(&self) -> String {
        self.primary.url()
    }

    async fn download(&self, version: &Version, platform: &Platform) -> Result<Download> {
        match self.primary.download(version, platform).await {
            Err(e) if is_absent(&e) => {
                tracing::debug!(
                    primary = %self.primary.url(),
                    secondary = %self.secondary.url(),
                    error = %e,
                    "Plugin not found at primary source, trying fallback"
                );
                self.secondary.download(version, platform).await
            }
            other => other,
        }
    }

    async fn latest_version(&self) -> Result<Version> {
        match self.primary.latest_version().await {
            Err(e) if is_absent(&e) => self.secondary.latest_version().await,
            other => other,
        }
    }
}
