//! Read-only view of the plugin root.
//!
//! Every query here is a plain directory listing with no locking. An install in
//! progress is invisible until its final rename, and a published directory with
//! a sibling `.partial` sentinel (an interrupted overwrite) is treated as absent.

use super::{InstalledPlugin, PluginKind, PluginMetadata, PluginSpec, parse_version_tolerant};
use crate::utils::fs::dir_size;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use semver::{Version, VersionReq};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static DIR_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<kind>[a-z]+)-(?P<name>[a-zA-Z0-9-]*[a-zA-Z0-9])-v(?P<version>.*)$")
        .expect("plugin directory pattern is a valid regex")
});

static STAGING_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.tmp[0-9a-f]+$").expect("staging suffix pattern is a valid regex")
});

/// Splits `<kind>-<name>-v<version>` into its parts.
///
/// Returns `None` for staging directories, unknown kinds and unparsable versions.
#[must_use]
pub fn parse_dir_name(dir_name: &str) -> Option<(PluginKind, String, Version)> {
    if is_staging_name(dir_name) {
        return None;
    }
    let captures = DIR_NAME_PATTERN.captures(dir_name)?;
    let kind = captures["kind"].parse::<PluginKind>().ok()?;
    let version = parse_version_tolerant(&captures["version"]).ok()?;
    Some((kind, captures["name"].to_string(), version))
}

/// True for `<dir>.tmp<hex>` staging and move-aside directories.
#[must_use]
pub fn is_staging_name(name: &str) -> bool {
    STAGING_SUFFIX.is_match(name)
}

/// `<root>/<dir>.partial`
#[must_use]
pub fn partial_path(root: &Path, dir_name: &str) -> PathBuf {
    root.join(format!("{dir_name}.partial"))
}

/// Lists published plugins below `root`, sorted by kind, name and version.
///
/// A missing root lists as empty. With `skip_metadata` the (recursive) size
/// and timestamps are not collected.
pub fn list_plugins(root: &Path, skip_metadata: bool) -> Result<Vec<InstalledPlugin>> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read plugin directory: {}", root.display()));
        }
    };

    let mut plugins = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to read plugin directory: {}", root.display()))?;
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }

        let dir_name = entry.file_name().to_string_lossy().into_owned();
        let Some(mut plugin) = InstalledPlugin::from_dir_name(root, &dir_name) else {
            tracing::trace!(entry = %dir_name, "Skipping non-plugin directory");
            continue;
        };
        if partial_path(root, &dir_name).exists() {
            tracing::debug!(plugin = %dir_name, "Skipping partially installed plugin");
            continue;
        }

        if !skip_metadata {
            plugin.metadata = Some(collect_metadata(&plugin)?);
        }
        plugins.push(plugin);
    }

    plugins.sort_by(|a, b| (a.kind, &a.name, &a.version).cmp(&(b.kind, &b.name, &b.version)));
    Ok(plugins)
}

fn collect_metadata(plugin: &InstalledPlugin) -> Result<PluginMetadata> {
    let dir = plugin.dir();
    let size_bytes = dir_size(&dir)?;
    let dir_meta = std::fs::metadata(&dir)
        .with_context(|| format!("Failed to stat plugin directory: {}", dir.display()))?;

    let install_time =
        dir_meta.created().or_else(|_| dir_meta.modified()).ok().map(DateTime::<Utc>::from);
    // The binary's access time tracks the last time the plugin was launched
    let last_used_time = std::fs::metadata(plugin.binary_path())
        .and_then(|m| m.accessed())
        .ok()
        .map(DateTime::<Utc>::from);

    Ok(PluginMetadata {
        size_bytes,
        install_time,
        last_used_time,
    })
}

/// Exact-version membership: the directory exists and no `.partial` sentinel does.
pub fn has_plugin(root: &Path, spec: &PluginSpec) -> Result<bool> {
    let version = spec.exact_version()?;
    let dir_name = spec.dir_name(version);
    Ok(root.join(&dir_name).is_dir() && !partial_path(root, &dir_name).exists())
}

/// True if some installed version of the same kind and name is at least the
/// requested one. Pre-release ordering follows semver precedence.
///
/// A spec without a version matches any installed version.
pub fn has_plugin_gte(root: &Path, spec: &PluginSpec) -> Result<bool> {
    let plugins = list_plugins(root, true)?;
    Ok(plugins.iter().any(|p| {
        p.kind == spec.kind
            && p.name == spec.bare_name()
            && spec.version.as_ref().is_none_or(|floor| p.version >= *floor)
    }))
}

/// Highest installed version of `kind`/`name` satisfying `requirement`.
#[must_use]
pub fn select_compatible<'a>(
    plugins: &'a [InstalledPlugin],
    kind: PluginKind,
    name: &str,
    requirement: &VersionReq,
) -> Option<&'a InstalledPlugin> {
    plugins
        .iter()
        .filter(|p| p.kind == kind && p.name == name && requirement.matches(&p.version))
        .max_by(|a, b| a.version.cmp(&b.version))
}

/// Finds the installed plugin to run for `kind`/`name`.
///
/// With a requirement the highest compatible version wins; without one the
/// highest installed version does.
pub fn find_plugin(
    root: &Path,
    kind: PluginKind,
    name: &str,
    requirement: Option<&VersionReq>,
) -> Result<Option<InstalledPlugin>> {
    let plugins = list_plugins(root, true)?;
    let found = match requirement {
        Some(req) => select_compatible(&plugins, kind, name, req),
        None => plugins.iter().filter(|p| p.kind == kind && p.name == name).max_by(|a, b| {
            a.version.cmp(&b.version)
        }),
    };
    Ok(found.cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn install_dir(root: &Path, name: &str) {
        fs::create_dir_all(root.join(name)).unwrap();
    }

    #[test]
    fn test_parse_dir_name() {
        let (kind, name, version) = parse_dir_name("resource-aws-v6.0.0").unwrap();
        assert_eq!(kind, PluginKind::Resource);
        assert_eq!(name, "aws");
        assert_eq!(version, Version::new(6, 0, 0));

        let (_, name, version) = parse_dir_name("resource-azure-native-v2.1.0-alpha.1").unwrap();
        assert_eq!(name, "azure-native");
        assert_eq!(version.to_string(), "2.1.0-alpha.1");

        let (_, _, version) = parse_dir_name("language-go-v1.2").unwrap();
        assert_eq!(version, Version::new(1, 2, 0));
    }

    #[test]
    fn test_parse_dir_name_rejects() {
        assert!(parse_dir_name("provider-aws-v1.0.0").is_none());
        assert!(parse_dir_name("resource-aws").is_none());
        assert!(parse_dir_name("resource-aws-vlatest").is_none());
        assert!(parse_dir_name("resource-aws-v1.0.0.tmp0a1b2c").is_none());
        assert!(parse_dir_name("resource-aws-v1.0.0-beta.tmp0a1b2c").is_none());
        assert!(parse_dir_name("Resource-aws-v1.0.0").is_none());
    }

    #[test]
    fn test_list_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(list_plugins(&temp.path().join("missing"), true).unwrap().is_empty());
    }

    #[test]
    fn test_list_filters_partial_and_staging() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        install_dir(root, "resource-aws-v6.0.0");
        install_dir(root, "resource-aws-v6.1.0");
        fs::write(root.join("resource-aws-v6.1.0.partial"), "").unwrap();
        install_dir(root, "resource-gcp-v7.0.0.tmp3fa9");
        fs::write(root.join("resource-gcp-v7.0.0.lock"), "").unwrap();
        install_dir(root, "not-a-plugin");
        fs::write(root.join("tool-file-v1.0.0"), "a file, not a directory").unwrap();

        let plugins = list_plugins(root, true).unwrap();
        let names: Vec<_> = plugins.iter().map(|p| p.dir_name.as_str()).collect();
        assert_eq!(names, vec!["resource-aws-v6.0.0"]);
        assert!(plugins[0].metadata.is_none());
    }

    #[test]
    fn test_list_sorted_with_metadata() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        install_dir(root, "resource-aws-v10.0.0");
        install_dir(root, "resource-aws-v9.0.0");
        install_dir(root, "language-nodejs-v3.0.0");
        fs::write(root.join("resource-aws-v9.0.0").join("iacpm-resource-aws"), vec![0u8; 42])
            .unwrap();

        let plugins = list_plugins(root, false).unwrap();
        let names: Vec<_> = plugins.iter().map(|p| p.dir_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["resource-aws-v9.0.0", "resource-aws-v10.0.0", "language-nodejs-v3.0.0"]
        );
        assert_eq!(plugins[0].metadata.as_ref().unwrap().size_bytes, 42);
    }

    #[test]
    fn test_has_plugin() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        install_dir(root, "resource-aws-v6.0.0");

        let spec = PluginSpec::new(PluginKind::Resource, "aws", Some(Version::new(6, 0, 0)));
        assert!(has_plugin(root, &spec).unwrap());

        fs::write(root.join("resource-aws-v6.0.0.partial"), "").unwrap();
        assert!(!has_plugin(root, &spec).unwrap());

        let other = PluginSpec::new(PluginKind::Resource, "aws", Some(Version::new(6, 0, 1)));
        assert!(!has_plugin(root, &other).unwrap());
    }

    #[test]
    fn test_has_plugin_gte() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        install_dir(root, "resource-aws-v6.2.0");

        let gte = |v: &str| {
            let spec =
                PluginSpec::new(PluginKind::Resource, "aws", Some(Version::parse(v).unwrap()));
            has_plugin_gte(root, &spec).unwrap()
        };
        assert!(gte("6.0.0"));
        assert!(gte("6.2.0"));
        assert!(gte("6.2.0-beta.1"));
        assert!(!gte("6.2.1"));
        assert!(!has_plugin_gte(root, &PluginSpec::new(PluginKind::Language, "aws", None)).unwrap());
        assert!(has_plugin_gte(root, &PluginSpec::new(PluginKind::Resource, "aws", None)).unwrap());
    }

    #[test]
    fn test_select_compatible_and_find() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for dir in ["resource-aws-v5.9.0", "resource-aws-v6.0.0", "resource-aws-v6.3.1", "resource-aws-v7.0.0"] {
            install_dir(root, dir);
        }
        let plugins = list_plugins(root, true).unwrap();

        let req = VersionReq::parse("^6").unwrap();
        let selected = select_compatible(&plugins, PluginKind::Resource, "aws", &req).unwrap();
        assert_eq!(selected.version, Version::new(6, 3, 1));

        let none = VersionReq::parse(">=8").unwrap();
        assert!(select_compatible(&plugins, PluginKind::Resource, "aws", &none).is_none());

        let latest = find_plugin(root, PluginKind::Resource, "aws", None).unwrap().unwrap();
        assert_eq!(latest.version, Version::new(7, 0, 0));
        assert!(find_plugin(root, PluginKind::Resource, "gcp", None).unwrap().is_none());
    }
}
