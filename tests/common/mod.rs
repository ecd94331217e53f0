//! Shared helpers for the integration and stress suites.

#![allow(dead_code)]

use assert_cmd::Command;
use iacpm_cli::plugin::{PluginKind, PluginLookupCache, PluginManager, PluginSpec};
use iacpm_cli::source::{HttpResponse, SourceOptions};
use iacpm_cli::test_utils::{FakeTransport, TarEntry, build_tar_gz};
use iacpm_cli::utils::platform::Platform;
use semver::Version;
use std::path::Path;
use std::sync::Arc;

/// Custom plugin server used by most plugin tests.
pub const SERVER: &str = "https://plugins.example.com/releases";

pub fn linux() -> Platform {
    Platform::from_rust("linux", "x86_64").expect("linux/amd64 is supported")
}

pub fn spec(name: &str, version: &str) -> PluginSpec {
    PluginSpec::new(PluginKind::Resource, name, Some(Version::parse(version).unwrap()))
        .with_download_url(SERVER)
}

/// The URL [`spec`] downloads from on [`linux`].
pub fn asset_url(name: &str, version: &str) -> String {
    format!("{SERVER}/iacpm-resource-{name}-v{version}-linux-amd64.tar.gz")
}

/// A plugin archive with a binary and a README, tagged with `marker` so tests
/// can tell which archive ended up installed.
pub fn plugin_archive(name: &str, marker: &str) -> Vec<u8> {
    build_tar_gz(&[
        TarEntry::file(&format!("iacpm-resource-{name}"), marker.as_bytes()).mode(0o755),
        TarEntry::dir("docs"),
        TarEntry::file("docs/README.md", b"# plugin\n"),
    ])
}

/// Serves [`plugin_archive`] for `name`/`version`.
pub fn serve_plugin(transport: &FakeTransport, name: &str, version: &str, marker: &str) {
    transport.respond(&asset_url(name, version), HttpResponse::new(200, plugin_archive(name, marker)));
}

pub fn manager(root: &Path, transport: Arc<FakeTransport>) -> PluginManager {
    PluginManager::new(root, transport, SourceOptions::default(), Arc::new(PluginLookupCache::new()))
        .unwrap()
        .with_platform(linux())
}

/// Names of the entries directly below `dir`, sorted.
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.file_name().to_string_lossy().into_owned()).collect())
        .unwrap_or_default();
    names.sort();
    names
}

/// Writes a project template manifest plus one source file into `dir`.
pub fn write_template(dir: &Path, description: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("Iacpm.yaml"),
        format!(
            "name: ${{PROJECT}}\ndescription: ${{DESCRIPTION}}\ntemplate:\n  description: {description}\n  quickstart: cd ${{PROJECT}}\n"
        ),
    )
    .unwrap();
    std::fs::write(dir.join("main.txt"), "project ${PROJECT}: ${DESCRIPTION}\n").unwrap();
}

/// `iacpm` with an isolated home and no progress output.
pub fn iacpm(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("iacpm").unwrap();
    cmd.env("IACPM_HOME", home)
        .env_remove("IACPM_CONFIG")
        .env_remove("IACPM_PLUGIN_DIR")
        .env_remove("IACPM_TEMPLATE_PATH")
        .env_remove("RUST_LOG")
        .arg("--no-progress");
    cmd
}
