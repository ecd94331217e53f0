//! Configuration for IACPM
//!
//! There is a single user-wide file, `~/.iacpm/config.toml`, holding the
//! plugin install root, download URL overrides and the template cache
//! locations. Everything in it can be overridden from the environment; see
//! [`global`] for the file format and precedence rules.
//!
//! Project manifests (`Iacpm.yaml`) are not configuration in this sense. The
//! template module reads only the few fields it needs from them.

pub mod global;

pub use global::{
    GlobalConfig, GlobalConfigManager, PluginConfig, Settings, TemplateCacheSettings,
    TemplateConfig, default_home,
};
