//! Cross-platform utilities shared by the plugin and template modules.

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{TempDir, dir_size, ensure_dir, remove_dir_all, remove_file_if_exists};
pub use platform::{Platform, get_git_command, get_home_dir, is_windows, resolve_path};
