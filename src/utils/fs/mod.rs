//! File system utilities for plugin and template directories.

pub mod dirs;
pub mod temp;

pub use dirs::{dir_size, ensure_dir, remove_dir_all, remove_file_if_exists};
pub use temp::TempDir;
