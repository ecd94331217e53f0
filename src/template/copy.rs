//! Scaffolding a template into a project directory.
//!
//! [`copy_template_files`] walks the template tree and recreates it under the
//! destination, replacing `${PROJECT}` and `${DESCRIPTION}` in text files and
//! `${PROJECT}` in file names. Existing files are never overwritten unless
//! `force` is set; [`copy_template_files_dry_run`] reports every such file up
//! front so the user sees the whole list before anything is written.

use crate::constants::{
    BINARY_DETECTION_WINDOW, DEFAULT_PROJECT_NAME, GIT_DIR, LEGACY_TEMPLATE_MANIFEST_FILE,
    MAX_PROJECT_DESCRIPTION_LENGTH,
};
use crate::core::IacpmError;
use crate::utils::fs::{remove_dir_all, remove_file_if_exists};
use anyhow::{Context, Result};
use regex::Regex;
use regex::bytes::{NoExpand, Regex as BytesRegex};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const PROJECT_TOKEN: &str = "${PROJECT}";
const DESCRIPTION_TOKEN: &str = "${DESCRIPTION}";

static PROJECT_TOKEN_BYTES: LazyLock<BytesRegex> = LazyLock::new(|| {
    BytesRegex::new(&regex::escape(PROJECT_TOKEN)).expect("project token regex is valid")
});
static DESCRIPTION_TOKEN_BYTES: LazyLock<BytesRegex> = LazyLock::new(|| {
    BytesRegex::new(&regex::escape(DESCRIPTION_TOKEN)).expect("description token regex is valid")
});

static PROJECT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,100}$").expect("project name regex is valid"));

/// Copies the template at `source` into `dest`.
///
/// `${PROJECT}` and `${DESCRIPTION}` are replaced in text files byte for byte,
/// whatever their encoding; a NUL byte early in a file marks it binary and it is
/// copied untouched. `${PROJECT}` is also replaced in file names. `.git` and the
/// legacy template manifest are skipped. Files keep their permission bits,
/// widened to at least owner read/write.
///
/// Without `force` the first collision with an existing file aborts the copy
/// with [`IacpmError::ExistingFiles`]; whatever was written before it stays.
/// With `force`, existing files are overwritten and a file and a directory of
/// the same name replace each other.
///
/// # Errors
///
/// [`IacpmError::ExistingFiles`] on a collision without `force`; I/O errors
/// otherwise.
///
/// # Examples
///
/// ```rust,no_run
/// use iacpm_cli::template::{copy_template_files, copy_template_files_dry_run};
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// let template = Path::new("/home/me/.iacpm/templates/aws-go");
/// let dest = Path::new("billing-api");
///
/// copy_template_files_dry_run(template, dest, "billing-api")?;
/// copy_template_files(template, dest, false, "billing-api", "Bills things")?;
/// # Ok(())
/// # }
/// ```
pub fn copy_template_files(
    source: &Path,
    dest: &Path,
    force: bool,
    project_name: &str,
    project_description: &str,
) -> Result<()> {
    tracing::debug!(
        source = %source.display(),
        dest = %dest.display(),
        force,
        "Copying template files"
    );
    walk_files(source, dest, project_name, &mut |entry| {
        if entry.is_dir {
            create_dir(&entry.dest, force)
        } else {
            copy_file(&entry.source, &entry.dest, force, project_name, project_description)
        }
    })
}

/// Fails with [`IacpmError::ExistingFiles`] naming every file that
/// [`copy_template_files`] would overwrite. Writes nothing.
pub fn copy_template_files_dry_run(source: &Path, dest: &Path, project_name: &str) -> Result<()> {
    let mut existing = Vec::new();
    walk_files(source, dest, project_name, &mut |entry| {
        if !entry.is_dir && entry.dest.metadata().is_ok_and(|m| !m.is_dir()) {
            existing.push(file_name(&entry.dest));
        }
        Ok(())
    })?;

    if existing.is_empty() {
        Ok(())
    } else {
        Err(IacpmError::ExistingFiles {
            files: existing,
        }
        .into())
    }
}

struct WalkEntry {
    source: PathBuf,
    dest: PathBuf,
    is_dir: bool,
}

/// Visits directories before their contents, in name order. `.git` and the
/// legacy template manifest are skipped.
fn walk_files(
    source_dir: &Path,
    dest_dir: &Path,
    project_name: &str,
    action: &mut dyn FnMut(&WalkEntry) -> Result<()>,
) -> Result<()> {
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(source_dir)
        .with_context(|| format!("Failed to read template directory {}", source_dir.display()))?
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("Failed to read template directory {}", source_dir.display()))?;
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let source = entry.path();
        // Follows symlinks so a linked directory is copied as a directory
        let is_dir = fs::metadata(&source)
            .with_context(|| format!("Failed to read {}", source.display()))?
            .is_dir();

        if is_dir {
            if name == GIT_DIR {
                continue;
            }
            let dest = dest_dir.join(&name);
            action(&WalkEntry {
                source: source.clone(),
                dest: dest.clone(),
                is_dir: true,
            })?;
            walk_files(&source, &dest, project_name, action)?;
        } else {
            if name == LEGACY_TEMPLATE_MANIFEST_FILE {
                continue;
            }
            let dest = dest_dir.join(name.replace(PROJECT_TOKEN, project_name));
            action(&WalkEntry {
                source,
                dest,
                is_dir: false,
            })?;
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn existing_file(path: &Path) -> IacpmError {
    IacpmError::ExistingFiles {
        files: vec![file_name(path)],
    }
}

fn create_dir(path: &Path, force: bool) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => return Ok(()),
        Ok(_) if !force => return Err(existing_file(path).into()),
        Ok(_) => remove_file_if_exists(path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }

    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(path)
        .with_context(|| format!("Failed to create directory {}", path.display()))
}

fn copy_file(
    source: &Path,
    dest: &Path,
    force: bool,
    project_name: &str,
    project_description: &str,
) -> Result<()> {
    let bytes = fs::read(source).with_context(|| format!("Failed to read {}", source.display()))?;
    let content = if is_binary(&bytes) {
        bytes
    } else {
        transform(&bytes, project_name, project_description)
    };

    match fs::symlink_metadata(dest) {
        Ok(_) if !force => return Err(existing_file(dest).into()),
        Ok(metadata) if metadata.is_dir() => remove_dir_all(dest)?,
        Ok(_) => remove_file_if_exists(dest)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", dest.display())),
    }

    let mut options = fs::OpenOptions::new();
    // create_new catches a file that appeared after the check above
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        let mode = fs::metadata(source).map(|m| m.permissions().mode() & 0o777).unwrap_or(0o644);
        options.mode(mode | 0o600);
    }

    let mut file = match options.open(dest) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(existing_file(dest).into());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to create {}", dest.display())),
    };
    std::io::Write::write_all(&mut file, &content)
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    // The umask may have masked bits off at creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(source).map(|m| m.permissions().mode() & 0o777).unwrap_or(0o644);
        fs::set_permissions(dest, fs::Permissions::from_mode(mode | 0o600))
            .with_context(|| format!("Failed to set permissions on {}", dest.display()))?;
    }
    Ok(())
}

/// A NUL byte near the start marks a file as binary.
fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_DETECTION_WINDOW).any(|b| *b == 0)
}

/// Replaces the tokens byte for byte; content in any encoding passes through untouched.
fn transform(content: &[u8], project_name: &str, project_description: &str) -> Vec<u8> {
    let content = PROJECT_TOKEN_BYTES.replace_all(content, NoExpand(project_name.as_bytes()));
    DESCRIPTION_TOKEN_BYTES
        .replace_all(&content, NoExpand(project_description.as_bytes()))
        .into_owned()
}

/// Checks a project name, with a message fit for the user on failure.
pub fn validate_project_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("A project name may not be empty")
    } else if name.len() > 100 {
        Some("A project name must be 100 characters or less")
    } else if !PROJECT_NAME.is_match(name) {
        Some("A project name may only contain alphanumeric, hyphens, underscores, and periods")
    } else {
        let lower = name.to_lowercase();
        (lower == "iacpm" || lower.starts_with("iacpm.")).then_some(
            "A project name must not be `iacpm` and must not start with the prefix `iacpm.` \
             to avoid collision with standard libraries",
        )
    };

    match reason {
        Some(reason) => Err(IacpmError::InvalidProjectName {
            reason: reason.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

pub fn validate_project_description(description: &str) -> Result<()> {
    if description.chars().count() > MAX_PROJECT_DESCRIPTION_LENGTH {
        return Err(IacpmError::InvalidProjectDescription {
            reason: format!(
                "A project description must be {MAX_PROJECT_DESCRIPTION_LENGTH} characters or less"
            ),
        }
        .into());
    }
    Ok(())
}

/// Turns `name` into a valid project name by dropping characters that would
/// make it invalid, falling back to a default when nothing is left.
#[must_use]
pub fn sanitize_project_name(name: &str) -> String {
    if validate_project_name(name).is_ok() {
        return name.to_string();
    }

    let mut result = String::new();
    for c in name.chars() {
        let mut candidate = result.clone();
        candidate.push(c);
        if validate_project_name(&candidate).is_ok() {
            result = candidate;
        }
    }

    if result.is_empty() {
        DEFAULT_PROJECT_NAME.to_string()
    } else {
        result
    }
}

/// The explicit `name` if given, else the template's own project name unless
/// it is the placeholder, else a sanitized `fallback` (usually the directory name).
#[must_use]
pub fn value_or_sanitized_default_project_name(
    name: &str,
    template_project_name: &str,
    fallback: &str,
) -> String {
    if !name.is_empty() {
        name.to_string()
    } else if !template_project_name.is_empty() && template_project_name != PROJECT_TOKEN {
        template_project_name.to_string()
    } else {
        sanitize_project_name(fallback)
    }
}

/// Like [`value_or_sanitized_default_project_name`] for descriptions.
#[must_use]
pub fn value_or_default_project_description(
    description: &str,
    template_description: &str,
    fallback: &str,
) -> String {
    if !description.is_empty() {
        description.to_string()
    } else if !template_description.is_empty() && template_description != DESCRIPTION_TOKEN {
        template_description.to_string()
    } else {
        fallback.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn template(root: &Path) -> PathBuf {
        let src = root.join("template");
        fs::create_dir_all(src.join("src")).unwrap();
        fs::create_dir_all(src.join(".git")).unwrap();
        fs::write(src.join("Iacpm.yaml"), "name: ${PROJECT}\ndescription: ${DESCRIPTION}\n").unwrap();
        fs::write(src.join("src/${PROJECT}.ts"), "export const name = \"${PROJECT}\";\n").unwrap();
        fs::write(src.join("logo.bin"), b"${PROJECT}\0binary").unwrap();
        fs::write(src.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(src.join(".iacpm.template.yaml"), "legacy: true\n").unwrap();
        src
    }

    fn existing_files(err: &anyhow::Error) -> Vec<String> {
        match err.downcast_ref::<IacpmError>() {
            Some(IacpmError::ExistingFiles { files }) => files.clone(),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_copy_substitutes_tokens() {
        let temp = TempDir::new().unwrap();
        let src = template(temp.path());
        let dest = temp.path().join("out");
        fs::create_dir(&dest).unwrap();

        copy_template_files(&src, &dest, false, "website", "My site").unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("Iacpm.yaml")).unwrap(),
            "name: website\ndescription: My site\n"
        );
        assert_eq!(
            fs::read_to_string(dest.join("src/website.ts")).unwrap(),
            "export const name = \"website\";\n"
        );
        assert_eq!(fs::read(dest.join("logo.bin")).unwrap(), b"${PROJECT}\0binary");
        assert!(!dest.join(".git").exists());
        assert!(!dest.join(".iacpm.template.yaml").exists());
    }

    #[test]
    fn test_copy_preserves_non_utf8_text() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("t");
        fs::create_dir(&src).unwrap();
        // Latin-1 "café"
        fs::write(src.join("menu.txt"), b"caf\xe9 ${PROJECT}\n${DESCRIPTION}\xff\n").unwrap();
        let dest = temp.path().join("out");
        fs::create_dir(&dest).unwrap();

        copy_template_files(&src, &dest, false, "web", "$1 menu").unwrap();

        assert_eq!(fs::read(dest.join("menu.txt")).unwrap(), b"caf\xe9 web\n$1 menu\xff\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_keeps_executable_bit() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("t");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("run.sh"), "#!/bin/sh\n").unwrap();
        fs::set_permissions(src.join("run.sh"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(src.join("ro.txt"), "x").unwrap();
        fs::set_permissions(src.join("ro.txt"), fs::Permissions::from_mode(0o400)).unwrap();
        let dest = temp.path().join("out");
        fs::create_dir(&dest).unwrap();

        copy_template_files(&src, &dest, false, "p", "").unwrap();

        let mode = |name: &str| fs::metadata(dest.join(name)).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode("run.sh"), 0o755);
        assert_eq!(mode("ro.txt"), 0o600);
    }

    #[test]
    fn test_copy_refuses_existing_file_without_force() {
        let temp = TempDir::new().unwrap();
        let src = template(temp.path());
        let dest = temp.path().join("out");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("Iacpm.yaml"), "mine").unwrap();

        let err = copy_template_files(&src, &dest, false, "p", "").unwrap_err();
        assert_eq!(existing_files(&err), vec!["Iacpm.yaml"]);
        assert_eq!(fs::read_to_string(dest.join("Iacpm.yaml")).unwrap(), "mine");

        copy_template_files(&src, &dest, true, "p", "").unwrap();
        assert_eq!(fs::read_to_string(dest.join("Iacpm.yaml")).unwrap(), "name: p\ndescription: \n");
    }

    #[test]
    fn test_force_swaps_files_and_directories() {
        let temp = TempDir::new().unwrap();
        let src = template(temp.path());
        let dest = temp.path().join("out");
        fs::create_dir_all(dest.join("logo.bin/inner")).unwrap();
        fs::write(dest.join("src"), "a file where a directory goes").unwrap();

        assert!(copy_template_files(&src, &dest, false, "p", "").is_err());

        copy_template_files(&src, &dest, true, "p", "").unwrap();
        assert!(dest.join("logo.bin").is_file());
        assert!(dest.join("src").is_dir());
        assert!(dest.join("src/p.ts").is_file());
    }

    #[test]
    fn test_dry_run_lists_all_conflicts() {
        let temp = TempDir::new().unwrap();
        let src = template(temp.path());
        let dest = temp.path().join("out");
        fs::create_dir_all(dest.join("src")).unwrap();
        fs::write(dest.join("Iacpm.yaml"), "").unwrap();
        fs::write(dest.join("src/p.ts"), "").unwrap();

        let err = copy_template_files_dry_run(&src, &dest, "p").unwrap_err();
        assert_eq!(existing_files(&err), vec!["Iacpm.yaml", "p.ts"]);
        assert!(!dest.join("logo.bin").exists());

        let message = err.to_string();
        assert!(message.starts_with("creating this template will make changes to existing files:"));
        assert!(message.contains("  overwrite   Iacpm.yaml"));
        assert!(message.ends_with("rerun the command and pass --force to accept and create"));

        copy_template_files_dry_run(&src, &temp.path().join("empty"), "p").unwrap();
    }

    #[test]
    fn test_validate_project_name() {
        for ok in ["website", "my_project.v2", "A-1", &"a".repeat(100)] {
            validate_project_name(ok).unwrap();
        }
        for bad in ["", "has space", "slash/name", "iacpm", "IaCpm.Core", &"a".repeat(101)] {
            assert!(validate_project_name(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_validate_project_description() {
        validate_project_description(&"d".repeat(256)).unwrap();
        assert!(validate_project_description(&"d".repeat(257)).is_err());
    }

    #[test]
    fn test_sanitize_project_name() {
        assert_eq!(sanitize_project_name("my project!"), "myproject");
        assert_eq!(sanitize_project_name("%%%"), "project");
        assert_eq!(sanitize_project_name("ok-name"), "ok-name");
    }

    #[test]
    fn test_project_name_defaults() {
        assert_eq!(value_or_sanitized_default_project_name("given", "t", "dir"), "given");
        assert_eq!(value_or_sanitized_default_project_name("", "fixed", "dir"), "fixed");
        assert_eq!(value_or_sanitized_default_project_name("", "${PROJECT}", "my dir"), "mydir");
        assert_eq!(value_or_default_project_description("", "${DESCRIPTION}", "d"), "d");
        assert_eq!(value_or_default_project_description("", "Template", "d"), "Template");
    }
}
