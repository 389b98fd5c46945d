//! Git hook templates.
//!
//! Both hooks run an incremental sync in the background, non-blocking and
//! silent on failure. The engine's block is fenced with sentinel comments so
//! uninstall can remove exactly what install added; a pre-existing user hook
//! is preserved below its own sentinel and restored byte-identical.

use std::fs;
use std::path::{Path, PathBuf};

use cv_core::{Error, Result};

pub const HOOK_NAMES: &[&str] = &["post-commit", "post-merge"];

const BLOCK_BEGIN: &str = "# >>> cv sync hook >>>";
const BLOCK_END: &str = "# <<< cv sync hook <<<";
const PRESERVED_SENTINEL: &str = "# Original hook preserved below";

fn hook_script(hook: &str) -> String {
    format!(
        "#!/bin/sh\n\
         {BLOCK_BEGIN}\n\
         # Installed by cv ({hook}); do not edit between the markers.\n\
         (command -v cv >/dev/null 2>&1 && cv sync --incremental --quiet >/dev/null 2>&1 &) || true\n\
         {BLOCK_END}\n"
    )
}

fn hooks_dir(root: &Path) -> PathBuf {
    root.join(".git").join("hooks")
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Install the post-commit and post-merge hooks.
///
/// Reinstall is idempotent: an existing engine block is replaced, and a
/// pre-existing user hook moves (byte-identical) below the preserved
/// sentinel.
pub fn install_hooks(root: &Path) -> Result<()> {
    let dir = hooks_dir(root);
    if !root.join(".git").exists() {
        return Err(Error::Git(format!(
            "no .git directory under {}",
            root.display()
        )));
    }
    fs::create_dir_all(&dir)?;

    for hook in HOOK_NAMES {
        let path = dir.join(hook);
        let preserved = match fs::read(&path) {
            Ok(existing) => extract_preserved(&existing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let mut content = hook_script(hook).into_bytes();
        if let Some(original) = preserved {
            content.extend_from_slice(format!("{PRESERVED_SENTINEL}\n").as_bytes());
            content.extend_from_slice(&original);
        }

        fs::write(&path, content)?;
        make_executable(&path)?;
        tracing::debug!(hook, path = %path.display(), "installed git hook");
    }
    Ok(())
}

/// Remove the engine's hook blocks, restoring any preserved user hook
/// byte-identical. Hooks the engine does not recognize are left untouched.
pub fn uninstall_hooks(root: &Path) -> Result<()> {
    let dir = hooks_dir(root);
    for hook in HOOK_NAMES {
        let path = dir.join(hook);
        let existing = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        if !contains_line(&existing, BLOCK_BEGIN) {
            // Not ours; leave the user's hook alone.
            continue;
        }

        match split_after_sentinel(&existing) {
            Some(original) => {
                fs::write(&path, original)?;
                make_executable(&path)?;
            }
            None => fs::remove_file(&path)?,
        }
        tracing::debug!(hook, "uninstalled git hook");
    }
    Ok(())
}

fn contains_line(content: &[u8], needle: &str) -> bool {
    content
        .split(|b| *b == b'\n')
        .any(|line| line == needle.as_bytes())
}

/// The user's original script bytes, whether this file is an untouched user
/// hook or an engine-managed hook carrying one below the sentinel.
fn extract_preserved(existing: &[u8]) -> Option<Vec<u8>> {
    if contains_line(existing, BLOCK_BEGIN) {
        split_after_sentinel(existing)
    } else if existing.is_empty() {
        None
    } else {
        Some(existing.to_vec())
    }
}

/// Bytes after the `PRESERVED_SENTINEL` line, or `None` when the file has
/// no preserved section.
fn split_after_sentinel(content: &[u8]) -> Option<Vec<u8>> {
    let sentinel = format!("{PRESERVED_SENTINEL}\n");
    let sentinel = sentinel.as_bytes();
    content
        .windows(sentinel.len())
        .position(|w| w == sentinel)
        .map(|i| content[i + sentinel.len()..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git").join("hooks")).unwrap();
        dir
    }

    #[test]
    fn install_then_uninstall_leaves_no_hooks() {
        let dir = setup();
        install_hooks(dir.path()).unwrap();
        let hook = dir.path().join(".git/hooks/post-commit");
        let content = fs::read_to_string(&hook).unwrap();
        assert!(content.contains(BLOCK_BEGIN));
        assert!(content.contains("cv sync --incremental"));

        uninstall_hooks(dir.path()).unwrap();
        assert!(!hook.exists());
        assert!(!dir.path().join(".git/hooks/post-merge").exists());
    }

    #[test]
    fn user_hook_survives_install_uninstall_byte_identical() {
        let dir = setup();
        let hook = dir.path().join(".git/hooks/post-commit");
        let user_script = b"#!/bin/bash\necho \"custom hook\"\nmake lint\n";
        fs::write(&hook, user_script).unwrap();

        install_hooks(dir.path()).unwrap();
        let merged = fs::read_to_string(&hook).unwrap();
        assert!(merged.contains(BLOCK_BEGIN));
        assert!(merged.contains(PRESERVED_SENTINEL));
        assert!(merged.contains("custom hook"));

        uninstall_hooks(dir.path()).unwrap();
        assert_eq!(fs::read(&hook).unwrap(), user_script);
    }

    #[test]
    fn reinstall_is_idempotent() {
        let dir = setup();
        let hook = dir.path().join(".git/hooks/post-merge");
        fs::write(&hook, b"#!/bin/sh\necho original\n").unwrap();

        install_hooks(dir.path()).unwrap();
        install_hooks(dir.path()).unwrap();

        let merged = fs::read_to_string(&hook).unwrap();
        assert_eq!(merged.matches(BLOCK_BEGIN).count(), 1);
        assert_eq!(merged.matches("echo original").count(), 1);

        uninstall_hooks(dir.path()).unwrap();
        assert_eq!(fs::read(&hook).unwrap(), b"#!/bin/sh\necho original\n");
    }

    #[test]
    fn foreign_hook_untouched_by_uninstall() {
        let dir = setup();
        let hook = dir.path().join(".git/hooks/post-commit");
        fs::write(&hook, b"#!/bin/sh\necho mine\n").unwrap();
        uninstall_hooks(dir.path()).unwrap();
        assert_eq!(fs::read(&hook).unwrap(), b"#!/bin/sh\necho mine\n");
    }
}
