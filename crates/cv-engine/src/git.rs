//! Git working-tree plumbing.
//!
//! A thin wrapper around `gix::Repository` for repository-level reads, with
//! the Git CLI used for the batch operations where it is the simpler tool
//! (`ls-files` enumeration and stage listings).

use std::path::{Path, PathBuf};
use std::process::Command;

use cv_core::{Error, Result};

/// A Git working tree opened for sync.
///
/// Holds only the validated root; the `gix` repository handle is `!Sync`
/// and is opened transiently inside each method so the workspace can be
/// shared across await points.
pub struct GitWorkspace {
    root: PathBuf,
}

impl GitWorkspace {
    /// Open an existing Git repository at or above the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = gix::discover(path).map_err(|e| {
            Error::Git(format!("not a git repository at {}: {}", path.display(), e))
        })?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::Git(format!("bare repository at {}", path.display())))?
            .to_path_buf();

        Ok(Self { root })
    }

    fn repo(&self) -> Result<gix::Repository> {
        gix::open(&self.root).map_err(|e| {
            Error::Git(format!(
                "failed to open repository at {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    /// The working-tree root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get a remote's fetch URL, if configured.
    pub fn remote_url(&self, remote: &str) -> Option<String> {
        let output = Command::new("git")
            .args(["remote", "get-url", remote])
            .current_dir(&self.root)
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }

    /// Get the HEAD commit hash as a hex string, or `None` if the repository
    /// is empty (no commits yet).
    pub fn head_hash(&self) -> Result<Option<String>> {
        let repo = self.repo()?;
        let head = repo
            .head()
            .map_err(|e| Error::Git(format!("failed to get HEAD: {e}")))?;

        if head.is_unborn() {
            return Ok(None);
        }

        match head.into_peeled_id() {
            Ok(id) => Ok(Some(id.to_hex().to_string())),
            Err(e) => Err(Error::Git(format!("failed to peel HEAD: {e}"))),
        }
    }

    /// Enumerate Git-tracked files as repo-relative, forward-slash paths.
    pub fn tracked_files(&self) -> Result<Vec<String>> {
        let output = Command::new("git")
            .args(["ls-files", "-z"])
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::Git(format!("git ls-files failed: {e}")))?;

        if !output.status.success() {
            return Err(Error::Git(format!(
                "git ls-files failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect())
    }

    /// Batch-read blob hashes for every tracked path via `git ls-files -s`.
    ///
    /// Returns `(path, blob_hash)` pairs. Paths missing from the index
    /// (untracked files) simply don't appear; callers should treat a miss as
    /// an empty hash.
    pub fn blob_hashes(&self) -> Result<Vec<(String, String)>> {
        let output = Command::new("git")
            .args(["ls-files", "-s", "-z"])
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::Git(format!("git ls-files -s failed: {e}")))?;

        if !output.status.success() {
            return Err(Error::Git(format!(
                "git ls-files -s failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        // Each record: "<mode> <hash> <stage>\t<path>"
        let mut hashes = Vec::new();
        for record in String::from_utf8_lossy(&output.stdout).split('\0') {
            if record.is_empty() {
                continue;
            }
            let Some((meta, path)) = record.split_once('\t') else {
                continue;
            };
            let mut fields = meta.split_whitespace();
            let (Some(_mode), Some(hash)) = (fields.next(), fields.next()) else {
                continue;
            };
            hashes.push((path.to_string(), hash.to_string()));
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(dir)
                .status()
                .unwrap();
            assert!(status.success(), "git {args:?} failed");
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
    }

    #[test]
    fn open_refuses_non_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GitWorkspace::open(dir.path()).is_err());
    }

    #[test]
    fn tracked_files_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "notes\n").unwrap();
        Command::new("git")
            .args(["add", "."])
            .current_dir(dir.path())
            .status()
            .unwrap();

        let ws = GitWorkspace::open(dir.path()).unwrap();
        let mut files = ws.tracked_files().unwrap();
        files.sort();
        assert_eq!(files, vec!["a.rs", "b.txt"]);

        let hashes = ws.blob_hashes().unwrap();
        let a = hashes.iter().find(|(p, _)| p == "a.rs").unwrap();
        assert_eq!(a.1.len(), 40);
    }

    #[test]
    fn head_hash_none_for_empty_repo() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let ws = GitWorkspace::open(dir.path()).unwrap();
        assert_eq!(ws.head_hash().unwrap(), None);
    }

    #[test]
    fn remote_url_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        Command::new("git")
            .args(["remote", "add", "origin", "git@github.com:acme/widgets.git"])
            .current_dir(dir.path())
            .status()
            .unwrap();

        let ws = GitWorkspace::open(dir.path()).unwrap();
        assert_eq!(
            ws.remote_url("origin").as_deref(),
            Some("git@github.com:acme/widgets.git")
        );
        assert_eq!(ws.remote_url("upstream"), None);
    }
}
