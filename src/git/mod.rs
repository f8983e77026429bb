//! Version-control collaborator.
//!
//! The store asks git which files are tracked and clean so it can keep only a
//! blob hash for their chunks, and later asks for blob content to rebuild
//! text. Every call is an external `git` invocation bounded by a timeout.
//! Failures never propagate: they resolve to the conservative answer (not
//! tracked, dirty, no content) and are logged at debug level.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::GitConfig;

/// Poll interval while waiting for a git process.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Operations the store needs from version control.
pub trait VersionControl: Send + Sync {
    /// Root of the working tree, if any.
    fn repo_root(&self) -> Option<PathBuf>;

    /// Blob hash at HEAD for each tracked path. Untracked paths are absent.
    fn blob_hashes(&self, paths: &[String]) -> HashMap<String, String>;

    /// Paths that are modified, staged or untracked.
    fn dirty_paths(&self, paths: &[String]) -> HashSet<String>;

    /// Content of a blob.
    fn blob_content(&self, hash: &str) -> Option<String>;

    /// Blob hash of the file as it currently is in the working tree.
    fn working_tree_hash(&self, path: &str) -> Option<String>;

    /// Content of `path` at `revision` (`<commit>` or `<commit>^`).
    fn file_at_revision(&self, revision: &str, path: &str) -> Option<String>;
}

/// Stand-in when git integration is disabled: nothing is tracked.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVersionControl;

impl VersionControl for NoVersionControl {
    fn repo_root(&self) -> Option<PathBuf> {
        None
    }

    fn blob_hashes(&self, _paths: &[String]) -> HashMap<String, String> {
        HashMap::new()
    }

    fn dirty_paths(&self, paths: &[String]) -> HashSet<String> {
        paths.iter().cloned().collect()
    }

    fn blob_content(&self, _hash: &str) -> Option<String> {
        None
    }

    fn working_tree_hash(&self, _path: &str) -> Option<String> {
        None
    }

    fn file_at_revision(&self, _revision: &str, _path: &str) -> Option<String> {
        None
    }
}

/// `git` command-line implementation.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: Option<PathBuf>,
    timeout: Duration,
    batch_size: usize,
}

impl GitCli {
    /// Locate the repository containing `start`. Outside a repository every
    /// query degrades to the untracked answer.
    pub fn discover(start: &Path, config: &GitConfig) -> Self {
        let mut cli = Self {
            root: None,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            batch_size: config.batch_size.max(1),
        };
        cli.root = cli
            .run_in(start, &["rev-parse", "--show-toplevel"])
            .and_then(|out| String::from_utf8(out).ok())
            .map(|s| PathBuf::from(s.trim()))
            .filter(|p| !p.as_os_str().is_empty());

        match &cli.root {
            Some(root) => tracing::debug!(root = %root.display(), "git repository found"),
            None => tracing::debug!(start = %start.display(), "not inside a git repository"),
        }
        cli
    }

    fn run(&self, args: &[&str]) -> Option<Vec<u8>> {
        let root = self.root.as_deref()?;
        self.run_in(root, args)
    }

    /// Run git with a timeout; `None` on spawn failure, timeout or non-zero exit.
    fn run_in(&self, dir: &Path, args: &[&str]) -> Option<Vec<u8>> {
        let mut child = match Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!("git unavailable: {e}");
                return None;
            }
        };

        // Drain stdout concurrently so a large output cannot block the child
        let mut stdout = child.stdout.take()?;
        let reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::debug!(?args, "git timed out after {:?}", self.timeout);
                    return None;
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    tracing::debug!("waiting for git failed: {e}");
                    return None;
                }
            }
        };

        let output = reader.join().ok()?.ok()?;
        if status.success() {
            Some(output)
        } else {
            tracing::debug!(?args, code = ?status.code(), "git exited with failure");
            None
        }
    }
}

impl VersionControl for GitCli {
    fn repo_root(&self) -> Option<PathBuf> {
        self.root.clone()
    }

    fn blob_hashes(&self, paths: &[String]) -> HashMap<String, String> {
        let mut hashes = HashMap::new();
        for batch in paths.chunks(self.batch_size) {
            let mut args = vec!["ls-tree", "-z", "--full-tree", "HEAD", "--"];
            args.extend(batch.iter().map(String::as_str));
            let Some(output) = self.run(&args) else {
                continue;
            };
            hashes.extend(parse_ls_tree(&output));
        }
        hashes
    }

    fn dirty_paths(&self, paths: &[String]) -> HashSet<String> {
        let mut dirty = HashSet::new();
        for batch in paths.chunks(self.batch_size) {
            let mut args = vec![
                "status",
                "--porcelain",
                "-z",
                "--untracked-files=all",
                "--",
            ];
            args.extend(batch.iter().map(String::as_str));
            match self.run(&args) {
                Some(output) => dirty.extend(parse_status(&output)),
                // Unknown state: assume every path in the batch is dirty
                None => dirty.extend(batch.iter().cloned()),
            }
        }
        dirty
    }

    fn blob_content(&self, hash: &str) -> Option<String> {
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        self.run(&["cat-file", "-p", hash])
            .and_then(|out| String::from_utf8(out).ok())
    }

    fn working_tree_hash(&self, path: &str) -> Option<String> {
        self.run(&["hash-object", "--", path])
            .and_then(|out| String::from_utf8(out).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn file_at_revision(&self, revision: &str, path: &str) -> Option<String> {
        if revision.starts_with('-') {
            return None;
        }
        let spec = format!("{revision}:{path}");
        self.run(&["show", &spec])
            .and_then(|out| String::from_utf8(out).ok())
    }
}

/// `<mode> <type> <hash>\t<path>` entries separated by NUL.
fn parse_ls_tree(output: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(output)
        .split('\0')
        .filter_map(|entry| {
            let (meta, path) = entry.split_once('\t')?;
            let mut fields = meta.split_whitespace();
            let _mode = fields.next()?;
            let kind = fields.next()?;
            let hash = fields.next()?;
            (kind == "blob").then(|| (path.to_string(), hash.to_string()))
        })
        .collect()
}

/// `XY <path>` entries separated by NUL; renames and copies carry an extra
/// entry with the original path.
fn parse_status(output: &[u8]) -> HashSet<String> {
    let text = String::from_utf8_lossy(output);
    let mut entries = text.split('\0');
    let mut dirty = HashSet::new();
    while let Some(entry) = entries.next() {
        if entry.len() < 4 {
            continue;
        }
        let status = &entry[..2];
        dirty.insert(entry[3..].to_string());
        if status.starts_with('R') || status.starts_with('C') {
            entries.next();
        }
    }
    dirty
}
