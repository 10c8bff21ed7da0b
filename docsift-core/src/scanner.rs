//! Filesystem scan feeding a per-user queue.
//!
//! A [`ScanTask`] resolves the user's root under a base directory, walks it
//! with [`Scanner`], pushes one [`ScanQueueEntry`] per regular file and then
//! closes the queue exactly once, whether the walk succeeded or not.

use crate::config::ScannerConfig;
use crate::error::ScanError;
use crate::queue::DocumentQueue;
use crate::types::{ScanQueueEntry, User};
use chrono::{DateTime, Utc};
use ignore::overrides::{Override, OverrideBuilder};
use ignore::{Match, WalkBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Include/exclude glob filter, applied by the walker.
///
/// Patterns are gitignore-style globs relative to the scan root. With any
/// include pattern present, files matching none of them are skipped;
/// exclude patterns skip files and prune directories.
#[derive(Debug, Clone)]
pub struct PathFilter {
    overrides: Override,
}

impl PathFilter {
    pub fn new(root: &Path, config: &ScannerConfig) -> Result<Self, ignore::Error> {
        let mut builder = OverrideBuilder::new(root);
        for pattern in &config.include {
            builder.add(pattern)?;
        }
        for pattern in &config.exclude {
            builder.add(&format!("!{pattern}"))?;
        }
        Ok(Self {
            overrides: builder.build()?,
        })
    }

    pub fn accepts(&self, path: &Path, is_dir: bool) -> bool {
        !matches!(self.overrides.matched(path, is_dir), Match::Ignore(_))
    }

    fn into_overrides(self) -> Override {
        self.overrides
    }
}

/// Outcome of a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files_enqueued: usize,
    /// Unreadable entries skipped during the walk
    pub walk_errors: usize,
}

#[derive(Debug, Clone)]
pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Walk `root` and push every accepted regular file onto `queue`.
    ///
    /// Unreadable entries below the root are logged and skipped. An
    /// inaccessible root or a failed push aborts the walk.
    pub fn scan(
        &self,
        root: &Path,
        user: &User,
        queue: &dyn DocumentQueue,
    ) -> Result<ScanStats, ScanError> {
        let metadata = std::fs::metadata(root).map_err(|source| ScanError::RootInaccessible {
            root: root.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let filter = PathFilter::new(root, &self.config)?;
        let mut walker = WalkBuilder::new(root);
        walker
            .standard_filters(false)
            .follow_links(self.config.follow_symlinks)
            .max_depth(self.config.max_depth)
            .overrides(filter.into_overrides());

        let mut stats = ScanStats::default();
        for entry in walker.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    stats.walk_errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            debug!("Enqueuing {}", entry.path().display());
            queue.push(ScanQueueEntry::new(entry.into_path(), user))?;
            stats.files_enqueued += 1;
        }

        Ok(stats)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub user: String,
    pub root: PathBuf,
    pub queue: String,
    pub files_enqueued: usize,
    pub walk_errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// One scan run for one user.
pub struct ScanTask {
    root: PathBuf,
    user: User,
    scanner: Scanner,
    queue: Arc<dyn DocumentQueue>,
}

impl ScanTask {
    /// The scan root is `base` joined with the user's path.
    pub fn new(
        base: &Path,
        user: User,
        config: &ScannerConfig,
        queue: Arc<dyn DocumentQueue>,
    ) -> Self {
        Self {
            root: base.join(user.path()),
            user,
            scanner: Scanner::new(config.clone()),
            queue,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Scan, then close the queue. The close happens on every path; a walk
    /// failure is reported in preference to a close failure.
    pub fn call(self) -> Result<ScanReport, ScanError> {
        let scan_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            "Scan {} started for user {} at {} into {}",
            scan_id,
            self.user.id,
            self.root.display(),
            self.queue.name()
        );

        let scanned = self
            .scanner
            .scan(&self.root, &self.user, self.queue.as_ref());
        let closed = self.queue.close();

        let stats = scanned.inspect_err(|e| error!("Scan {} aborted: {}", scan_id, e))?;
        closed?;

        let report = ScanReport {
            scan_id,
            user: self.user.id.clone(),
            root: self.root,
            queue: self.queue.name().to_string(),
            files_enqueued: stats.files_enqueued,
            walk_errors: stats.walk_errors,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            "Scan {} finished: {} files enqueued, {} walk errors in {}ms",
            scan_id,
            report.files_enqueued,
            report.walk_errors,
            report.duration().num_milliseconds()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use std::fs;

    #[test]
    fn test_filter_include_and_exclude() {
        let root = Path::new("/data");
        let config = ScannerConfig {
            include: vec!["*.pdf".to_string(), "*.txt".to_string()],
            exclude: vec!["drafts/".to_string()],
            ..ScannerConfig::default()
        };
        let filter = PathFilter::new(root, &config).unwrap();

        assert!(filter.accepts(Path::new("/data/a.pdf"), false));
        assert!(!filter.accepts(Path::new("/data/a.png"), false));
        assert!(filter.accepts(Path::new("/data/sub"), true));
        assert!(!filter.accepts(Path::new("/data/drafts"), true));
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let filter = PathFilter::new(Path::new("/data"), &ScannerConfig::default()).unwrap();
        assert!(filter.accepts(Path::new("/data/anything.bin"), false));
    }

    #[test]
    fn test_missing_root_is_inaccessible() {
        let queue = MemoryQueue::new("q", 0);
        let err = Scanner::new(ScannerConfig::default())
            .scan(Path::new("/nonexistent/root"), &User::new("u"), &queue)
            .unwrap_err();
        assert!(matches!(err, ScanError::RootInaccessible { .. }));
    }

    #[test]
    fn test_file_root_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "x").unwrap();
        let queue = MemoryQueue::new("q", 0);
        let err = Scanner::new(ScannerConfig::default())
            .scan(&file, &User::new("u"), &queue)
            .unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory(_)));
    }

    #[test]
    fn test_max_depth_limits_walk() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("top.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/deep.txt"), "x").unwrap();

        let config = ScannerConfig {
            max_depth: Some(1),
            ..ScannerConfig::default()
        };
        let queue = MemoryQueue::new("q", 0);
        let stats = Scanner::new(config)
            .scan(dir.path(), &User::new("u"), &queue)
            .unwrap();
        assert_eq!(stats.files_enqueued, 1);
    }

    #[test]
    fn test_task_resolves_user_path() {
        let queue: Arc<dyn DocumentQueue> = Arc::new(MemoryQueue::new("q", 0));
        let task = ScanTask::new(
            Path::new("/srv/data"),
            User::new("alice"),
            &ScannerConfig::default(),
            queue,
        );
        assert_eq!(task.root(), Path::new("/srv/data/alice"));
    }
}
