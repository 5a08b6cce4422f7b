//! File staging into managed directories.
//!
//! Each context store owns one managed directory. [`FileStager::stage`]
//! copies caller-supplied files into it and [`FileStager::unstage`]
//! deletes files that live directly inside it. Both are best-effort over
//! a batch: a bad path is skipped with a warning and the batch continues.
//!
//! Copies keep the source file name, so two inputs with the same name
//! collapse to one destination and the later copy wins.
//!
//! Concurrent `stage` and `unstage` calls on overlapping file names race
//! on the shared directory; no ordering between them is guaranteed.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use habit_context_core::ContextError;

/// A managed destination directory.
#[derive(Debug, Clone)]
pub struct FileStager {
    dir: PathBuf,
}

impl FileStager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy every existing regular file in `files` into the managed directory.
    ///
    /// Creates the directory if needed. Returns the destination paths,
    /// sorted and de-duplicated.
    pub fn stage<P: AsRef<Path>>(&self, files: &[P]) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            info!(dir = %self.dir.display(), "creating managed directory");
        }
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create managed directory: {}", self.dir.display())
        })?;

        let mut staged = BTreeSet::new();
        for file in files {
            let src = file.as_ref();
            if !src.is_file() {
                let err = ContextError::NotFound {
                    path: src.to_path_buf(),
                };
                warn!("{}; skipping", err);
                continue;
            }
            let Some(name) = src.file_name() else {
                warn!(path = %src.display(), "path has no file name; skipping");
                continue;
            };
            let dest = self.dir.join(name);

            if same_file(src, &dest) {
                debug!(path = %dest.display(), "already staged");
                staged.insert(dest);
                continue;
            }

            match std::fs::copy(src, &dest) {
                Ok(_) => {
                    debug!(from = %src.display(), to = %dest.display(), "staged file");
                    staged.insert(dest);
                }
                Err(e) => warn!(path = %src.display(), error = %e, "failed to copy; skipping"),
            }
        }

        Ok(staged.into_iter().collect())
    }

    /// Delete the files in `files` that sit directly inside the managed directory.
    ///
    /// Paths outside the directory, or that are not regular files, are
    /// never touched and only produce a warning. Fails with
    /// [`ContextError::NotInitialized`] when the directory does not exist.
    pub fn unstage<P: AsRef<Path>>(&self, files: &[P]) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Err(ContextError::NotInitialized(format!(
                "managed directory {} does not exist",
                self.dir.display()
            ))
            .into());
        }
        let root = self
            .dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", self.dir.display()))?;

        let mut deleted = BTreeSet::new();
        for file in files {
            let path = file.as_ref();
            let inside = path.is_file()
                && path
                    .canonicalize()
                    .ok()
                    .and_then(|p| p.parent().map(|parent| parent == root))
                    .unwrap_or(false);
            if !inside {
                warn!(
                    path = %path.display(),
                    dir = %self.dir.display(),
                    "does not exist or is not in the managed directory; not deleting"
                );
                continue;
            }

            match std::fs::remove_file(path) {
                Ok(()) => {
                    debug!(path = %path.display(), "unstaged file");
                    deleted.insert(path.to_path_buf());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    deleted.insert(path.to_path_buf());
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to delete"),
            }
        }

        Ok(deleted.into_iter().collect())
    }

    /// List regular files under the managed directory matching `include`.
    ///
    /// Returns an empty list when the directory does not exist yet.
    pub fn staged_files(&self, include: &GlobSet) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&self.dir).unwrap_or(path);
            if include.is_match(relative) {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Compile include patterns into a [`GlobSet`].
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use habit_context_core::error::classify;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, FileStager) {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), "alpha").unwrap();
        fs::write(src.join("b.md"), "beta").unwrap();
        let stager = FileStager::new(tmp.path().join("managed"));
        (tmp, src, stager)
    }

    #[test]
    fn test_stage_skips_missing_files() {
        let (_tmp, src, stager) = setup();
        let staged = stager
            .stage(&[src.join("a.txt"), src.join("missing.txt"), src.join("b.md")])
            .unwrap();
        assert_eq!(
            staged,
            vec![stager.dir().join("a.txt"), stager.dir().join("b.md")]
        );
        assert_eq!(fs::read_to_string(stager.dir().join("a.txt")).unwrap(), "alpha");
    }

    #[test]
    fn test_stage_skips_directories() {
        let (_tmp, src, stager) = setup();
        let staged = stager.stage(&[src.clone()]).unwrap();
        assert!(staged.is_empty());
        assert!(stager.dir().is_dir());
    }

    #[test]
    fn test_stage_collapses_duplicates() {
        let (tmp, src, stager) = setup();
        let other = tmp.path().join("other");
        fs::create_dir_all(&other).unwrap();
        fs::write(other.join("a.txt"), "second").unwrap();

        let staged = stager
            .stage(&[src.join("a.txt"), src.join("a.txt"), other.join("a.txt")])
            .unwrap();
        assert_eq!(staged, vec![stager.dir().join("a.txt")]);
        assert_eq!(fs::read_to_string(&staged[0]).unwrap(), "second");
    }

    #[test]
    fn test_restage_from_managed_dir_keeps_content() {
        let (_tmp, src, stager) = setup();
        let staged = stager.stage(&[src.join("a.txt")]).unwrap();
        let again = stager.stage(&staged).unwrap();
        assert_eq!(again, staged);
        assert_eq!(fs::read_to_string(&again[0]).unwrap(), "alpha");
    }

    #[test]
    fn test_stage_then_unstage_restores_directory() {
        let (_tmp, src, stager) = setup();
        fs::create_dir_all(stager.dir()).unwrap();
        fs::write(stager.dir().join("keep.txt"), "keep").unwrap();

        let staged = stager.stage(&[src.join("a.txt"), src.join("b.md")]).unwrap();
        let deleted = stager.unstage(&staged).unwrap();
        assert_eq!(deleted, staged);

        let remaining: Vec<_> = fs::read_dir(stager.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(remaining, vec![std::ffi::OsString::from("keep.txt")]);
    }

    #[test]
    fn test_unstage_never_deletes_outside_files() {
        let (_tmp, src, stager) = setup();
        stager.stage(&[src.join("a.txt")]).unwrap();

        let deleted = stager.unstage(&[src.join("a.txt")]).unwrap();
        assert!(deleted.is_empty());
        assert!(src.join("a.txt").exists());
    }

    #[test]
    fn test_unstage_rejects_nested_paths() {
        let (_tmp, src, stager) = setup();
        let nested = stager.dir().join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::copy(src.join("a.txt"), nested.join("a.txt")).unwrap();

        let deleted = stager.unstage(&[nested.join("a.txt")]).unwrap();
        assert!(deleted.is_empty());
        assert!(nested.join("a.txt").exists());
    }

    #[test]
    fn test_unstage_without_directory_is_not_initialized() {
        let (_tmp, src, stager) = setup();
        let err = stager.unstage(&[src.join("a.txt")]).unwrap_err();
        assert!(matches!(classify(&err), Some(ContextError::NotInitialized(_))));
    }

    #[test]
    fn test_staged_files_filters_by_glob() {
        let (_tmp, src, stager) = setup();
        stager.stage(&[src.join("a.txt"), src.join("b.md")]).unwrap();

        let only_txt = build_globset(&["**/*.txt".to_string()]).unwrap();
        assert_eq!(
            stager.staged_files(&only_txt).unwrap(),
            vec![stager.dir().join("a.txt")]
        );

        let all = build_globset(&["**/*".to_string()]).unwrap();
        assert_eq!(stager.staged_files(&all).unwrap().len(), 2);
    }

    #[test]
    fn test_staged_files_missing_directory_is_empty() {
        let (_tmp, _src, stager) = setup();
        let all = build_globset(&["**/*".to_string()]).unwrap();
        assert!(stager.staged_files(&all).unwrap().is_empty());
    }
}
