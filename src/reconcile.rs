use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDate};
use walkdir::WalkDir;

use crate::config::AppPaths;
use crate::domain::{Outcome, ResultStatus};
use crate::record::DeleteRecord;
use crate::sanitize::is_within;

pub struct DirectoryReconciler<'a> {
    paths: &'a AppPaths,
    today: NaiveDate,
}

impl<'a> DirectoryReconciler<'a> {
    pub fn new(paths: &'a AppPaths) -> Self {
        Self {
            paths,
            today: Local::now().date_naive(),
        }
    }

    pub fn process(&self, expected: &HashSet<Utf8PathBuf>) -> Vec<DeleteRecord> {
        tracing::debug!(root = %self.paths.downloads_dir, expected = expected.len(), "reconciling");
        let mut records = self.delete_empty_files();
        records.extend(self.archive_extra_files(expected));
        self.delete_empty_directories();
        records
    }

    fn delete_empty_files(&self) -> Vec<DeleteRecord> {
        let mut records = Vec::new();
        for path in list_files(&self.paths.downloads_dir) {
            let is_empty = fs::metadata(path.as_std_path())
                .map(|meta| meta.len() == 0)
                .unwrap_or(false);
            if !is_empty {
                continue;
            }
            tracing::warn!(file = %self.display_path(&path), "delete empty file");
            let mut record = self.delete_record(&path, Outcome::Deleted);
            match fs::remove_file(path.as_std_path()) {
                Ok(()) => record.result = ResultStatus::Success,
                Err(err) => tracing::error!(file = %path, error = %err, "cannot delete empty file"),
            }
            records.push(record);
        }
        records
    }

    fn archive_extra_files(&self, expected: &HashSet<Utf8PathBuf>) -> Vec<DeleteRecord> {
        let archive_dir = &self.paths.archive_dir;
        let local_files = list_files(&self.paths.downloads_dir);
        tracing::debug!(local = local_files.len(), remote = expected.len(), "file counts");

        let orphans: Vec<Utf8PathBuf> = local_files
            .into_iter()
            .filter(|path| {
                !expected.contains(path) && !is_within(archive_dir.as_std_path(), path.as_std_path())
            })
            .collect();
        if orphans.is_empty() {
            return Vec::new();
        }

        if let Err(err) = fs::create_dir_all(archive_dir.as_std_path()) {
            tracing::error!(dir = %archive_dir, error = %err, "cannot create archive directory");
        }

        let mut records = Vec::with_capacity(orphans.len());
        for path in orphans {
            tracing::info!(file = %self.display_path(&path), "archiving");
            let mut record = self.delete_record(&path, Outcome::Archived);
            let target = archive_target(archive_dir, path.file_name().unwrap_or_default());
            match fs::rename(path.as_std_path(), target.as_std_path()) {
                Ok(()) => record.result = ResultStatus::Success,
                Err(err) => tracing::error!(file = %path, error = %err, "cannot archive file"),
            }
            records.push(record);
        }
        records
    }

    fn delete_empty_directories(&self) {
        let root = &self.paths.downloads_dir;
        if !root.as_std_path().is_dir() {
            return;
        }
        for entry in WalkDir::new(root.as_std_path()).min_depth(1).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "cannot walk downloads tree");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let is_empty = fs::read_dir(entry.path())
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if is_empty {
                tracing::info!(dir = %entry.path().display(), "delete empty dir");
                if let Err(err) = fs::remove_dir(entry.path()) {
                    tracing::warn!(dir = %entry.path().display(), error = %err, "cannot delete dir");
                }
            }
        }
    }

    fn delete_record(&self, path: &Utf8Path, outcome: Outcome) -> DeleteRecord {
        DeleteRecord {
            content_type: path
                .parent()
                .and_then(Utf8Path::file_name)
                .unwrap_or_default()
                .to_string(),
            date_deleted: self.today,
            filename: path.file_name().unwrap_or_default().to_string(),
            filepath: path.to_path_buf(),
            outcome,
            result: ResultStatus::Error,
        }
    }

    fn display_path<'p>(&self, path: &'p Utf8Path) -> &'p Utf8Path {
        path.strip_prefix(&self.paths.downloads_base).unwrap_or(path)
    }
}

pub fn list_files(root: &Utf8Path) -> Vec<Utf8PathBuf> {
    if !root.as_std_path().is_dir() {
        return Vec::new();
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root.as_std_path()).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "cannot walk downloads tree");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(path) => files.push(path),
            Err(path) => tracing::warn!(file = %path.display(), "skipping non UTF-8 path"),
        }
    }
    files
}

fn archive_target(archive_dir: &Utf8Path, filename: &str) -> Utf8PathBuf {
    let candidate = archive_dir.join(filename);
    if !candidate.as_std_path().exists() {
        return candidate;
    }
    let (stem, extension) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    };
    (1..)
        .map(|n| archive_dir.join(format!("{stem} ({n}){extension}")))
        .find(|path| !path.as_std_path().exists())
        .unwrap_or(candidate)
}
