use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;

use camino::Utf8Path;

use crate::config::AppPaths;
use crate::domain::{FeedKind, Outcome, ResultStatus};
use crate::error::MirrorError;
use crate::fs_util::{backup_file, is_non_empty_file, write_atomic};
use crate::record::{DELETE_COLUMNS, DeleteRecord, FetchRecord, record_from_row, record_to_row};

pub struct ReportWriter<'a> {
    paths: &'a AppPaths,
    feed: FeedKind,
}

impl<'a> ReportWriter<'a> {
    pub fn new(paths: &'a AppPaths, feed: FeedKind) -> Self {
        Self { paths, feed }
    }

    pub fn write(&self, records: &[FetchRecord], deletes: &[DeleteRecord]) -> Result<(), MirrorError> {
        let mut first_error = None;

        let snapshot = read_snapshot(self.feed, &self.paths.data_file)
            .map(|prior| merge_records(prior, records))
            .and_then(|merged| {
                tracing::info!(file = %self.paths.data_file, rows = merged.len(), "writing snapshot");
                write_records(self.feed, &self.paths.data_file, &merged)
            });
        if let Err(err) = snapshot {
            tracing::error!(file = %self.paths.data_file, error = %err, "snapshot not written");
            first_error.get_or_insert(err);
        }

        let mut current = records.to_vec();
        sort_records(&mut current);
        if let Err(err) = write_records(self.feed, &self.paths.report_file, &current) {
            tracing::error!(file = %self.paths.report_file, error = %err, "report not written");
            first_error.get_or_insert(err);
        }

        if let Err(err) = self.write_extras(deletes) {
            first_error.get_or_insert(err);
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Used when no list was built: the snapshot and the dated report are
    /// left as they are.
    pub fn write_extras(&self, deletes: &[DeleteRecord]) -> Result<(), MirrorError> {
        append_deletes(&self.paths.extras_file, deletes).inspect_err(|err| {
            tracing::error!(file = %self.paths.extras_file, error = %err, "extras not written");
        })
    }
}

pub fn read_snapshot(kind: FeedKind, path: &Utf8Path) -> Result<Vec<FetchRecord>, MirrorError> {
    if !is_non_empty_file(path) {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path.as_std_path())
        .map_err(|err| MirrorError::Csv(format!("open {path}: {err}")))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| MirrorError::Csv(format!("read header {path}: {err}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let parsed = row
            .map_err(|err| MirrorError::Csv(err.to_string()))
            .and_then(|row| {
                let cells: Vec<String> = row.iter().map(str::to_string).collect();
                record_from_row(kind, &headers, &cells)
            });
        match parsed {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(file = %path, row = line + 1, error = %err, "skipping snapshot row"),
        }
    }
    tracing::debug!(file = %path, rows = records.len(), "prior snapshot");
    Ok(records)
}

pub fn merge_records(prior: Vec<FetchRecord>, current: &[FetchRecord]) -> Vec<FetchRecord> {
    let mut merged: HashMap<String, FetchRecord> = prior
        .into_iter()
        .map(|record| (record.filename.clone(), record))
        .collect();
    for record in current {
        if record.is_cache_hit() && merged.contains_key(&record.filename) {
            continue;
        }
        merged.insert(record.filename.clone(), record.clone());
    }
    let mut merged: Vec<FetchRecord> = merged.into_values().collect();
    sort_records(&mut merged);
    merged
}

pub fn sort_records(records: &mut [FetchRecord]) {
    records.sort_by(|a, b| {
        (&b.content_type, b.date_remote, &b.filename).cmp(&(&a.content_type, a.date_remote, &a.filename))
    });
}

fn write_records(kind: FeedKind, path: &Utf8Path, records: &[FetchRecord]) -> Result<(), MirrorError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(kind.columns())
        .map_err(|err| MirrorError::Csv(err.to_string()))?;
    for record in records {
        writer
            .write_record(record_to_row(record))
            .map_err(|err| MirrorError::Csv(err.to_string()))?;
    }
    let content = writer
        .into_inner()
        .map_err(|err| MirrorError::Csv(err.to_string()))?;

    backup_existing(path);
    write_atomic(path, &content)
}

pub fn append_deletes(path: &Utf8Path, deletes: &[DeleteRecord]) -> Result<(), MirrorError> {
    if deletes.is_empty() {
        return Ok(());
    }
    let needs_header = !is_non_empty_file(path);
    if !needs_header {
        backup_existing(path);
    } else if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("create {parent}: {err}")))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_std_path())
        .map_err(|err| MirrorError::Filesystem(format!("open {path}: {err}")))?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if needs_header {
        writer
            .write_record(DELETE_COLUMNS)
            .map_err(|err| MirrorError::Csv(err.to_string()))?;
    }
    for record in deletes {
        writer
            .write_record(record.to_row())
            .map_err(|err| MirrorError::Csv(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| MirrorError::Filesystem(format!("write {path}: {err}")))?;
    tracing::info!(file = %path, rows = deletes.len(), "extras appended");
    Ok(())
}

fn backup_existing(path: &Utf8Path) {
    if !path.as_std_path().exists() {
        return;
    }
    match backup_file(path) {
        Ok(backup) => tracing::debug!(file = %path, backup = %backup, "backed up"),
        Err(err) => tracing::warn!(file = %path, error = %err, "backup failed"),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub records: usize,
    outcomes: HashMap<Outcome, usize>,
    results: HashMap<ResultStatus, usize>,
}

impl RunSummary {
    pub fn build(records: &[FetchRecord], deletes: &[DeleteRecord]) -> Self {
        let mut summary = Self {
            records: records.len(),
            ..Self::default()
        };
        let states = records
            .iter()
            .map(|record| (record.outcome, record.result))
            .chain(deletes.iter().map(|record| (record.outcome, record.result)));
        for (outcome, result) in states {
            *summary.outcomes.entry(outcome).or_default() += 1;
            *summary.results.entry(result).or_default() += 1;
        }
        summary
    }

    pub fn outcome(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    pub fn result(&self, result: ResultStatus) -> usize {
        self.results.get(&result).copied().unwrap_or(0)
    }

    pub fn changes(&self) -> usize {
        [Outcome::Created, Outcome::Updated, Outcome::Archived, Outcome::Deleted]
            .into_iter()
            .map(|outcome| self.outcome(outcome))
            .sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records:  {}", self.records)?;
        writeln!(f, "Cached:   {}", self.outcome(Outcome::Cached))?;
        writeln!(f, "Created:  {}", self.outcome(Outcome::Created))?;
        writeln!(f, "Updated:  {}", self.outcome(Outcome::Updated))?;
        writeln!(f, "Nil:      {}", self.outcome(Outcome::Nil))?;
        writeln!(f, "Archived: {}", self.outcome(Outcome::Archived))?;
        writeln!(f, "Deleted:  {}", self.outcome(Outcome::Deleted))?;
        writeln!(f, "Results")?;
        writeln!(f, "Warnings: {}", self.result(ResultStatus::Warning))?;
        writeln!(f, "Errors:   {}", self.result(ResultStatus::Error))?;
        write!(f, "Nil:      {}", self.result(ResultStatus::Nil))
    }
}
