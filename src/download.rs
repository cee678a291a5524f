use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Instant, SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local, NaiveDate};
use filetime::FileTime;
use url::Url;

use crate::config::{AppPaths, ResolvedConfig};
use crate::domain::{Outcome, ResultStatus};
use crate::error::MirrorError;
use crate::http::{HttpResponse, HttpSource};
use crate::record::FetchRecord;
use crate::sanitize::is_plain_relative;

const BUFFER_SIZE: usize = 1024 * 1024;
const DECIMAL_PREFIXES: [&str; 6] = ["k", "M", "G", "T", "P", "E"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    Missing,
    Fresh,
    Stale,
}

pub struct FileFetcher<'a, H: HttpSource> {
    paths: &'a AppPaths,
    http: &'a H,
    workers: usize,
    max_redirects: usize,
}

impl<'a, H: HttpSource> FileFetcher<'a, H> {
    pub fn new(config: &'a ResolvedConfig, http: &'a H) -> Self {
        Self {
            paths: &config.paths,
            http,
            workers: config.workers.max(1),
            max_redirects: config.http.max_redirects,
        }
    }

    pub fn process(&self, records: &mut [FetchRecord]) -> usize {
        let jobs = self.claim_destinations(records);
        self.create_directories(records, &jobs);
        tracing::debug!(jobs = jobs.len(), workers = self.workers, "dispatching downloads");

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, FetchRecord)>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, FetchRecord)>();
        for &index in &jobs {
            if job_tx.send((index, records[index].clone())).is_err() {
                break;
            }
        }
        drop(job_tx);

        thread::scope(|scope| {
            for _ in 0..self.workers.min(jobs.len()) {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for (index, mut record) in job_rx.iter() {
                        self.fetch_record(&mut record, index + 1);
                        if done_tx.send((index, record)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(done_tx);

            for (index, record) in done_rx.iter() {
                records[index] = record;
            }
        });

        jobs.len()
    }

    pub fn local_state(&self, record: &FetchRecord) -> Result<LocalState, MirrorError> {
        let path = self.paths.download_path(&record.filepath);
        if !path.as_std_path().exists() {
            return Ok(LocalState::Missing);
        }
        let local_date = modified_date(&path)?;
        tracing::debug!(file = %record.filename, %local_date, remote_date = %record.date_remote, "dates");
        Ok(if local_date >= record.date_remote {
            LocalState::Fresh
        } else {
            LocalState::Stale
        })
    }

    fn claim_destinations(&self, records: &mut [FetchRecord]) -> Vec<usize> {
        let mut claimed = HashSet::new();
        let mut jobs = Vec::new();
        for (index, record) in records.iter_mut().enumerate() {
            if !record.to_download {
                continue;
            }
            if !is_plain_relative(&record.filepath) {
                tracing::error!(filepath = %record.filepath, "destination leaves the downloads directory; skipping");
                record.set_state(Outcome::Nil, ResultStatus::Error);
                continue;
            }
            if claimed.insert(record.filepath.clone()) {
                jobs.push(index);
            } else {
                tracing::warn!(filepath = %record.filepath, "destination already claimed; skipping");
                record.set_state(Outcome::Nil, ResultStatus::Warning);
            }
        }
        jobs
    }

    fn create_directories(&self, records: &[FetchRecord], jobs: &[usize]) {
        let dirs: HashSet<Utf8PathBuf> = jobs
            .iter()
            .filter_map(|&index| {
                self.paths
                    .download_path(&records[index].filepath)
                    .parent()
                    .map(Utf8Path::to_path_buf)
            })
            .collect();
        for dir in dirs {
            if let Err(err) = fs::create_dir_all(dir.as_std_path()) {
                tracing::warn!(dir = %dir, error = %err, "cannot create directory");
            }
        }
    }

    fn fetch_record(&self, record: &mut FetchRecord, id: usize) {
        record.set_state(Outcome::Nil, ResultStatus::Error);

        let state = match self.local_state(record) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(id, file = %record.filename, error = %err, "cannot read local file date");
                LocalState::Stale
            }
        };
        tracing::debug!(id, file = %record.filename, ?state, "local state");
        if state == LocalState::Fresh {
            record.set_state(Outcome::Cached, ResultStatus::Success);
            return;
        }

        let existed = state != LocalState::Missing;
        self.fetch_file(record, existed, id);
    }

    fn fetch_file(&self, record: &mut FetchRecord, existed: bool, id: usize) {
        let path = self.paths.download_path(&record.filepath);
        tracing::info!(id, file = %record.filename, dir = %record.filepath.parent().unwrap_or(Utf8Path::new("")), "fetching");
        tracing::debug!(id, url = %record.url, "GET");

        let start = Instant::now();
        let response = match self.get_following_redirects(&record.url, id) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(id, url = %record.url, error = %err, "request failed");
                return;
            }
        };

        if response.status != 200 {
            tracing::error!(id, url = %record.url, status = response.status, "unexpected HTTP status");
            remove_partial(&path, id);
            record.set_state(Outcome::Deleted, ResultStatus::Error);
            return;
        }

        tracing::debug!(id, file = %record.filename, "write");
        let size = match stream_to_file(response.body, &path) {
            Ok(size) => size,
            Err(err) => {
                tracing::error!(id, file = %path, error = %err, "transfer failed");
                remove_partial(&path, id);
                record.set_state(Outcome::Deleted, ResultStatus::Error);
                return;
            }
        };

        let outcome = if existed {
            Outcome::Updated
        } else {
            Outcome::Created
        };
        let result = match set_modified_date(&path, record.date_remote) {
            Ok(()) => ResultStatus::Success,
            Err(err) => {
                tracing::warn!(id, file = %path, error = %err, "cannot set file time");
                ResultStatus::Warning
            }
        };
        record.set_state(outcome, result);
        tracing::debug!(
            id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            size = %decimal_units(size),
            "fetched"
        );
    }

    fn get_following_redirects(&self, url: &str, id: usize) -> Result<HttpResponse, MirrorError> {
        let mut current = url.to_string();
        let mut response = self.http.get(&current, &[])?;
        tracing::debug!(id, status = response.status, "response");
        let mut hops = 0usize;
        while response.is_redirect() {
            if hops >= self.max_redirects {
                return Err(MirrorError::TooManyRedirects(url.to_string()));
            }
            let location = response
                .location
                .as_deref()
                .ok_or_else(|| MirrorError::RedirectWithoutLocation(current.clone()))?;
            let next = resolve_location(&current, location);
            tracing::debug!(id, from = %current, to = %next, "redirect");
            current = next;
            hops += 1;
            response = self.http.get(&current, &[])?;
            tracing::debug!(id, status = response.status, "response");
        }
        Ok(response)
    }
}

fn resolve_location(base: &str, location: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(location))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| location.to_string())
}

fn stream_to_file(mut body: Box<dyn Read + Send>, path: &Utf8Path) -> io::Result<u64> {
    let mut file = File::create(path.as_std_path())?;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let read = match body.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        file.write_all(&buffer[..read])?;
        total += read as u64;
    }
    file.flush()?;
    Ok(total)
}

fn remove_partial(path: &Utf8Path, id: usize) {
    if !path.as_std_path().exists() {
        return;
    }
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => tracing::debug!(id, file = %path, "deleted"),
        Err(err) => tracing::error!(id, file = %path, error = %err, "cannot delete file"),
    }
}

pub fn modified_date(path: &Utf8Path) -> Result<NaiveDate, MirrorError> {
    let modified: SystemTime = fs::metadata(path.as_std_path())
        .and_then(|meta| meta.modified())
        .map_err(|err| MirrorError::Filesystem(format!("stat {path}: {err}")))?;
    Ok(DateTime::<Local>::from(modified).date_naive())
}

pub fn set_modified_date(path: &Utf8Path, date: NaiveDate) -> Result<(), MirrorError> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .ok_or_else(|| MirrorError::InvalidDate(date.to_string()))?;
    let time = FileTime::from_unix_time(midnight.timestamp(), 0);
    filetime::set_file_times(path.as_std_path(), time, time)
        .map_err(|err| MirrorError::Filesystem(format!("set times {path}: {err}")))
}

/// Byte count with a decimal metric prefix, kept to at most four digits.
pub fn decimal_units(bytes: u64) -> String {
    if bytes < 10_000 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut prefix = DECIMAL_PREFIXES[0];
    for candidate in DECIMAL_PREFIXES {
        value /= 1000.0;
        prefix = candidate;
        if value.round() < 10_000.0 {
            break;
        }
    }
    format!("{} {prefix}B", value.round() as u64)
}
