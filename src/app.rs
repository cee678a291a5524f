use std::collections::HashSet;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::download::{FileFetcher, LocalState};
use crate::error::MirrorError;
use crate::http::HttpSource;
use crate::listing::{ListFetcher, ListSource};
use crate::reconcile::DirectoryReconciler;
use crate::record::{DeleteRecord, FetchRecord};
use crate::report::{ReportWriter, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    List,
    Download,
    Reconcile,
    Report,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug)]
pub struct RunReport {
    pub source: ListSource,
    pub downloads: usize,
    pub records: Vec<FetchRecord>,
    pub deletes: Vec<DeleteRecord>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Skip,
    Cached,
    Fetch,
    Refresh,
    Conflict,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub filepath: String,
    pub date_remote: String,
    pub action: PlanAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub source: ListSource,
    pub entries: Vec<PlanEntry>,
}

impl PlanResult {
    pub fn count(&self, action: PlanAction) -> usize {
        self.entries.iter().filter(|entry| entry.action == action).count()
    }
}

pub struct App<H: HttpSource> {
    config: ResolvedConfig,
    http: H,
}

impl<H: HttpSource> App<H> {
    pub fn new(config: ResolvedConfig, http: H) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Lists, downloads, reconciles, then reports. Reporting runs even when
    /// an earlier phase fails; that failure is returned afterwards.
    pub fn run(&self, sink: &dyn ProgressSink) -> Result<RunReport, MirrorError> {
        let mut records = Vec::new();
        let mut deletes = Vec::new();
        let stages = self.run_stages(&mut records, &mut deletes, sink);

        let start = Instant::now();
        let writer = ReportWriter::new(&self.config.paths, self.config.feed);
        let written = if stages.is_ok() {
            writer.write(&records, &deletes)
        } else {
            tracing::warn!(file = %self.config.paths.report_file, "list not built; keeping existing reports");
            writer.write_extras(&deletes)
        };
        sink.event(ProgressEvent {
            phase: Phase::Report,
            message: format!("wrote reports under {}", self.config.paths.cache_base),
            elapsed: Some(start.elapsed()),
        });

        let summary = RunSummary::build(&records, &deletes);
        for line in summary.to_string().lines() {
            tracing::info!("{line}");
        }

        let (source, downloads) = stages?;
        written?;
        Ok(RunReport {
            source,
            downloads,
            records,
            deletes,
            summary,
        })
    }

    pub fn plan(&self, sink: &dyn ProgressSink) -> Result<PlanResult, MirrorError> {
        let start = Instant::now();
        let list = ListFetcher::new(&self.config, &self.http).build_list()?;
        sink.event(ProgressEvent {
            phase: Phase::List,
            message: format!("{} records from {} pages", list.records.len(), list.pages),
            elapsed: Some(start.elapsed()),
        });

        let fetcher = FileFetcher::new(&self.config, &self.http);
        let mut claimed = HashSet::new();
        let entries = list
            .records
            .iter()
            .map(|record| {
                let action = if !record.to_download {
                    PlanAction::Skip
                } else if !claimed.insert(record.filepath.clone()) {
                    PlanAction::Conflict
                } else {
                    match fetcher.local_state(record) {
                        Ok(LocalState::Fresh) => PlanAction::Cached,
                        Ok(LocalState::Missing) => PlanAction::Fetch,
                        Ok(LocalState::Stale) | Err(_) => PlanAction::Refresh,
                    }
                };
                PlanEntry {
                    filepath: record.filepath.to_string(),
                    date_remote: record.date_remote.to_string(),
                    action,
                }
            })
            .collect();

        Ok(PlanResult {
            source: list.source,
            entries,
        })
    }

    fn run_stages(
        &self,
        records: &mut Vec<FetchRecord>,
        deletes: &mut Vec<DeleteRecord>,
        sink: &dyn ProgressSink,
    ) -> Result<(ListSource, usize), MirrorError> {
        let start = Instant::now();
        let list = ListFetcher::new(&self.config, &self.http)
            .build_list()
            .inspect_err(|err| tracing::error!(error = %err, "list build failed"))?;
        sink.event(ProgressEvent {
            phase: Phase::List,
            message: format!("{} records from {} pages", list.records.len(), list.pages),
            elapsed: Some(start.elapsed()),
        });
        *records = list.records;

        let start = Instant::now();
        let downloads = FileFetcher::new(&self.config, &self.http).process(records);
        sink.event(ProgressEvent {
            phase: Phase::Download,
            message: format!("{downloads} downloads processed"),
            elapsed: Some(start.elapsed()),
        });

        let start = Instant::now();
        let expected: HashSet<Utf8PathBuf> = records
            .iter()
            .map(|record| self.config.paths.download_path(&record.filepath))
            .collect();
        *deletes = DirectoryReconciler::new(&self.config.paths).process(&expected);
        sink.event(ProgressEvent {
            phase: Phase::Reconcile,
            message: format!("{} files removed or archived", deletes.len()),
            elapsed: Some(start.elapsed()),
        });

        Ok((list.source, downloads))
    }
}
