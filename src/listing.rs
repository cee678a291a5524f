use std::fs;
use std::time::{Duration, SystemTime};

use camino::Utf8PathBuf;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::domain::{DateGranularity, FeedKind};
use crate::error::MirrorError;
use crate::feed::build_record;
use crate::fs_util::write_atomic;
use crate::http::HttpSource;
use crate::record::FetchRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSummary {
    pub written: WrittenAt,
    pub count: u64,
    pub pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrittenAt {
    pub utc: String,
    pub local: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListSource {
    Cache,
    Remote,
}

#[derive(Debug)]
pub struct RecordList {
    pub source: ListSource,
    pub pages: usize,
    pub records: Vec<FetchRecord>,
}

struct FetchedPage {
    body: Value,
    count: u64,
    total_hits: u64,
    cache_file: Option<Utf8PathBuf>,
}

pub struct ListFetcher<'a, H: HttpSource> {
    config: &'a ResolvedConfig,
    http: &'a H,
}

impl<'a, H: HttpSource> ListFetcher<'a, H> {
    pub fn new(config: &'a ResolvedConfig, http: &'a H) -> Self {
        Self { config, http }
    }

    pub fn build_list(&self) -> Result<RecordList, MirrorError> {
        let cache_dir = &self.config.paths.cache_dir;
        tracing::debug!(cache_dir = %cache_dir, "building list");

        let use_cache = self.is_cache_valid();
        tracing::info!(use_cache, "list source");

        let cached = if use_cache {
            self.read_complete_cache()?
        } else {
            None
        };
        let (source, pages) = match cached {
            Some(pages) => (ListSource::Cache, pages),
            None => {
                fs::create_dir_all(cache_dir.as_std_path())
                    .map_err(|err| MirrorError::Filesystem(format!("create {cache_dir}: {err}")))?;
                (ListSource::Remote, self.fetch_pages()?)
            }
        };

        let records = parse_pages(self.config.feed, &pages, self.config.filename_date);
        tracing::info!(records = records.len(), pages = pages.len(), "list built");
        Ok(RecordList {
            source,
            pages: pages.len(),
            records,
        })
    }

    pub fn is_cache_valid(&self) -> bool {
        if self.config.cache_age_secs == 0 {
            return false;
        }
        let modified = match fs::metadata(self.config.paths.summary_file.as_std_path())
            .and_then(|meta| meta.modified())
        {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        SystemTime::now()
            .checked_sub(Duration::from_secs(self.config.cache_age_secs))
            .map(|threshold| modified > threshold)
            .unwrap_or(false)
    }

    /// Cached pages, or `None` when they no longer add up to the summary's
    /// hit count (single-item pages are never cached).
    fn read_complete_cache(&self) -> Result<Option<Vec<Value>>, MirrorError> {
        let summary_file = &self.config.paths.summary_file;
        let content = fs::read_to_string(summary_file.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("read {summary_file}: {err}")))?;
        let summary: CacheSummary = match serde_json::from_str(&content) {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(file = %summary_file, error = %err, "unreadable cache summary");
                return Ok(None);
            }
        };

        let pages = self.read_cached_pages()?;
        let mut cached = 0u64;
        for (page, body) in pages.iter().enumerate() {
            let metadata = body.get("metadata").ok_or_else(|| MirrorError::ListParse {
                page: page as u32,
                message: "missing metadata".to_string(),
            })?;
            cached += metadata_number(metadata, "count", page as u32)?;
        }
        if cached != summary.count {
            tracing::info!(cached, expected = summary.count, "cache incomplete; refetching");
            return Ok(None);
        }
        Ok(Some(pages))
    }

    fn read_cached_pages(&self) -> Result<Vec<Value>, MirrorError> {
        let cache_dir = &self.config.paths.cache_dir;
        let mut files = Vec::new();
        for entry in fs::read_dir(cache_dir.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("read {cache_dir}: {err}")))?
        {
            let entry = entry.map_err(|err| MirrorError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if path.is_file()
                && path.extension() == Some("json")
                && path != self.config.paths.summary_file
            {
                files.push(path);
            }
        }
        files.sort();

        let mut pages = Vec::with_capacity(files.len());
        for (page, path) in files.iter().enumerate() {
            tracing::debug!(file = %path, "read cached page");
            let content = fs::read_to_string(path.as_std_path())
                .map_err(|err| MirrorError::Filesystem(format!("read {path}: {err}")))?;
            let body: Value = serde_json::from_str(&content).map_err(|err| MirrorError::ListParse {
                page: page as u32,
                message: err.to_string(),
            })?;
            pages.push(body);
        }
        Ok(pages)
    }

    fn fetch_pages(&self) -> Result<Vec<Value>, MirrorError> {
        tracing::info!(url = %self.config.source_url, "fetching list");

        let mut pages = Vec::new();
        let mut cache_files = Vec::new();
        let mut hits_count = 0u64;
        let mut page_num = 0u32;
        loop {
            let page = self.fetch_page(page_num)?;
            tracing::debug!(
                page = page_num,
                total_hits = page.total_hits,
                hits_count,
                count = page.count,
                "page fetched"
            );
            if page.count < 1 {
                break;
            }
            hits_count += page.count;
            pages.push(page.body);
            cache_files.extend(page.cache_file);
            if hits_count >= page.total_hits {
                break;
            }
            page_num += 1;
        }

        let summary_file = &self.config.paths.summary_file;
        self.write_summary(hits_count, cache_files.len())?;
        cache_files.push(summary_file.clone());
        self.prune_cache(&cache_files);

        Ok(pages)
    }

    fn fetch_page(&self, page_num: u32) -> Result<FetchedPage, MirrorError> {
        tracing::info!(page = page_num, "fetch list page");

        let mut query: Vec<(String, String)> = self
            .config
            .source_parameters
            .iter()
            .filter(|(key, _)| *key != self.config.page_parameter)
            .cloned()
            .collect();
        query.push((self.config.page_parameter.clone(), page_num.to_string()));

        let response = self.http.get(&self.config.source_url, &query)?;
        tracing::debug!(page = page_num, status = response.status, "list response");
        if response.status != 200 {
            return Err(MirrorError::ListStatus {
                page: page_num,
                status: response.status,
            });
        }

        let text = response.text()?;
        let body: Value = serde_json::from_str(&text).map_err(|err| MirrorError::ListParse {
            page: page_num,
            message: err.to_string(),
        })?;
        let metadata = body.get("metadata").ok_or_else(|| MirrorError::ListParse {
            page: page_num,
            message: "missing metadata".to_string(),
        })?;
        let count = metadata_number(metadata, "count", page_num)?;
        let total_hits = metadata_number(metadata, "totalHits", page_num)?;

        let cache_file = if count > 1 {
            let path = self
                .config
                .paths
                .cache_dir
                .join(format!("{}.{page_num:03}.json", self.config.name));
            let content = serde_json::to_vec_pretty(&body)
                .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
            tracing::debug!(page = page_num, file = %path, "write cached page");
            write_atomic(&path, &content)?;
            Some(path)
        } else {
            None
        };

        Ok(FetchedPage {
            body,
            count,
            total_hits,
            cache_file,
        })
    }

    fn write_summary(&self, count: u64, pages: usize) -> Result<(), MirrorError> {
        let summary = CacheSummary {
            written: WrittenAt {
                utc: Utc::now().to_rfc3339(),
                local: Local::now().to_rfc3339(),
            },
            count,
            pages,
        };
        let content = serde_json::to_vec_pretty(&summary)
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        write_atomic(&self.config.paths.summary_file, &content)
    }

    fn prune_cache(&self, keep: &[Utf8PathBuf]) {
        let cache_dir = &self.config.paths.cache_dir;
        let entries = match fs::read_dir(cache_dir.as_std_path()) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(cache_dir = %cache_dir, error = %err, "cannot scan cache");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || keep.iter().any(|kept| kept.as_std_path() == path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(file = %path.display(), "removed stale cache file"),
                Err(err) => {
                    tracing::warn!(file = %path.display(), error = %err, "cannot remove stale cache file")
                }
            }
        }
    }
}

pub fn parse_pages(kind: FeedKind, pages: &[Value], granularity: DateGranularity) -> Vec<FetchRecord> {
    let mut records = Vec::new();
    for page in pages {
        let Some(items) = page.get("items").and_then(|items| items.as_array()) else {
            continue;
        };
        for group in items {
            let item = group.get("item").unwrap_or(group);
            match build_record(kind, item, granularity) {
                Ok(record) => {
                    tracing::debug!(title = %record.title, "record built");
                    records.push(record);
                }
                Err(err) => {
                    let name = item.get("name").and_then(|name| name.as_str()).unwrap_or("?");
                    tracing::warn!(item = name, error = %err, "skipping list item");
                }
            }
        }
    }
    records
}

fn metadata_number(metadata: &Value, key: &str, page: u32) -> Result<u64, MirrorError> {
    let value = metadata.get(key);
    value
        .and_then(|value| value.as_u64())
        .or_else(|| value.and_then(|value| value.as_str()).and_then(|text| text.trim().parse().ok()))
        .ok_or_else(|| MirrorError::ListParse {
            page,
            message: format!("metadata.{key} is missing or not a number"),
        })
}
