use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDate};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{DateGranularity, FeedKind};
use crate::error::MirrorError;

const DEFAULT_CACHE_AGE_SECS: u64 = 300;
const DEFAULT_WORKERS: usize = 6;
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_RETRIES: usize = 4;
const DEFAULT_BACKOFF_MS: u64 = 3000;
const DEFAULT_MAX_REDIRECTS: usize = 5;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub name: String,
    pub feed: FeedKind,
    #[serde(default)]
    pub base_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub local: LocalSection,
    pub remote: RemoteSection,
    #[serde(default)]
    pub fetch: FetchSection,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSection {
    #[serde(default = "default_cache_dir")]
    pub local_path: Utf8PathBuf,
    #[serde(default = "default_cache_age")]
    pub age: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            local_path: default_cache_dir(),
            age: default_cache_age(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSection {
    #[serde(default = "default_downloads_dir")]
    pub local_path: Utf8PathBuf,
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            local_path: default_downloads_dir(),
            archive_name: default_archive_name(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSection {
    pub url_loc: String,
    #[serde(default)]
    pub url_parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_page_parameter")]
    pub page_parameter: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSection {
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub backoff_ms: Option<u64>,
    #[serde(default)]
    pub max_redirects: Option<usize>,
    #[serde(default)]
    pub filename_date: Option<DateGranularity>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_path: Option<Utf8PathBuf>,
    pub workers: Option<usize>,
    pub cache_age_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub backoff_ms: u64,
    pub max_redirects: usize,
    pub pool_size: usize,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub name: String,
    pub feed: FeedKind,
    pub source_url: String,
    pub source_parameters: Vec<(String, String)>,
    pub page_parameter: String,
    pub cache_age_secs: u64,
    pub workers: usize,
    pub filename_date: DateGranularity,
    pub http: HttpSettings,
    pub paths: AppPaths,
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub cache_base: Utf8PathBuf,
    pub cache_dir: Utf8PathBuf,
    pub summary_file: Utf8PathBuf,
    pub downloads_base: Utf8PathBuf,
    pub downloads_dir: Utf8PathBuf,
    pub archive_dir: Utf8PathBuf,
    pub data_file: Utf8PathBuf,
    pub report_file: Utf8PathBuf,
    pub extras_file: Utf8PathBuf,
}

impl AppPaths {
    pub fn new(
        base: &Utf8Path,
        name: &str,
        cache: &Utf8Path,
        downloads: &Utf8Path,
        archive_name: &str,
        today: NaiveDate,
    ) -> Self {
        let cache_base = base.join(cache);
        let cache_dir = cache_base.join(name);
        let downloads_base = base.join(downloads);
        let downloads_dir = downloads_base.join(name);
        Self {
            summary_file: cache_dir.join(format!("{name}.summary.json")),
            archive_dir: downloads_dir.join(archive_name),
            data_file: cache_base.join(format!("{name}.data.csv")),
            report_file: cache_base.join(format!("{name}.report.{}.csv", today.format("%y-%m-%d"))),
            extras_file: cache_base.join(format!("{name}.extra.csv")),
            cache_base,
            cache_dir,
            downloads_base,
            downloads_dir,
        }
    }

    pub fn download_path(&self, relative: &Utf8Path) -> Utf8PathBuf {
        self.downloads_dir.join(relative)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: &Path, overrides: &ConfigOverrides) -> Result<ResolvedConfig, MirrorError> {
        let content =
            fs::read_to_string(path).map_err(|_| MirrorError::ConfigRead(path.to_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| MirrorError::ConfigParse(err.to_string()))?;
        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, MirrorError> {
        let name = config.name.trim().to_string();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(MirrorError::InvalidConfig(format!(
                "feed name {:?} must be a plain, non-empty name",
                config.name
            )));
        }
        if config.remote.url_loc.trim().is_empty() {
            return Err(MirrorError::InvalidConfig("remote.urlLoc is empty".to_string()));
        }
        if config.local.archive_name.trim().is_empty() {
            return Err(MirrorError::InvalidConfig("local.archiveName is empty".to_string()));
        }

        let workers = overrides
            .workers
            .or(config.fetch.workers)
            .unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(MirrorError::InvalidConfig("workers must be at least 1".to_string()));
        }

        let base = match overrides.base_path.clone().or(config.base_path) {
            Some(base) => base,
            None => default_base_path()?,
        };

        let source_parameters = config
            .remote
            .url_parameters
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        let paths = AppPaths::new(
            &base,
            &name,
            &config.cache.local_path,
            &config.local.local_path,
            config.local.archive_name.trim(),
            Local::now().date_naive(),
        );

        Ok(ResolvedConfig {
            feed: config.feed,
            source_url: config.remote.url_loc.trim().to_string(),
            source_parameters,
            page_parameter: config.remote.page_parameter,
            cache_age_secs: overrides.cache_age_secs.unwrap_or(config.cache.age),
            workers,
            filename_date: config.fetch.filename_date.unwrap_or_default(),
            http: HttpSettings {
                timeout_secs: config.fetch.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
                max_retries: config.fetch.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                backoff_ms: config.fetch.backoff_ms.unwrap_or(DEFAULT_BACKOFF_MS),
                max_redirects: config.fetch.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS),
                pool_size: workers,
            },
            paths,
            name,
        })
    }
}

fn default_base_path() -> Result<Utf8PathBuf, MirrorError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.data_local_dir().join("catalog-mirror")).ok()
        })
        .ok_or_else(|| MirrorError::Filesystem("unable to resolve data directory".to_string()))
}

fn default_cache_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("cache")
}

fn default_cache_age() -> u64 {
    DEFAULT_CACHE_AGE_SECS
}

fn default_downloads_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("downloads")
}

fn default_archive_name() -> String {
    "_archive".to_string()
}

fn default_page_parameter() -> String {
    "page".to_string()
}
