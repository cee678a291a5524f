#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde_json::{Value, json};

use catalog_mirror::config::{Config, ConfigLoader, ConfigOverrides, ResolvedConfig};
use catalog_mirror::domain::{Outcome, ResultStatus};
use catalog_mirror::error::MirrorError;
use catalog_mirror::http::{HttpResponse, HttpSource};
use catalog_mirror::record::{FeedFields, FetchRecord};

pub const LIST_URL: &str = "https://catalog.example.com/api/search";

#[derive(Clone)]
pub enum Route {
    Body(u16, Vec<u8>),
    Redirect(u16, Option<String>),
    BrokenBody,
    TransportError,
}

/// Canned responses keyed by URL, with `?page=<n>` appended for list pages.
#[derive(Default)]
pub struct MockHttp {
    routes: HashMap<String, Route>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, key: impl Into<String>, route: Route) -> Self {
        self.routes.insert(key.into(), route);
        self
    }

    pub fn page(self, page: u32, body: Value) -> Self {
        self.route(
            format!("{LIST_URL}?page={page}"),
            Route::Body(200, body.to_string().into_bytes()),
        )
    }

    pub fn document(self, url: &str, content: &[u8]) -> Self {
        self.route(url, Route::Body(200, content.to_vec()))
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

impl HttpSource for MockHttp {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, MirrorError> {
        let key = match query.iter().find(|(name, _)| name == "page") {
            Some((_, page)) => format!("{url}?page={page}"),
            None => url.to_string(),
        };
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;

        let response = |status: u16,
                        location: Option<String>,
                        body: Box<dyn Read + Send>|
         -> Result<HttpResponse, MirrorError> {
            Ok(HttpResponse {
                status,
                location,
                body,
            })
        };
        match self.routes.get(&key) {
            Some(Route::Body(status, bytes)) => response(*status, None, Box::new(Cursor::new(bytes.clone()))),
            Some(Route::Redirect(status, location)) => {
                response(*status, location.clone(), Box::new(io::empty()))
            }
            Some(Route::BrokenBody) => response(200, None, Box::new(BrokenReader::default())),
            Some(Route::TransportError) => Err(MirrorError::Http("connection refused".to_string())),
            None => response(404, None, Box::new(io::empty())),
        }
    }
}

/// Yields one chunk, then fails.
#[derive(Default)]
pub struct BrokenReader {
    sent: bool,
}

impl Read for BrokenReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.sent {
            return Err(io::Error::other("connection reset"));
        }
        self.sent = true;
        let chunk = b"partial";
        let len = chunk.len().min(buf.len());
        buf[..len].copy_from_slice(&chunk[..len]);
        Ok(len)
    }
}

pub fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

pub fn config(base: &Utf8Path, cache_age: u64) -> ResolvedConfig {
    let raw: Config = serde_json::from_value(json!({
        "name": "answers",
        "feed": "answers",
        "basePath": base.as_str(),
        "cache": { "localPath": "cache", "age": cache_age },
        "local": { "localPath": "downloads", "archiveName": "_archive" },
        "remote": {
            "urlLoc": LIST_URL,
            "urlParameters": { "size": 50, "sort": "desc" }
        },
        "fetch": { "workers": 3, "backoffMs": 0, "maxRetries": 0, "maxRedirects": 3 }
    }))
    .unwrap();
    ConfigLoader::resolve_config(raw, &ConfigOverrides::default()).unwrap()
}

pub fn doc_url(index: usize) -> String {
    format!("https://docs.example.com/files/doc{index}.pdf")
}

pub fn answer_item(index: usize) -> Value {
    json!({
        "item": {
            "name": format!("answer-{index}"),
            "dateCreated": "2020-01-01T00:00:00+0000",
            "additionalFields": {
                "headline": format!("Doc {index}"),
                "subHeadline": "Sub",
                "contentType": "guide",
                "category": "ops | security",
                "description": "<p>About things.</p>",
                "sortDate": "2021-05-01T10:00:00+0000",
                "downloadUrl": doc_url(index)
            }
        }
    })
}

pub fn list_page(range: std::ops::Range<usize>, total_hits: usize) -> Value {
    let items: Vec<Value> = range.clone().map(answer_item).collect();
    json!({
        "metadata": { "count": items.len(), "totalHits": total_hits },
        "items": items
    })
}

pub fn remote_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 5, 1).unwrap()
}

pub fn record(filepath: &str, url: &str) -> FetchRecord {
    let filepath = Utf8PathBuf::from(filepath);
    FetchRecord {
        filename: filepath.file_name().unwrap_or_default().to_string(),
        filepath,
        date_remote: remote_date(),
        url: url.to_string(),
        to_download: true,
        outcome: Outcome::Nil,
        result: ResultStatus::Nil,
        name: "doc".to_string(),
        title: "Doc".to_string(),
        category: None,
        content_type: "guide".to_string(),
        feature_flag: None,
        description: String::new(),
        date_created: None,
        date_updated: None,
        date_published: None,
        date_sort: Some(remote_date()),
        fields: FeedFields::Answer {
            subheadline: String::new(),
        },
    }
}
