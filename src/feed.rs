use std::sync::LazyLock;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;

use crate::domain::{DateGranularity, FeedKind, Outcome, ResultStatus};
use crate::error::MirrorError;
use crate::record::{FeedFields, FetchRecord};
use crate::sanitize::{build_filename, sanitize_filename};

static CATEGORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<a\s[^>]*>([^<]*)</a>").expect("category pattern is valid")
});

static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:</?p>)?([^<]+)(?:</?p>|$)").expect("description pattern is valid")
});

pub fn build_record(
    kind: FeedKind,
    item: &Value,
    granularity: DateGranularity,
) -> Result<FetchRecord, MirrorError> {
    match kind {
        FeedKind::Whitepapers => build_whitepaper(item, granularity),
        FeedKind::Answers => build_answer(item, granularity),
        FeedKind::Builders => build_builder(item, granularity),
    }
}

fn build_whitepaper(item: &Value, granularity: DateGranularity) -> Result<FetchRecord, MirrorError> {
    let fields = additional_fields(item)?;
    let raw_description = opt_str(fields, "description").unwrap_or_default();
    let title = req_str(fields, "docTitle")?.to_string();
    let content_type = req_str(fields, "contentType")?.to_string();
    let category = CATEGORY_RE
        .captures(raw_description)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_lowercase())
        .filter(|value| !value.is_empty());

    let date_sort = parse_remote_date(req_str(fields, "sortDate")?)?;
    let url = strip_query(opt_str(fields, "primaryURL").unwrap_or_default());
    let filename = build_filename(&title, date_sort, &url, granularity);
    let filepath = relative_path(category.is_some().then_some(content_type.as_str()), &filename);
    let to_download = !url.is_empty() && category.as_deref() == Some("pdf");

    Ok(FetchRecord {
        filename,
        filepath,
        date_remote: date_sort,
        url,
        to_download,
        outcome: Outcome::Nil,
        result: ResultStatus::Nil,
        name: req_str(item, "name")?.to_string(),
        title,
        category,
        content_type,
        feature_flag: opt_str(fields, "featureFlag").map(str::to_string),
        description: extract_description(raw_description),
        date_created: Some(parse_remote_date(req_str(item, "dateCreated")?)?),
        date_updated: opt_date(fields, "updateDate")?,
        date_published: opt_date(fields, "datePublished")?,
        date_sort: Some(date_sort),
        fields: FeedFields::Whitepaper,
    })
}

fn build_answer(item: &Value, granularity: DateGranularity) -> Result<FetchRecord, MirrorError> {
    let fields = additional_fields(item)?;
    let title = req_str(fields, "headline")?.to_string();
    let content_type = req_str(fields, "contentType")?.to_string();
    let category = opt_str(fields, "category")
        .map(|value| {
            value
                .split('|')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("|")
        })
        .filter(|value| !value.is_empty());

    let date_sort = parse_remote_date(req_str(fields, "sortDate")?)?;
    let url = strip_query(opt_str(fields, "downloadUrl").unwrap_or_default());
    let filename = build_filename(&title, date_sort, &url, granularity);
    let filepath = relative_path(category.is_some().then_some(content_type.as_str()), &filename);

    Ok(FetchRecord {
        filename,
        filepath,
        date_remote: date_sort,
        to_download: !url.is_empty(),
        url,
        outcome: Outcome::Nil,
        result: ResultStatus::Nil,
        name: req_str(item, "name")?.to_string(),
        title,
        category,
        content_type,
        feature_flag: opt_str(fields, "featureFlag").map(str::to_string),
        description: extract_description(opt_str(fields, "description").unwrap_or_default()),
        date_created: Some(parse_remote_date(req_str(item, "dateCreated")?)?),
        date_updated: opt_date(item, "dateUpdated")?,
        date_published: None,
        date_sort: Some(date_sort),
        fields: FeedFields::Answer {
            subheadline: opt_str(fields, "subHeadline").unwrap_or_default().to_string(),
        },
    })
}

fn build_builder(item: &Value, granularity: DateGranularity) -> Result<FetchRecord, MirrorError> {
    let fields = additional_fields(item)?;
    let title = req_str(fields, "headline")?.to_string();
    let content_type = opt_str(fields, "contentType").unwrap_or_default().to_string();

    let date_created = parse_remote_date(req_str(item, "dateCreated")?)?;
    let date_updated = opt_date(fields, "updateDate")?;
    let date_remote = date_updated.unwrap_or(date_created);

    let url = strip_query(opt_str(fields, "downloadUrl").unwrap_or_default());
    let filename = build_filename(&title, date_remote, &url, granularity);
    let filepath = relative_path(Some(content_type.as_str()), &filename);

    Ok(FetchRecord {
        filename,
        filepath,
        date_remote,
        to_download: !url.is_empty(),
        url,
        outcome: Outcome::Nil,
        result: ResultStatus::Nil,
        name: req_str(item, "name")?.to_string(),
        title,
        category: None,
        content_type,
        feature_flag: opt_str(fields, "featureFlag").map(str::to_string),
        description: extract_description(opt_str(fields, "description").unwrap_or_default()),
        date_created: Some(date_created),
        date_updated,
        date_published: None,
        date_sort: None,
        fields: FeedFields::Builder {
            learning_level: opt_str(fields, "learningLevel").unwrap_or_default().to_string(),
            video_url: opt_str(fields, "videoUrl").unwrap_or_default().to_string(),
        },
    })
}

pub fn extract_description(raw: &str) -> String {
    DESCRIPTION_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

pub fn parse_remote_date(value: &str) -> Result<NaiveDate, MirrorError> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.date_naive());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, pattern) {
            return Ok(parsed.date_naive());
        }
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return Ok(parsed.date());
        }
    }
    trimmed
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .ok_or_else(|| MirrorError::InvalidDate(value.to_string()))
}

fn relative_path(directory: Option<&str>, filename: &str) -> Utf8PathBuf {
    let directory = directory.map(sanitize_filename).unwrap_or_default();
    let directory = directory.trim_matches('.').trim();
    Utf8Path::new(directory)
        .join(filename)
        .components()
        .filter(|component| matches!(component, Utf8Component::Normal(_)))
        .map(|component| component.as_str())
        .collect()
}

fn strip_query(url: &str) -> String {
    url.split('?').next().unwrap_or_default().trim().to_string()
}

fn additional_fields(item: &Value) -> Result<&Value, MirrorError> {
    item.get("additionalFields")
        .filter(|value| value.is_object())
        .ok_or_else(|| MirrorError::ItemParse("missing additionalFields".to_string()))
}

fn req_str<'a>(value: &'a Value, key: &str) -> Result<&'a str, MirrorError> {
    value
        .get(key)
        .and_then(|value| value.as_str())
        .ok_or_else(|| MirrorError::ItemParse(format!("missing field {key}")))
}

fn opt_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|value| value.as_str())
        .filter(|value| !value.trim().is_empty())
}

fn opt_date(value: &Value, key: &str) -> Result<Option<NaiveDate>, MirrorError> {
    opt_str(value, key).map(parse_remote_date).transpose()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_remote_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 10).unwrap();
        assert_eq!(parse_remote_date("2021-03-10T18:14:12+0000").unwrap(), expected);
        assert_eq!(parse_remote_date("2021-03-10T23:14:12-05:00").unwrap(), expected);
        assert_eq!(parse_remote_date("2021-03-10").unwrap(), expected);
        assert!(parse_remote_date("March").is_err());
    }

    #[test]
    fn description_takes_first_text_run() {
        assert_eq!(
            extract_description("<a href=\"x\">PDF</a><p>Some   useful\n text</p><p>more</p>"),
            "Some useful text"
        );
        assert_eq!(extract_description("plain text only"), "plain text only");
        assert_eq!(extract_description(""), "");
    }

    #[test]
    fn whitepaper_with_pdf_category_is_downloadable() {
        let item = json!({
            "name": "wp-serverless",
            "dateCreated": "2020-01-02T00:00:00+0000",
            "additionalFields": {
                "docTitle": "Serverless: Lens",
                "contentType": "Whitepaper",
                "description": "<a href=\"/x.pdf\">PDF</a><p>About serverless.</p>",
                "datePublished": "2021-06-01T00:00:00+0000",
                "sortDate": "2021-06-01T00:00:00+0000",
                "primaryURL": "https://example.com/wp/serverless.pdf?did=wp_card"
            }
        });
        let record = build_record(FeedKind::Whitepapers, &item, DateGranularity::Day).unwrap();
        assert_eq!(record.category.as_deref(), Some("pdf"));
        assert!(record.to_download);
        assert_eq!(record.url, "https://example.com/wp/serverless.pdf");
        assert_eq!(
            record.filepath,
            Utf8PathBuf::from("Whitepaper/Serverless- Lens - 2021-06-01.pdf")
        );
        assert_eq!(record.description, "About serverless.");
    }

    #[test]
    fn builder_prefers_update_date() {
        let item = json!({
            "name": "b1",
            "dateCreated": "2020-01-02T00:00:00+0000",
            "additionalFields": {
                "headline": "Deploying Safely",
                "contentType": "article",
                "learningLevel": "300",
                "updateDate": "2022-02-03T00:00:00+0000",
                "downloadUrl": ""
            }
        });
        let record = build_record(FeedKind::Builders, &item, DateGranularity::Day).unwrap();
        assert_eq!(record.date_remote, NaiveDate::from_ymd_opt(2022, 2, 3).unwrap());
        assert!(!record.to_download);
        assert_eq!(record.filename, "Deploying Safely - 2022-02-03");
    }

    #[test]
    fn relative_path_drops_dot_components() {
        assert_eq!(
            relative_path(Some(".."), "a - 2021-01-01.pdf"),
            Utf8PathBuf::from("a - 2021-01-01.pdf")
        );
        assert_eq!(relative_path(None, "../x.pdf"), Utf8PathBuf::from("x.pdf"));
        assert_eq!(
            relative_path(Some("guide"), "./b.pdf"),
            Utf8PathBuf::from("guide/b.pdf")
        );
    }

    #[test]
    fn fullwidth_traversal_title_stays_in_place() {
        let item = json!({
            "name": "escape",
            "dateCreated": "2021-06-01T00:00:00+0000",
            "additionalFields": {
                "headline": "\u{FF0E}\u{FF0E}\u{FF0F}\u{FF0E}\u{FF0E}\u{FF0F}escaped",
                "contentType": "\u{FF0E}\u{FF0E}",
                "category": "ops",
                "sortDate": "2021-06-01T00:00:00+0000",
                "downloadUrl": "https://example.com/x.pdf"
            }
        });
        let record = build_record(FeedKind::Answers, &item, DateGranularity::Day).unwrap();
        assert_eq!(record.filepath, Utf8PathBuf::from("..-..-escaped - 2021-06-01.pdf"));
        assert!(crate::sanitize::is_plain_relative(&record.filepath));
    }

    #[test]
    fn missing_required_field_is_an_item_error() {
        let item = json!({ "name": "x", "additionalFields": {} });
        assert!(build_record(FeedKind::Answers, &item, DateGranularity::Day).is_err());
    }
}
