use std::collections::HashMap;

use camino::Utf8PathBuf;
use chrono::NaiveDate;

use crate::domain::{FeedKind, Outcome, ResultStatus};
use crate::error::MirrorError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedFields {
    #[default]
    Whitepaper,
    Answer {
        subheadline: String,
    },
    Builder {
        learning_level: String,
        video_url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRecord {
    pub filename: String,
    /// Relative to the feed's downloads directory.
    pub filepath: Utf8PathBuf,
    pub date_remote: NaiveDate,
    pub url: String,
    pub to_download: bool,
    pub outcome: Outcome,
    pub result: ResultStatus,
    pub name: String,
    pub title: String,
    pub category: Option<String>,
    pub content_type: String,
    pub feature_flag: Option<String>,
    pub description: String,
    pub date_created: Option<NaiveDate>,
    pub date_updated: Option<NaiveDate>,
    pub date_published: Option<NaiveDate>,
    pub date_sort: Option<NaiveDate>,
    pub fields: FeedFields,
}

impl FetchRecord {
    pub fn set_state(&mut self, outcome: Outcome, result: ResultStatus) {
        self.outcome = outcome;
        self.result = result;
    }

    pub fn is_cache_hit(&self) -> bool {
        self.outcome == Outcome::Cached && self.result == ResultStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRecord {
    pub content_type: String,
    pub date_deleted: NaiveDate,
    pub filename: String,
    pub filepath: Utf8PathBuf,
    pub outcome: Outcome,
    pub result: ResultStatus,
}

pub const DELETE_COLUMNS: [&str; 6] = [
    "contentType",
    "dateDeleted",
    "filename",
    "filepath",
    "outcome",
    "result",
];

impl DeleteRecord {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.content_type.clone(),
            self.date_deleted.to_string(),
            self.filename.clone(),
            self.filepath.to_string(),
            self.outcome.to_string(),
            self.result.to_string(),
        ]
    }
}

const COMMON_COLUMNS: [&str; 17] = [
    "filename",
    "filepath",
    "dateRemote",
    "url",
    "toDownload",
    "outcome",
    "result",
    "name",
    "title",
    "category",
    "contentType",
    "featureFlag",
    "description",
    "dateCreated",
    "dateUpdated",
    "datePublished",
    "dateSort",
];

impl FeedKind {
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = COMMON_COLUMNS.to_vec();
        match self {
            FeedKind::Whitepapers => {}
            FeedKind::Answers => columns.push("subheadline"),
            FeedKind::Builders => columns.extend(["learningLevel", "videoUrl"]),
        }
        columns
    }
}

pub fn record_to_row(record: &FetchRecord) -> Vec<String> {
    let mut row = vec![
        record.filename.clone(),
        record.filepath.to_string(),
        record.date_remote.to_string(),
        record.url.clone(),
        record.to_download.to_string(),
        record.outcome.to_string(),
        record.result.to_string(),
        record.name.clone(),
        record.title.clone(),
        record.category.clone().unwrap_or_default(),
        record.content_type.clone(),
        record.feature_flag.clone().unwrap_or_default(),
        record.description.clone(),
        format_opt_date(record.date_created),
        format_opt_date(record.date_updated),
        format_opt_date(record.date_published),
        format_opt_date(record.date_sort),
    ];
    match &record.fields {
        FeedFields::Whitepaper => {}
        FeedFields::Answer { subheadline } => row.push(subheadline.clone()),
        FeedFields::Builder {
            learning_level,
            video_url,
        } => {
            row.push(learning_level.clone());
            row.push(video_url.clone());
        }
    }
    row
}

pub fn record_from_row(
    kind: FeedKind,
    headers: &[String],
    row: &[String],
) -> Result<FetchRecord, MirrorError> {
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let cell = |column: &str| -> Result<&str, MirrorError> {
        index
            .get(column)
            .and_then(|&i| row.get(i))
            .map(|value| value.as_str())
            .ok_or_else(|| MirrorError::RecordParse(format!("missing column {column}")))
    };
    let optional = |column: &str| -> Result<Option<String>, MirrorError> {
        let value = cell(column)?;
        Ok((!value.is_empty()).then(|| value.to_string()))
    };

    let fields = match kind {
        FeedKind::Whitepapers => FeedFields::Whitepaper,
        FeedKind::Answers => FeedFields::Answer {
            subheadline: cell("subheadline")?.to_string(),
        },
        FeedKind::Builders => FeedFields::Builder {
            learning_level: cell("learningLevel")?.to_string(),
            video_url: cell("videoUrl")?.to_string(),
        },
    };

    Ok(FetchRecord {
        filename: cell("filename")?.to_string(),
        filepath: Utf8PathBuf::from(cell("filepath")?),
        date_remote: parse_iso_date(cell("dateRemote")?)?,
        url: cell("url")?.to_string(),
        to_download: parse_bool(cell("toDownload")?),
        outcome: cell("outcome")?.parse()?,
        result: cell("result")?.parse()?,
        name: cell("name")?.to_string(),
        title: cell("title")?.to_string(),
        category: optional("category")?,
        content_type: cell("contentType")?.to_string(),
        feature_flag: optional("featureFlag")?,
        description: cell("description")?.to_string(),
        date_created: parse_opt_date(cell("dateCreated")?)?,
        date_updated: parse_opt_date(cell("dateUpdated")?)?,
        date_published: parse_opt_date(cell("datePublished")?)?,
        date_sort: parse_opt_date(cell("dateSort")?)?,
        fields,
    })
}

fn format_opt_date(date: Option<NaiveDate>) -> String {
    date.map(|date| date.to_string()).unwrap_or_default()
}

fn parse_iso_date(value: &str) -> Result<NaiveDate, MirrorError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| MirrorError::InvalidDate(format!("{value:?}: {err}")))
}

fn parse_opt_date(value: &str) -> Result<Option<NaiveDate>, MirrorError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_iso_date(value).map(Some)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "t" | "yes" | "1"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_record() -> FetchRecord {
        FetchRecord {
            filename: "Intro - 2022-05-01.pdf".to_string(),
            filepath: Utf8PathBuf::from("guides/Intro - 2022-05-01.pdf"),
            date_remote: NaiveDate::from_ymd_opt(2022, 5, 1).unwrap(),
            url: "https://example.com/intro.pdf".to_string(),
            to_download: true,
            outcome: Outcome::Updated,
            result: ResultStatus::Success,
            name: "intro".to_string(),
            title: "Intro".to_string(),
            category: None,
            content_type: "guides".to_string(),
            feature_flag: None,
            description: "An introduction, with commas".to_string(),
            date_created: NaiveDate::from_ymd_opt(2021, 1, 2),
            date_updated: NaiveDate::from_ymd_opt(2022, 5, 1),
            date_published: None,
            date_sort: None,
            fields: FeedFields::Builder {
                learning_level: "200".to_string(),
                video_url: String::new(),
            },
        }
    }

    #[test]
    fn row_matches_header_width() {
        let record = builder_record();
        assert_eq!(
            record_to_row(&record).len(),
            FeedKind::Builders.columns().len()
        );
        assert_eq!(FeedKind::Whitepapers.columns().len(), 17);
    }

    #[test]
    fn row_restores_record() {
        let record = builder_record();
        let headers: Vec<String> = FeedKind::Builders
            .columns()
            .into_iter()
            .map(str::to_string)
            .collect();
        let parsed = record_from_row(FeedKind::Builders, &headers, &record_to_row(&record)).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn enums_are_written_by_name() {
        let row = record_to_row(&builder_record());
        assert_eq!(row[5], "updated");
        assert_eq!(row[6], "success");
        assert_eq!(row[2], "2022-05-01");
    }

    #[test]
    fn missing_column_is_reported() {
        let headers = vec!["filename".to_string()];
        let row = vec!["x.pdf".to_string()];
        assert!(record_from_row(FeedKind::Whitepapers, &headers, &row).is_err());
    }
}
