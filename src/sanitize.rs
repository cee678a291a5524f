use std::path::Path;

use camino::{Utf8Component, Utf8Path};
use chrono::NaiveDate;
use percent_encoding::percent_decode_str;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::domain::DateGranularity;

const FOLDER_SEPARATOR_CHARS: [char; 2] = ['\\', '/'];
const WINDOWS_INVALID_CHARS: [char; 7] = [':', '*', '|', '?', '>', '<', '"'];
const DASH_CHARS: [char; 5] = ['\u{2012}', '\u{2013}', '\u{2014}', '\u{2015}', '\u{2053}'];

const UNTITLED: &str = "untitled";

pub fn is_reserved(ch: char) -> bool {
    FOLDER_SEPARATOR_CHARS.contains(&ch)
        || WINDOWS_INVALID_CHARS.contains(&ch)
        || DASH_CHARS.contains(&ch)
}

pub fn sanitize_filename(raw: &str) -> String {
    sanitize_filename_with(raw, false)
}

pub fn sanitize_filename_with(raw: &str, remove_dots: bool) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let mut name = clean_name(&decoded);

    if remove_dots && name.len() > 1 {
        let (head, tail) = name.split_at(1);
        name = format!("{head}{}", tail.replace('.', ""));
    }

    name
}

// Compatibility forms such as U+FF0F fold into reserved characters, so the
// swap runs after the fold.
fn clean_name(decoded: &str) -> String {
    let dashed: String = decoded
        .chars()
        .map(|ch| if DASH_CHARS.contains(&ch) { '-' } else { ch })
        .collect();
    let folded: String = if dashed.is_ascii() {
        dashed
    } else {
        dashed.nfkd().filter(char::is_ascii).collect()
    };

    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|ch| !ch.is_ascii_control())
        .map(|ch| if is_reserved(ch) { '-' } else { ch })
        .collect()
}

pub fn url_suffix(url: &str) -> String {
    let path = match Url::parse(url.trim()) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .trim()
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let path = percent_decode_str(&path).decode_utf8_lossy();
    let path = path.trim();
    let segment = path.rsplit('/').next().unwrap_or_default();

    match segment.rfind('.') {
        Some(pos) if pos + 1 < segment.len() => clean_name(&segment[pos..]),
        _ => String::new(),
    }
}

pub fn build_filename(
    title: &str,
    date: NaiveDate,
    url: &str,
    granularity: DateGranularity,
) -> String {
    let mut stem = sanitize_filename(title);
    if stem.is_empty() {
        stem = UNTITLED.to_string();
    }
    format!(
        "{stem} - {}{}",
        date.format(granularity.pattern()),
        url_suffix(url)
    )
}

pub fn is_within(parent: &Path, path: &Path) -> bool {
    path.starts_with(parent)
}

/// Non-empty, relative, and made only of plain names.
pub fn is_plain_relative(path: &Utf8Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Utf8Component::Normal(_)))
}
