use camino::Utf8Path;
use chrono::NaiveDate;

use catalog_mirror::domain::DateGranularity;
use catalog_mirror::sanitize::{
    build_filename, is_plain_relative, is_reserved, is_within, sanitize_filename, url_suffix,
};

const AWKWARD_TITLES: [&str; 11] = [
    "Amazon EC2: Best Practices / Tips",
    "Ünïcödé — “quoted” title",
    "What is <this>? A *guide* | part 2",
    "tabs\tand\nnewlines\u{3000}wide space",
    "%E2%80%94 percent%20encoded%2Fslash",
    "C:\\Windows\\path",
    "日本語のタイトル",
    "emoji 🚀 launch",
    "a\u{FF0F}b\u{FF1A}c",
    "\u{FF0E}\u{FF0E}\u{FF0F}\u{FF0E}\u{FF0E}\u{FF0F}escaped",
    "..",
];

#[test]
fn sanitized_names_are_ascii_without_reserved_characters() {
    for title in AWKWARD_TITLES {
        let name = sanitize_filename(title);
        assert!(name.is_ascii(), "{title:?} -> {name:?}");
        assert!(!name.chars().any(is_reserved), "{title:?} -> {name:?}");
        assert!(!name.chars().any(|ch| ch.is_ascii_control()), "{title:?} -> {name:?}");
    }
}

#[test]
fn build_filename_is_deterministic() {
    let date = NaiveDate::from_ymd_opt(2022, 11, 30).unwrap();
    for title in AWKWARD_TITLES {
        let url = "https://example.com/docs/file.name.PDF?x=1#frag";
        let first = build_filename(title, date, url, DateGranularity::Day);
        let second = build_filename(title, date, url, DateGranularity::Day);
        assert_eq!(first, second);
        assert!(first.ends_with(" - 2022-11-30.PDF"), "{first}");
        assert!(is_plain_relative(Utf8Path::new(&first)), "{first}");
        assert_eq!(Utf8Path::new(&first).components().count(), 1, "{first}");
    }
}

#[test]
fn month_granularity_and_untitled_fallback() {
    let date = NaiveDate::from_ymd_opt(2022, 11, 30).unwrap();
    assert_eq!(
        build_filename("日本語", date, "https://example.com/a.pdf", DateGranularity::Month),
        "untitled - 2022-11.pdf"
    );
}

#[test]
fn url_suffix_edge_cases() {
    assert_eq!(url_suffix("https://example.com/a/b.pdf"), ".pdf");
    assert_eq!(url_suffix("https://example.com/a/b.tar.gz?download=1"), ".gz");
    assert_eq!(url_suffix("https://example.com/a.dir/file"), "");
    assert_eq!(url_suffix("https://example.com/a/file."), "");
    assert_eq!(url_suffix(""), "");
    assert_eq!(url_suffix("https://example.com/a.pd%3Ff"), ".pd-f");
    assert_eq!(url_suffix("https://example.com/a.p%EF%BC%8Fdf"), ".p-df");
    assert!(!url_suffix("https://example.com/a.%E2%80%94x").chars().any(is_reserved));
}

#[test]
fn within_compares_components() {
    use std::path::Path;
    assert!(is_within(Path::new("/d/_archive"), Path::new("/d/_archive/x.pdf")));
    assert!(!is_within(Path::new("/d/_archive"), Path::new("/d/_archive2/x.pdf")));
}
