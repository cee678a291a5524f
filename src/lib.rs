pub mod app;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod feed;
pub mod fs_util;
pub mod http;
pub mod listing;
pub mod output;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod sanitize;
