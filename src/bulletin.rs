use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, Weekday};
use regex::Regex;

use crate::error::{BocmError, Result};

static FILE_DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"BOCM-(\d{8})-").unwrap());

/// Compact `YYYYMMDD` form used in file names and the knowledge base.
pub fn ymd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn parse_ymd(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BocmError::InvalidDate(format!("{s:?} (expected YYYYMMDD)")));
    }
    NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|e| BocmError::InvalidDate(format!("{s}: {e}")))
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// `YYYY/MM/DD` directory segment shared by summaries and documents.
pub fn date_path(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

/// `BOCM-YYYYMMDD-<issue>.PDF`
pub fn document_file_name(date: NaiveDate, document: u32) -> String {
    format!("BOCM-{}-{}.PDF", ymd(date), document)
}

pub fn document_url(base_url: &str, date: NaiveDate, document: u32) -> String {
    format!(
        "{}/boletin/CM_Orden_BOCM/{}/{}",
        base_url.trim_end_matches('/'),
        date_path(date),
        document_file_name(date, document)
    )
}

/// Recover the publication date from a `BOCM-YYYYMMDD-N.PDF` file name.
pub fn date_from_file_name(name: &str) -> Option<NaiveDate> {
    let caps = FILE_DATE_RE.captures(name)?;
    NaiveDate::parse_from_str(&caps[1], "%Y%m%d").ok()
}
