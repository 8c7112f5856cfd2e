//! Work out a file's type and creation date.

use std::{io::Cursor, sync::LazyLock};

use chrono::{NaiveDate, NaiveDateTime};
use exif::{In, Tag};
use regex::bytes::Regex;

use crate::prelude::*;

/// Placeholder used when we can't tell.
pub const UNKNOWN: &str = "UNKNOWN";

/// `/CreationDate (D:YYYYMMDD...)` in a PDF info dictionary.
static PDF_CREATION_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/CreationDate\s*\(D:(\d{4})(\d{2})(\d{2})").expect("failed to compile regex")
});

/// What we learned about a file before reading it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileClassification {
    /// The extension, uppercased, without the dot. Or [`UNKNOWN`].
    pub file_type: String,
    /// `YYYY-MM-DD`, or [`UNKNOWN`].
    pub creation_date: String,
}

/// Classify a file by name and contents. Never fails.
pub fn classify(name: &str, data: &[u8]) -> FileClassification {
    let file_type = file_type_tag(name);
    let creation_date = creation_date(&file_type, data).unwrap_or_else(|| UNKNOWN.to_owned());
    FileClassification {
        file_type,
        creation_date,
    }
}

/// The uppercased extension of `name`, or [`UNKNOWN`].
pub fn file_type_tag(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_uppercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_owned())
}

/// Look for a creation date in document metadata.
fn creation_date(file_type: &str, data: &[u8]) -> Option<String> {
    let date = match file_type {
        "PDF" => pdf_creation_date(data),
        "JPG" | "JPEG" | "PNG" => exif_creation_date(data),
        _ => None,
    }?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn pdf_creation_date(data: &[u8]) -> Option<NaiveDate> {
    let caps = PDF_CREATION_DATE.captures(data)?;
    let field = |i: usize| -> Option<u32> { std::str::from_utf8(&caps[i]).ok()?.parse().ok() };
    NaiveDate::from_ymd_opt(field(1)? as i32, field(2)?, field(3)?)
}

fn exif_creation_date(data: &[u8]) -> Option<NaiveDate> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(data))
        .map_err(|err| trace!("no EXIF data: {err}"))
        .ok()?;
    [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif.get_field(tag, In::PRIMARY))
        .find_map(|field| match &field.value {
            exif::Value::Ascii(values) => values.iter().find_map(|raw| {
                let text = std::str::from_utf8(raw).ok()?;
                NaiveDateTime::parse_from_str(text.trim(), "%Y:%m:%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.date())
            }),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{jpeg_with_exif, minimal_pdf, png_bytes};

    #[test]
    fn file_type_tags() {
        assert_eq!(file_type_tag("scan.jpeg"), "JPEG");
        assert_eq!(file_type_tag("dir/Contract.Pdf"), "PDF");
        assert_eq!(file_type_tag("README"), UNKNOWN);
        assert_eq!(file_type_tag("trailing."), UNKNOWN);
    }

    #[test]
    fn pdf_creation_date_is_read() {
        let classification = classify("contract.pdf", &minimal_pdf(1));
        assert_eq!(classification.file_type, "PDF");
        assert_eq!(classification.creation_date, "2024-03-15");
    }

    #[test]
    fn invalid_pdf_dates_fall_back() {
        let data = b"%PDF-1.4 /CreationDate (D:20241345)";
        assert_eq!(classify("x.pdf", data).creation_date, UNKNOWN);
    }

    #[test]
    fn exif_date_time_original_wins() {
        let data = jpeg_with_exif("2019:05:06 07:08:09", Some("2021:01:02 03:04:05"));
        let classification = classify("x.jpg", &data);
        assert_eq!(classification.file_type, "JPG");
        assert_eq!(classification.creation_date, "2021-01-02");
    }

    #[test]
    fn exif_date_time_is_the_fallback() {
        let data = jpeg_with_exif("2019:05:06 07:08:09", None);
        assert_eq!(classify("scan.JPEG", &data).creation_date, "2019-05-06");
    }

    #[test]
    fn images_without_exif_fall_back() {
        assert_eq!(classify("a.png", &png_bytes()).creation_date, UNKNOWN);
        assert_eq!(classify("notes.txt", b"hello").creation_date, UNKNOWN);
    }
}
