//! Local file names for downloaded files.

use crate::{ErrorKind, FetchError, file_datetime};
use chrono::NaiveDate;

/// Extension used when a file id carries none.
pub const DEFAULT_EXTENSION: &str = ".bin";

/// Substrings that could move a name out of its directory, compared
/// case-insensitively.
const FORBIDDEN: [&str; 5] = ["..", "/", "\\", "%2f", "%5c"];

/// Rejects file ids that are unsafe to use as part of a local path.
///
/// # Errors
///
/// Returns a `Client` error for empty ids and ids containing path
/// separators, parent references, encoded separators or control characters.
pub fn validate_file_id(file_id: &str) -> Result<(), FetchError> {
    let lower = file_id.to_ascii_lowercase();
    if file_id.is_empty()
        || file_id.chars().any(char::is_control)
        || FORBIDDEN.iter().any(|p| lower.contains(p))
    {
        return Err(FetchError::new(
            ErrorKind::Client,
            format!("unsafe file id {file_id:?}"),
        ));
    }
    Ok(())
}

/// Extension implied by a file id (`"RATES.csv"` gives `".csv"`), or
/// [`DEFAULT_EXTENSION`].
#[must_use]
pub fn file_extension(file_id: &str) -> &str {
    match file_id.rfind('.') {
        Some(dot)
            if dot > 0
                && (2..=11).contains(&(file_id.len() - dot))
                && file_id[dot + 1..].bytes().all(|b| b.is_ascii_alphanumeric()) =>
        {
            &file_id[dot..]
        }
        _ => DEFAULT_EXTENSION,
    }
}

/// Builds `{file_id}_{YYYYMMDD}{extension}`.
///
/// `extension` overrides the one implied by the file id.
///
/// # Errors
///
/// Returns an error if the file id fails [`validate_file_id`].
pub fn local_file_name(
    file_id: &str,
    date: NaiveDate,
    extension: Option<&str>,
) -> Result<String, FetchError> {
    validate_file_id(file_id)?;
    let extension = extension.unwrap_or_else(|| file_extension(file_id));
    Ok(format!("{file_id}_{}{extension}", file_datetime(date)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    #[test]
    fn test_traversal_ids_are_rejected() {
        for id in [
            "",
            "../../../etc/evil",
            "..",
            "a/b",
            "a\\b",
            "a%2Fb",
            "a%5cb",
            "bad\nid",
        ] {
            let err = validate_file_id(id).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Client, "{id:?}");
            assert!(!err.retryable);
        }
        assert!(validate_file_id("JPMAQS_GENERIC_RETURNS").is_ok());
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("RATES.csv"), ".csv");
        assert_eq!(file_extension("DATA.parquet"), ".parquet");
        assert_eq!(file_extension("JPMAQS_GENERIC_RETURNS"), ".bin");
        assert_eq!(file_extension(".hidden"), ".bin");
        assert_eq!(file_extension("trailing."), ".bin");
        assert_eq!(file_extension("v1.2-beta"), ".bin");
    }

    #[test]
    fn test_local_file_name() {
        assert_eq!(
            local_file_name("FX", date(), None).unwrap(),
            "FX_20240102.bin"
        );
        assert_eq!(
            local_file_name("RATES.csv", date(), None).unwrap(),
            "RATES.csv_20240102.csv"
        );
        assert_eq!(
            local_file_name("FX", date(), Some(".zip")).unwrap(),
            "FX_20240102.zip"
        );
        assert!(local_file_name("../FX", date(), Some(".zip")).is_err());
    }
}
