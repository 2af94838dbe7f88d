//! DataQuery URL construction.

use chrono::NaiveDate;
use dataquery_types::file_datetime;
use reqwest::Url;

use crate::ClientError;

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://api-developer.jpmorgan.com";

/// Default API context path.
pub const DEFAULT_CONTEXT_PATH: &str = "/research/dataquery-authe/api/v2";

/// Longest URL the API accepts.
pub const MAX_URL_LENGTH: usize = 2080;

/// File download endpoint.
pub const DOWNLOAD_ENDPOINT: &str = "group/file/download";

/// File availability endpoint.
pub const AVAILABILITY_ENDPOINT: &str = "group/file/availability";

/// Group file listing endpoint.
pub const FILES_ENDPOINT: &str = "group/files";

/// Joins a host and a context path into an API root without doubled slashes.
///
/// ```
/// use dataquery_fetch::url::api_root;
///
/// assert_eq!(
///     api_root("https://host/", Some("/ctx/api/v2/")),
///     "https://host/ctx/api/v2"
/// );
/// assert_eq!(api_root("https://host", None), "https://host");
/// ```
#[must_use]
pub fn api_root(base_url: &str, context_path: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    match context_path.map(|c| c.trim_matches('/')) {
        Some(ctx) if !ctx.is_empty() => format!("{base}/{ctx}"),
        _ => base.to_string(),
    }
}

/// Builds endpoint URLs for the general and the files API roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiUrls {
    api_root: String,
    files_root: String,
}

impl ApiUrls {
    /// Creates a builder. File endpoints use `files_root` when given.
    #[must_use]
    pub fn new(api_root: impl Into<String>, files_root: Option<String>) -> Self {
        let api_root = api_root.into();
        let files_root = files_root.unwrap_or_else(|| api_root.clone());
        Self {
            api_root,
            files_root,
        }
    }

    /// Root of the general API.
    #[must_use]
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    /// Root of the file endpoints.
    #[must_use]
    pub fn files_root(&self) -> &str {
        &self.files_root
    }

    /// `group/file/download?file-group-id=..&file-datetime=YYYYMMDD`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or too long.
    pub fn download(&self, file_id: &str, date: NaiveDate) -> Result<String, ClientError> {
        build(
            &self.files_root,
            DOWNLOAD_ENDPOINT,
            &[
                ("file-group-id", file_id),
                ("file-datetime", &file_datetime(date)),
            ],
        )
    }

    /// `group/file/availability?file-group-id=..&file-datetime=YYYYMMDD`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or too long.
    pub fn availability(&self, file_id: &str, date: NaiveDate) -> Result<String, ClientError> {
        build(
            &self.files_root,
            AVAILABILITY_ENDPOINT,
            &[
                ("file-group-id", file_id),
                ("file-datetime", &file_datetime(date)),
            ],
        )
    }

    /// `group/files?group-id=..`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or too long.
    pub fn files(&self, group_id: &str) -> Result<String, ClientError> {
        build(&self.files_root, FILES_ENDPOINT, &[("group-id", group_id)])
    }
}

fn build(root: &str, endpoint: &str, params: &[(&str, &str)]) -> Result<String, ClientError> {
    let raw = format!(
        "{}/{}",
        root.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    );
    let mut url =
        Url::parse(&raw).map_err(|e| ClientError::Config(format!("invalid URL {raw}: {e}")))?;
    url.query_pairs_mut().extend_pairs(params);

    let url = String::from(url);
    if url.len() > MAX_URL_LENGTH {
        return Err(ClientError::UrlTooLong {
            length: url.len(),
            max: MAX_URL_LENGTH,
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls() -> ApiUrls {
        ApiUrls::new(api_root(DEFAULT_BASE_URL, Some(DEFAULT_CONTEXT_PATH)), None)
    }

    #[test]
    fn test_download_url() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(
            urls().download("JPMAQS_GENERIC_RETURNS", date).unwrap(),
            "https://api-developer.jpmorgan.com/research/dataquery-authe/api/v2/group/file/download?file-group-id=JPMAQS_GENERIC_RETURNS&file-datetime=20240115"
        );
    }

    #[test]
    fn test_files_root_override() {
        let urls = ApiUrls::new(
            "https://api.example.com/v2",
            Some("https://files.example.com/v2".to_string()),
        );
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert!(
            urls.availability("F", date)
                .unwrap()
                .starts_with("https://files.example.com/v2/group/file/availability?")
        );
        assert_eq!(
            urls.files("G 1").unwrap(),
            "https://files.example.com/v2/group/files?group-id=G+1"
        );
    }

    #[test]
    fn test_url_length_limit() {
        let long = "X".repeat(MAX_URL_LENGTH);
        let err = urls().files(&long).unwrap_err();
        assert!(matches!(err, ClientError::UrlTooLong { .. }));
    }

    #[test]
    fn test_invalid_root() {
        let urls = ApiUrls::new("not a url", None);
        assert!(matches!(urls.files("G"), Err(ClientError::Config(_))));
    }
}
