//! Where the URL list of a batch comes from

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::collector::core::{CollectorError, FileOperation, Result};

static LOC_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<loc>\s*(.*?)\s*</loc>").unwrap());

const SITEMAP_TIMEOUT: Duration = Duration::from_secs(30);

/// A list of URLs to collect
#[derive(Debug, Clone, PartialEq)]
pub enum UrlSource {
    /// A domain (`example.com`) or a full sitemap URL
    Sitemap(String),
    /// A text file with one URL per line
    File(PathBuf),
}

impl UrlSource {
    pub async fn load(&self, client: &Client) -> Result<Vec<String>> {
        match self {
            UrlSource::Sitemap(target) => {
                let sitemap = sitemap_url(target)?;
                fetch_sitemap(client, &sitemap).await
            }
            UrlSource::File(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| CollectorError::FileSystem {
                    path: path.clone(),
                    operation: FileOperation::Read,
                    source: e,
                })?;
                let urls = parse_url_list(&text);
                info!("Found {} URLs in {}", urls.len(), path.display());
                Ok(urls)
            }
        }
    }
}

/// Turn a domain or URL into the sitemap location to fetch
///
/// A missing scheme becomes `https://`; a bare host gets `/sitemap.xml`.
pub fn sitemap_url(target: &str) -> Result<String> {
    let target = target.trim().trim_end_matches('/');
    let with_scheme = if target.contains("://") {
        target.to_string()
    } else {
        format!("https://{}", target)
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| CollectorError::InvalidUrl {
        url: target.to_string(),
        suggestion: "Pass a domain such as example.com or a full sitemap URL".to_string(),
        source: e,
    })?;

    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/sitemap.xml");
    }
    Ok(url.to_string())
}

/// Pull every `<loc>` value out of a sitemap document
pub fn extract_locs(xml: &str) -> Vec<String> {
    LOC_PATTERN
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .filter(|u| !u.is_empty())
        .collect()
}

/// One URL per non-blank line
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keep at most `max` URLs
pub fn cap_urls(mut urls: Vec<String>, max: Option<usize>) -> Vec<String> {
    if let Some(max) = max {
        if max < urls.len() {
            info!("Limiting analysis to {} URLs out of {} found", max, urls.len());
            urls.truncate(max);
        }
    }
    urls
}

pub async fn fetch_sitemap(client: &Client, sitemap: &str) -> Result<Vec<String>> {
    fetch_sitemap_within(client, sitemap, SITEMAP_TIMEOUT).await
}

async fn fetch_sitemap_within(client: &Client, sitemap: &str, timeout: Duration) -> Result<Vec<String>> {
    debug!("Fetching sitemap {}", sitemap);
    let response = client
        .get(sitemap)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| CollectorError::request(sitemap, timeout, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(CollectorError::HttpStatus {
            url: sitemap.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| CollectorError::request(sitemap, timeout, e))?;
    let urls = extract_locs(&body);
    info!("Found {} URLs in sitemap {}", urls.len(), sitemap);
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_sitemap_url_normalization() {
        assert_eq!(sitemap_url("example.com").unwrap(), "https://example.com/sitemap.xml");
        assert_eq!(sitemap_url("https://example.com/").unwrap(), "https://example.com/sitemap.xml");
        assert_eq!(
            sitemap_url("http://example.com/sitemap_index.xml").unwrap(),
            "http://example.com/sitemap_index.xml"
        );
        assert!(sitemap_url("exa mple.com").is_err());
    }

    #[test]
    fn test_extract_locs() {
        let xml = r#"<?xml version="1.0"?>
            <urlset>
              <url><loc>https://a.example/</loc></url>
              <url><loc>
                https://a.example/page?x=1&amp;y=2
              </loc></url>
            </urlset>"#;
        assert_eq!(
            extract_locs(xml),
            vec!["https://a.example/", "https://a.example/page?x=1&y=2"]
        );
    }

    #[test]
    fn test_cap_urls() {
        let urls: Vec<String> = (0..5).map(|i| format!("https://a.example/{i}")).collect();
        assert_eq!(cap_urls(urls.clone(), Some(2)).len(), 2);
        assert_eq!(cap_urls(urls.clone(), Some(10)).len(), 5);
        assert_eq!(cap_urls(urls, None).len(), 5);
    }

    #[tokio::test]
    async fn test_file_source_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "https://a.example/\n\n  https://b.example/  \n").unwrap();

        let urls = UrlSource::File(file.path().to_path_buf())
            .load(&Client::new())
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://a.example/", "https://b.example/"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_a_file_system_error() {
        let err = UrlSource::File(PathBuf::from("/nonexistent/urls.txt"))
            .load(&Client::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "file_system");
    }

    #[tokio::test]
    async fn test_sitemap_source_fetches_and_extracts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<urlset><url><loc>https://a.example/</loc></url><url><loc>https://b.example/</loc></url></urlset>",
            ))
            .mount(&server)
            .await;

        let urls = UrlSource::Sitemap(server.uri()).load(&Client::new()).await.unwrap();
        assert_eq!(urls, vec!["https://a.example/", "https://b.example/"]);
    }

    #[tokio::test]
    async fn test_sitemap_http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = UrlSource::Sitemap(server.uri()).load(&Client::new()).await.unwrap_err();
        assert!(matches!(err, CollectorError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_sitemap_timeout_carries_the_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let sitemap = format!("{}/sitemap.xml", server.uri());
        let err = fetch_sitemap_within(&Client::new(), &sitemap, Duration::from_millis(1500))
            .await
            .unwrap_err();
        match err {
            CollectorError::NetworkTimeout { url, duration_secs } => {
                assert_eq!(url, sitemap);
                assert_eq!(duration_secs, 1);
            }
            other => panic!("Expected NetworkTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sitemap_connection_failure_is_a_request_error() {
        // Nothing listens on the discard port
        let err = fetch_sitemap(&Client::new(), "http://127.0.0.1:9/sitemap.xml")
            .await
            .unwrap_err();
        assert_eq!(err.category(), "http_request");
        assert!(err.is_recoverable());
    }
}
