use url::Url;

/// Extracts the host of a URL as stored on URL records
///
/// The host is lowercased; a non-default port is kept (`example.com:8080`)
/// so that services on different ports stay distinguishable.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use tidemark::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://example.com:8080/").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com:8080".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}
