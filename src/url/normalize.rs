use crate::UrlError;
use url::Url;

/// Normalizes a URL into the canonical key used throughout the archive
///
/// # Normalization Steps
///
/// 1. Resolve `raw` against `base` when one is given (relative paths,
///    absolute URLs and protocol-relative `//host/path` references)
/// 2. Parse the URL; reject if malformed
/// 3. Reject anything that is not HTTP(S) with a host
/// 4. Lowercase the scheme and host
/// 5. Strip default ports (80 for http, 443 for https)
/// 6. Remove fragment (everything after #)
///
/// Path and query are otherwise left as they were. The result is idempotent:
/// normalizing an already-normalized URL returns it unchanged.
///
/// # Arguments
///
/// * `raw` - The URL string to normalize
/// * `base` - Optional base URL to resolve relative references against
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use tidemark::url::normalize;
///
/// let url = normalize("HTTP://WWW.Example.COM:80/Page?b=2&a=1#top", None).unwrap();
/// assert_eq!(url.as_str(), "http://www.example.com/Page?b=2&a=1");
/// ```
pub fn normalize(raw: &str, base: Option<&Url>) -> Result<Url, UrlError> {
    let raw = raw.trim();

    let parsed = match base {
        Some(base) => base.join(raw),
        None => Url::parse(raw),
    }
    .map_err(|e| UrlError::Parse(format!("'{}': {}", raw, e)))?;

    canonicalize(parsed)
}

/// Applies the canonical form to an already parsed URL
pub fn canonicalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingHost),
    }

    // Scheme and host lowercasing and default-port removal happen in the
    // parser for special schemes; only the fragment is left to drop.
    url.set_fragment(None);

    Ok(url)
}
