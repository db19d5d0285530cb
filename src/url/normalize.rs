use crate::UrlError;
use url::Url;

/// Normalizes a browser location for comparison against the search page
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Treat http:// as https://
/// 3. Lowercase the host and remove the www. prefix
/// 4. Normalize path:
///    - Remove dot segments (. and ..)
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 5. Remove fragment and query string
///
/// # Arguments
///
/// * `url_str` - The location to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use registry_harvester::url::normalize_location;
///
/// let url = normalize_location("http://WWW.EXAMPLE.ORG/busca-medicos/?uf=RR#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.org/busca-medicos");
/// ```
pub fn normalize_location(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    // Portals bounce between http and https; both count as the same page
    if url.scheme() == "http" {
        url.set_scheme("https")
            .map_err(|_| UrlError::InvalidScheme(url_str.to_string()))?;
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);
    url.set_query(None);

    Ok(url)
}

/// Returns true if `actual` is the expected page or a page beneath it
///
/// Hosts must match after normalization; the actual path must equal the
/// expected path or extend it by whole segments. Unparseable locations never
/// match.
pub fn matches_expected_location(actual: &str, expected: &str) -> bool {
    let (Ok(actual), Ok(expected)) = (normalize_location(actual), normalize_location(expected))
    else {
        return false;
    };

    if actual.host_str() != expected.host_str() || actual.port() != expected.port() {
        return false;
    }

    let expected_path = expected.path();
    let actual_path = actual.path();

    if expected_path == "/" || actual_path == expected_path {
        return true;
    }

    actual_path
        .strip_prefix(expected_path)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}
