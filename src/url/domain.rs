use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use news_harvest::url::extract_domain;
///
/// let url = Url::parse("https://WWW.RFA.ORG/khmer").unwrap();
/// assert_eq!(extract_domain(&url), Some("www.rfa.org".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Normalizes a domain into the key used for source ids and scraper lookup
///
/// Lowercases, trims a trailing dot and strips a single leading `www.`.
///
/// ```
/// use news_harvest::url::registry_key;
///
/// assert_eq!(registry_key("WWW.PostKhmer.com"), "postkhmer.com");
/// assert_eq!(registry_key("news.sabay.com.kh"), "news.sabay.com.kh");
/// ```
pub fn registry_key(domain: &str) -> String {
    let lower = domain.trim().trim_end_matches('.').to_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lower,
    }
}

/// Returns true if `url` belongs to the site identified by `key`
pub fn same_site(url: &Url, key: &str) -> bool {
    extract_domain(url)
        .map(|d| registry_key(&d) == key)
        .unwrap_or(false)
}
