//! Site key derivation from the page location.

use std::fmt;

/// Normalized host used to partition stored and staged credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteKey(String);

impl SiteKey {
    /// Derive the key for a page URL.
    ///
    /// Strips an `https://` or `http://` scheme and a leading `www.`, then
    /// cuts at the first `/`, `?` or `#` unless it sits at position 0.
    /// Never fails: input without a separator is returned whole.
    pub fn from_url(url: &str) -> Self {
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        let rest = rest.strip_prefix("www.").unwrap_or(rest);

        let site = match rest.find(&['/', '?', '#'][..]) {
            Some(index) if index > 0 => &rest[..index],
            _ => rest,
        };

        SiteKey(site.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SiteKey> for String {
    fn from(key: SiteKey) -> Self {
        key.0
    }
}

/// Shorthand for [`SiteKey::from_url`]
pub fn site_key(url: &str) -> SiteKey {
    SiteKey::from_url(url)
}
