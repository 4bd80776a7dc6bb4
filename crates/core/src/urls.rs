//! URL and referrer decomposition.
//!
//! Campaign (`utm_*`) and ad-click parameters are lifted into dedicated
//! fields and removed from the stored query string.

use std::sync::LazyLock;

use url::{form_urlencoded, ParseError, Url};

use crate::events::Campaign;
use crate::limits::{truncate, MAX_CAMPAIGN_LEN, MAX_DOMAIN_LEN, MAX_URL_LEN};

static RELATIVE_BASE: LazyLock<Url> =
    LazyLock::new(|| Url::parse("https://localhost").expect("invalid base URL"));

/// Query parameters extracted into [`Campaign`].
pub const CAMPAIGN_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
    "gclid",
    "fbclid",
    "msclkid",
    "ttclid",
    "li_fat_id",
    "twclid",
];

/// Path, query and domain of a URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    pub path: String,
    /// Query string without the leading `?`
    pub query: String,
    /// Host with any leading `www.` removed; empty for relative URLs
    pub domain: String,
}

/// Parses absolute URLs as-is and relative URLs against a placeholder base.
fn parse(raw: &str) -> Option<(Url, bool)> {
    match Url::parse(raw) {
        Ok(url) => Some((url, true)),
        Err(ParseError::RelativeUrlWithoutBase) => {
            RELATIVE_BASE.join(raw).ok().map(|url| (url, false))
        }
        Err(_) => None,
    }
}

fn normalize_path(path: &str, remove_trailing_slash: bool) -> String {
    let path = if remove_trailing_slash && path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    let path = if path.is_empty() { "/" } else { path };
    truncate(path, MAX_URL_LEN)
}

fn domain_of(url: &Url, absolute: bool) -> String {
    if !absolute {
        return String::new();
    }
    let host = url.host_str().unwrap_or_default();
    truncate(host.strip_prefix("www.").unwrap_or(host), MAX_DOMAIN_LEN)
}

/// Decomposes a referrer URL. Unparseable input yields empty parts.
pub fn decompose_referrer(raw: &str, remove_trailing_slash: bool) -> UrlParts {
    let Some((url, absolute)) = parse(raw.trim()) else {
        return UrlParts::default();
    };

    UrlParts {
        path: normalize_path(url.path(), remove_trailing_slash),
        query: truncate(url.query().unwrap_or_default(), MAX_URL_LEN),
        domain: domain_of(&url, absolute),
    }
}

/// Decomposes a page URL and extracts campaign parameters from its query.
pub fn decompose_page_url(raw: &str, remove_trailing_slash: bool) -> (UrlParts, Campaign) {
    let Some((url, absolute)) = parse(raw.trim()) else {
        return (
            UrlParts {
                path: "/".into(),
                ..Default::default()
            },
            Campaign::default(),
        );
    };

    let mut campaign = Campaign::default();
    let mut remaining = form_urlencoded::Serializer::new(String::new());
    let mut kept = 0usize;

    for (key, value) in url.query_pairs() {
        let value = truncate(&value, MAX_CAMPAIGN_LEN);
        let slot = match key.as_ref() {
            "utm_source" => &mut campaign.utm_source,
            "utm_medium" => &mut campaign.utm_medium,
            "utm_campaign" => &mut campaign.utm_campaign,
            "utm_content" => &mut campaign.utm_content,
            "utm_term" => &mut campaign.utm_term,
            "gclid" => &mut campaign.gclid,
            "fbclid" => &mut campaign.fbclid,
            "msclkid" => &mut campaign.msclkid,
            "ttclid" => &mut campaign.ttclid,
            "li_fat_id" => &mut campaign.li_fat_id,
            "twclid" => &mut campaign.twclid,
            _ => {
                remaining.append_pair(&key, &value);
                kept += 1;
                continue;
            }
        };
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value);
        }
    }

    let query = if kept > 0 { remaining.finish() } else { String::new() };

    let parts = UrlParts {
        path: normalize_path(url.path(), remove_trailing_slash),
        query: truncate(&query, MAX_URL_LEN),
        domain: domain_of(&url, absolute),
    };

    (parts, campaign)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_page_url() {
        let (parts, campaign) = decompose_page_url("/pricing?plan=pro", false);
        assert_eq!(parts.path, "/pricing");
        assert_eq!(parts.query, "plan=pro");
        assert_eq!(parts.domain, "");
        assert_eq!(campaign, Campaign::default());
    }

    #[test]
    fn test_campaign_params_extracted_from_query() {
        let (parts, campaign) = decompose_page_url(
            "https://www.example.com/landing?utm_source=news&ref=abc&utm_medium=email&gclid=XYZ&utm_campaign=spring",
            false,
        );
        assert_eq!(parts.path, "/landing");
        assert_eq!(parts.query, "ref=abc");
        assert_eq!(parts.domain, "example.com");
        assert_eq!(campaign.utm_source.as_deref(), Some("news"));
        assert_eq!(campaign.utm_medium.as_deref(), Some("email"));
        assert_eq!(campaign.utm_campaign.as_deref(), Some("spring"));
        assert_eq!(campaign.gclid.as_deref(), Some("XYZ"));
        assert!(campaign.fbclid.is_none());
    }

    #[test]
    fn test_only_campaign_params_leaves_empty_query() {
        let (parts, campaign) = decompose_page_url("/?fbclid=abc&twclid=def", false);
        assert_eq!(parts.query, "");
        assert_eq!(campaign.fbclid.as_deref(), Some("abc"));
        assert_eq!(campaign.twclid.as_deref(), Some("def"));
    }

    #[test]
    fn test_trailing_slash_policy() {
        let (kept, _) = decompose_page_url("/docs/", false);
        assert_eq!(kept.path, "/docs/");

        let (removed, _) = decompose_page_url("/docs/", true);
        assert_eq!(removed.path, "/docs");

        let (root, _) = decompose_page_url("/", true);
        assert_eq!(root.path, "/");
    }

    #[test]
    fn test_referrer_strips_www() {
        let parts = decompose_referrer("https://www.google.com/search?q=pulse", false);
        assert_eq!(parts.domain, "google.com");
        assert_eq!(parts.path, "/search");
        assert_eq!(parts.query, "q=pulse");
    }

    #[test]
    fn test_referrer_keeps_other_subdomains() {
        let parts = decompose_referrer("https://news.ycombinator.com/item?id=1", false);
        assert_eq!(parts.domain, "news.ycombinator.com");
    }

    #[test]
    fn test_unparseable_referrer_is_empty() {
        assert_eq!(decompose_referrer("http://[::1", false), UrlParts::default());
    }

    #[test]
    fn test_long_path_truncated() {
        let long = format!("/{}", "a".repeat(MAX_URL_LEN + 50));
        let (parts, _) = decompose_page_url(&long, false);
        assert_eq!(parts.path.chars().count(), MAX_URL_LEN);
    }
}
