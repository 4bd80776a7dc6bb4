//! Client classification: user agent parsing, bot detection, coarse geo.
//!
//! User agents are parsed with woothee (~6.8us/parse). Raw user agents and
//! IPs are only ever used as hash inputs and are never stored.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use woothee::parser::Parser;

use crate::limits::{truncate, MAX_LANGUAGE_LEN, MAX_SCREEN_LEN};

/// Crawler signatures woothee does not classify as crawlers.
///
/// `bot` matches only as a standalone word or a product token (`Foobot/1.0`,
/// `Slackbot-LinkExpanding`), so handset names like CUBOT stay browsers.
static BOT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(bot|bot[/\-_;)+]|crawl|spider|slurp|headless|lighthouse|pagespeed|phantomjs|puppeteer|playwright|python-requests|curl/|wget/|go-http-client|axios/|node-fetch|uptime|pingdom|monitoring|monitor/)",
    )
    .expect("invalid bot pattern")
});

/// Coarse geo attributes as supplied by the CDN in front of the collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// Resolved client attributes stored on the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub browser: String,
    pub os: String,
    pub device: String,
    pub screen: String,
    pub language: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// User agent parser and bot classifier.
pub struct ClientClassifier {
    parser: Parser,
    ignored_ips: HashSet<IpAddr>,
}

impl ClientClassifier {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            ignored_ips: HashSet::new(),
        }
    }

    /// Adds IPs whose traffic is treated like bot traffic.
    ///
    /// Entries that do not parse as IP addresses are skipped.
    pub fn with_ignored_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored_ips.extend(
            ips.into_iter()
                .filter_map(|ip| ip.as_ref().trim().parse::<IpAddr>().ok()),
        );
        self
    }

    /// Returns true for known automated traffic.
    pub fn is_bot(&self, user_agent: &str, ip: Option<&str>) -> bool {
        if let Some(ip) = ip.and_then(|ip| ip.trim().parse::<IpAddr>().ok()) {
            if self.ignored_ips.contains(&ip) {
                return true;
            }
        }

        if user_agent.trim().is_empty() {
            return false;
        }

        if let Some(result) = self.parser.parse(user_agent) {
            if result.category == "crawler" {
                return true;
            }
        }

        BOT_PATTERN.is_match(user_agent)
    }

    /// Parse user agent, screen, language and geo into session attributes.
    pub fn classify(
        &self,
        user_agent: &str,
        screen: Option<&str>,
        language: Option<&str>,
        geo: &GeoInfo,
    ) -> ClientInfo {
        let mut info = ClientInfo {
            browser: "unknown".into(),
            os: "unknown".into(),
            device: "unknown".into(),
            screen: screen.map(|s| truncate(s, MAX_SCREEN_LEN)).unwrap_or_default(),
            language: language.map(|l| truncate(l, MAX_LANGUAGE_LEN)).unwrap_or_default(),
            country: geo.country.clone(),
            region: geo.region.clone(),
            city: geo.city.clone(),
        };

        if user_agent.is_empty() {
            return info;
        }

        if let Some(result) = self.parser.parse(user_agent) {
            if !result.name.is_empty() && result.name != "UNKNOWN" {
                info.browser = result.name.to_string();
            }
            if !result.os.is_empty() && result.os != "UNKNOWN" {
                info.os = result.os.to_string();
            }

            // woothee categories: pc, smartphone, mobilephone, crawler, appliance, misc
            info.device = match result.category {
                "pc" => "desktop",
                "smartphone" if screen_width(screen).is_some_and(|w| w >= 768) => "tablet",
                "smartphone" | "mobilephone" => "mobile",
                "crawler" => "bot",
                "appliance" => "other",
                _ => "unknown",
            }
            .to_string();
        }

        info
    }
}

impl Default for ClientClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Width component of a "WIDTHxHEIGHT" screen string.
fn screen_width(screen: Option<&str>) -> Option<u32> {
    screen?.split('x').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn test_chrome_macos() {
        let classifier = ClientClassifier::new();
        let info = classifier.classify(CHROME_MAC, Some("1920x1080"), Some("en-US"), &GeoInfo::default());

        assert_eq!(info.browser, "Chrome");
        assert_eq!(info.os, "Mac OSX");
        assert_eq!(info.device, "desktop");
        assert_eq!(info.screen, "1920x1080");
        assert_eq!(info.language, "en-US");
    }

    #[test]
    fn test_bot_tokens() {
        let classifier = ClientClassifier::new();
        for ua in [
            "Slackbot-LinkExpanding 1.0 (+https://api.slack.com/robots)",
            "Mozilla/5.0 (compatible; UptimeRobot/2.0; http://www.uptimerobot.com/)",
            "Mozilla/5.0 (compatible; SemrushBot/7~bl; +http://www.semrush.com/bot.html)",
            "Site24x7 monitoring agent",
        ] {
            assert!(classifier.is_bot(ua, None), "{ua}");
        }
    }

    #[test]
    fn test_browsers_named_like_bots() {
        let classifier = ClientClassifier::new();
        for ua in [
            "Mozilla/5.0 (Linux; Android 10; CUBOT X30) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.120 Mobile Safari/537.36",
            "Mozilla/5.0 (Linux; Tizen 6.5; Smart Monitor M7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/94.0.4606.31 Safari/537.36",
        ] {
            assert!(!classifier.is_bot(ua, None), "{ua}");
        }
    }

    #[test]
    fn test_screen_and_language_truncated() {
        let classifier = ClientClassifier::new();
        let long = "x".repeat(100);
        let info = classifier.classify(CHROME_MAC, Some(&long), Some(&long), &GeoInfo::default());
        assert_eq!(info.screen.chars().count(), MAX_SCREEN_LEN);
        assert_eq!(info.language.chars().count(), MAX_LANGUAGE_LEN);
    }

    #[test]
    fn test_iphone_is_mobile() {
        let classifier = ClientClassifier::new();
        let info = classifier.classify(IPHONE, Some("390x844"), None, &GeoInfo::default());

        assert_eq!(info.browser, "Safari");
        assert_eq!(info.device, "mobile");
    }

    #[test]
    fn test_geo_is_carried() {
        let classifier = ClientClassifier::new();
        let geo = GeoInfo {
            country: Some("DE".into()),
            region: Some("BE".into()),
            city: Some("Berlin".into()),
        };
        let info = classifier.classify(CHROME_MAC, None, None, &geo);
        assert_eq!(info.country.as_deref(), Some("DE"));
        assert_eq!(info.city.as_deref(), Some("Berlin"));
    }

    #[test]
    fn test_empty_user_agent_stays_unknown() {
        let classifier = ClientClassifier::new();
        let info = classifier.classify("", None, None, &GeoInfo::default());
        assert_eq!(info.browser, "unknown");
        assert_eq!(info.device, "unknown");
    }

    #[test]
    fn test_bot_detection() {
        let classifier = ClientClassifier::new();
        assert!(classifier.is_bot(GOOGLEBOT, None));
        assert!(classifier.is_bot("Mozilla/5.0 (X11; Linux x86_64) HeadlessChrome/120.0.0.0", None));
        assert!(classifier.is_bot("curl/8.4.0", None));
        assert!(!classifier.is_bot(CHROME_MAC, None));
        assert!(!classifier.is_bot(IPHONE, None));
        assert!(!classifier.is_bot("", None));
    }

    #[test]
    fn test_ignored_ips() {
        let classifier = ClientClassifier::new().with_ignored_ips(["10.0.0.7", "not-an-ip"]);
        assert!(classifier.is_bot(CHROME_MAC, Some("10.0.0.7")));
        assert!(!classifier.is_bot(CHROME_MAC, Some("10.0.0.8")));
    }
}
