//! Which requests the offline worker is allowed to answer.
//!
//! The worker only ever answers GET requests. On top of that a deny-list
//! keeps it away from browser extension resources, which live in their own
//! URL schemes and must reach the network untouched.

use crate::{Request, Url};
use http::Method;
use tracing::trace;

/// Outcome of [`RequestInterceptor::intercept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptAction {
    /// The worker answers the request.
    Intercept,
    /// The request goes straight to the network.
    Bypass,
}

/// A deny-list entry, matched against the full serialized URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassRule {
    /// URL starts with the marker, e.g. `chrome-extension://`.
    Prefix(String),
    /// URL contains the marker anywhere.
    Contains(String),
}

impl BypassRule {
    pub fn matches(&self, url: &Url) -> bool {
        match self {
            BypassRule::Prefix(marker) => url.as_str().starts_with(marker.as_str()),
            BypassRule::Contains(marker) => url.as_str().contains(marker.as_str()),
        }
    }

    fn marker(&self) -> &str {
        match self {
            BypassRule::Prefix(marker) | BypassRule::Contains(marker) => marker,
        }
    }
}

/// GET-only request filter with a URL deny-list.
#[derive(Debug, Clone, Default)]
pub struct RequestInterceptor {
    rules: Vec<BypassRule>,
}

impl RequestInterceptor {
    /// Bypass every URL starting with one of `prefixes` or containing one of
    /// `substrings`.
    pub fn with_denylist<P, C>(prefixes: P, substrings: C) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let prefix_rules = prefixes
            .into_iter()
            .map(|p| BypassRule::Prefix(p.as_ref().to_owned()));
        let contains_rules = substrings
            .into_iter()
            .map(|c| BypassRule::Contains(c.as_ref().to_owned()));

        Self {
            rules: prefix_rules.chain(contains_rules).collect(),
        }
    }

    pub fn intercept(&self, request: &Request) -> InterceptAction {
        if request.method != Method::GET {
            trace!(url = %request.url, method = %request.method, "Left to the network: not a GET");
            return InterceptAction::Bypass;
        }

        match self.rules.iter().find(|rule| rule.matches(&request.url)) {
            Some(rule) => {
                trace!(url = %request.url, marker = rule.marker(), "Left to the network: deny-listed");
                InterceptAction::Bypass
            }
            None => InterceptAction::Intercept,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn extension_denylist() -> RequestInterceptor {
        RequestInterceptor::with_denylist(
            ["chrome-extension://", "moz-extension://", "safari-extension://", "edge-extension://"],
            ["chrome-extension", "moz-extension", "safari-extension"],
        )
    }

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_rule_matching() {
        let url = Url::parse("https://example.com/videos/hero2.webm").unwrap();
        assert!(BypassRule::Prefix("https://example.com/".into()).matches(&url));
        assert!(!BypassRule::Prefix("https://cdn.example.com/".into()).matches(&url));
        assert!(BypassRule::Contains("hero2".into()).matches(&url));
        assert!(!BypassRule::Contains("hero3".into()).matches(&url));
    }

    #[test]
    fn test_plain_get_is_intercepted() {
        let interceptor = extension_denylist();
        assert_eq!(
            interceptor.intercept(&get("https://example.com/static/js/bundle.js")),
            InterceptAction::Intercept
        );
        assert_eq!(
            RequestInterceptor::default().intercept(&get("https://example.com/")),
            InterceptAction::Intercept
        );
    }

    #[test]
    fn test_non_get_bypassed() {
        let interceptor = extension_denylist();
        let request = Request::post(
            Url::parse("https://example.com/contact").unwrap(),
            Bytes::from_static(b"name=x"),
        );
        assert_eq!(interceptor.intercept(&request), InterceptAction::Bypass);

        let mut head = get("https://example.com/");
        head.method = Method::HEAD;
        assert_eq!(interceptor.intercept(&head), InterceptAction::Bypass);
    }

    #[test]
    fn test_extension_schemes_bypassed() {
        let interceptor = extension_denylist();
        for url in [
            "chrome-extension://abcdef/content.js",
            "moz-extension://1234/background.html",
            "safari-extension://com.example/script.js",
            "edge-extension://xyz/popup.html",
        ] {
            assert_eq!(interceptor.intercept(&get(url)), InterceptAction::Bypass, "{url}");
        }
    }

    #[test]
    fn test_extension_substring_bypassed() {
        let interceptor = extension_denylist();
        assert_eq!(
            interceptor.intercept(&get("https://example.com/proxy?from=chrome-extension")),
            InterceptAction::Bypass
        );
    }

    #[test]
    fn test_denylist_from_owned_settings() {
        let prefixes = vec!["https://cdn.example.com/".to_string()];
        let contains = vec!["/api/".to_string()];
        let interceptor = RequestInterceptor::with_denylist(&prefixes, &contains);

        assert_eq!(
            interceptor.intercept(&get("https://example.com/api/contact")),
            InterceptAction::Bypass
        );
        assert_eq!(
            interceptor.intercept(&get("https://cdn.example.com/fonts/inter.woff2")),
            InterceptAction::Bypass
        );
        assert_eq!(
            interceptor.intercept(&get("https://example.com/assets/resume.pdf")),
            InterceptAction::Intercept
        );
    }
}
