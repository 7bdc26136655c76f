use std::fmt;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use url::Url;

/// Shortest allowed polling interval in seconds
pub const MIN_INTERVAL_SECONDS: u64 = 5;
/// Longest allowed polling interval in seconds
pub const MAX_INTERVAL_SECONDS: u64 = 300;

/// Reasons an endpoint row cannot be turned into an [`Endpoint`]
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error(
        "interval {0}s is outside {MIN_INTERVAL_SECONDS}..={MAX_INTERVAL_SECONDS} seconds"
    )]
    Interval(u64),
    #[error("invalid url {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported url scheme {0:?}, expected http or https")]
    Scheme(String),
    #[error("invalid content pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled content-match expression.
///
/// A body matches when the expression matches at its very beginning; the
/// match does not need to span the whole body.
#[derive(Debug, Clone)]
pub struct ContentPattern {
    regex: Regex,
}

impl ContentPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self { regex: Regex::new(pattern)? })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Check `body` against the pattern
    pub fn matches(&self, body: &str) -> bool {
        // Leftmost-first search: a match starting at 0 is always the one found.
        self.regex.find(body).is_some_and(|m| m.start() == 0)
    }
}

/// One monitored target.
///
/// Endpoints are loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Endpoint {
    id: i64,
    url: Url,
    pattern: Option<ContentPattern>,
    interval: Duration,
}

impl Endpoint {
    /// Validate and build an endpoint.
    ///
    /// An empty pattern string means "no pattern".
    pub fn new(
        id: i64,
        url: &str,
        pattern: Option<&str>,
        interval_seconds: u64,
    ) -> Result<Self, EndpointError> {
        if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&interval_seconds) {
            return Err(EndpointError::Interval(interval_seconds));
        }

        let parsed = Url::parse(url)
            .map_err(|source| EndpointError::Url { url: url.to_string(), source })?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(EndpointError::Scheme(other.to_string())),
        }

        let pattern = match pattern.filter(|p| !p.is_empty()) {
            Some(raw) => Some(ContentPattern::new(raw).map_err(|source| {
                EndpointError::Pattern { pattern: raw.to_string(), source }
            })?),
            None => None,
        };

        Ok(Self { id, url: parsed, pattern, interval: Duration::from_secs(interval_seconds) })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn pattern(&self) -> Option<&ContentPattern> {
        self.pattern.as_ref()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} every {}s", self.id, self.url, self.interval.as_secs())
    }
}
