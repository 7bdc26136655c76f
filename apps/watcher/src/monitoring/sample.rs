use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::endpoint::Endpoint;

/// Status code recorded when no HTTP response was obtained
pub const TRANSPORT_FAILURE: u16 = 0;

/// A probe that has started but has no outcome yet.
///
/// Consuming it through [`PendingSample::response`] or
/// [`PendingSample::failed`] finalizes it exactly once.
#[derive(Debug)]
pub struct PendingSample {
    endpoint: Arc<Endpoint>,
    start_time: DateTime<Utc>,
    started: Instant,
}

impl PendingSample {
    /// Capture the start time of a probe
    pub fn start(endpoint: Arc<Endpoint>) -> Self {
        Self { endpoint, start_time: Utc::now(), started: Instant::now() }
    }

    /// Finalize from a received response.
    ///
    /// `body` is only looked at when `status_code` is 200. Without a pattern
    /// a 200 always counts as a match.
    pub fn response(self, status_code: u16, body: Option<&str>) -> Sample {
        let content_match = status_code == 200
            && match self.endpoint.pattern() {
                None => true,
                Some(pattern) => body.is_some_and(|body| pattern.matches(body)),
            };
        self.finish(status_code, content_match)
    }

    /// Finalize from a transport-level failure
    pub fn failed(self) -> Sample {
        self.finish(TRANSPORT_FAILURE, false)
    }

    fn finish(self, status_code: u16, content_match: bool) -> Sample {
        Sample {
            duration: self.started.elapsed().as_secs_f64(),
            endpoint: self.endpoint,
            start_time: self.start_time,
            status_code,
            content_match,
        }
    }
}

/// One observation of an endpoint
#[derive(Debug, Clone)]
pub struct Sample {
    endpoint: Arc<Endpoint>,
    start_time: DateTime<Utc>,
    duration: f64,
    status_code: u16,
    content_match: bool,
}

impl Sample {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn endpoint_id(&self) -> i64 {
        self.endpoint.id()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Seconds from request start to the terminal outcome
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn content_match(&self) -> bool {
        self.content_match
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status_code == TRANSPORT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(pattern: Option<&str>) -> Arc<Endpoint> {
        Arc::new(Endpoint::new(1, "http://testserver:8000/welcome", pattern, 5).unwrap())
    }

    #[test]
    fn test_match_with_simple_pattern() {
        let sample = PendingSample::start(endpoint(Some(".*welcome")))
            .response(200, Some("You are always welcome!"));
        assert_eq!(sample.status_code(), 200);
        assert!(sample.content_match());
        assert!(sample.duration() >= 0.0);
    }

    #[test]
    fn test_pattern_not_matching() {
        let pattern = r"you.*welcome at\s[0-9]{2}:[0-9]{2}$";
        let sample = PendingSample::start(endpoint(Some(pattern))).response(200, Some("Hello World"));
        assert_eq!(sample.status_code(), 200);
        assert!(!sample.content_match());

        let sample = PendingSample::start(endpoint(Some(pattern)))
            .response(200, Some("you are welcome at 12:00"));
        assert!(sample.content_match());
    }

    #[test]
    fn test_non_200_never_matches() {
        let sample = PendingSample::start(endpoint(Some("you.*")))
            .response(500, Some("you are welcome at 12:00"));
        assert_eq!(sample.status_code(), 500);
        assert!(!sample.content_match());

        let sample = PendingSample::start(endpoint(None)).response(204, None);
        assert!(!sample.content_match());
    }

    #[test]
    fn test_no_pattern_is_automatic_match() {
        let sample = PendingSample::start(endpoint(None)).response(200, Some("anything"));
        assert!(sample.content_match());
    }

    #[test]
    fn test_failed_request() {
        let pending = PendingSample::start(endpoint(Some(".*")));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let sample = pending.failed();
        assert_eq!(sample.status_code(), TRANSPORT_FAILURE);
        assert!(sample.is_transport_failure());
        assert!(!sample.content_match());
        assert!(sample.duration() > 0.0);
    }
}
