use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::endpoint::Endpoint;
use super::sample::{PendingSample, Sample};

/// Performs one probe of an endpoint.
///
/// Failures are not errors here: every call yields a finished [`Sample`].
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, endpoint: &Arc<Endpoint>) -> Sample;
}

/// HTTP GET checker backed by a shared connection pool
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(timeout: Duration, user_agent: &str) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).user_agent(user_agent).build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, endpoint: &Arc<Endpoint>) -> Sample {
        let pending = PendingSample::start(Arc::clone(endpoint));

        let response = match self.client.get(endpoint.url().clone()).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(endpoint_id = endpoint.id(), url = %endpoint.url(), %error, "request failed");
                return pending.failed();
            }
        };

        let status_code = response.status().as_u16();
        if status_code != 200 {
            return pending.response(status_code, None);
        }

        // The duration of a 200 covers the full body transfer.
        match response.text().await {
            Ok(body) => pending.response(status_code, Some(&body)),
            Err(error) => {
                debug!(endpoint_id = endpoint.id(), url = %endpoint.url(), %error, "reading body failed");
                pending.failed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn checker() -> HttpChecker {
        HttpChecker::new(Duration::from_secs(2), "uptime-watcher-test").unwrap()
    }

    fn endpoint(server: &MockServer, pattern: Option<&str>) -> Arc<Endpoint> {
        Arc::new(Endpoint::new(1, &format!("{}/welcome", server.uri()), pattern, 5).unwrap())
    }

    #[tokio::test]
    async fn test_http_check_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/welcome"))
            .respond_with(ResponseTemplate::new(200).set_body_string("You are always welcome!"))
            .mount(&server)
            .await;

        let sample = checker().check(&endpoint(&server, Some(".*welcome"))).await;
        assert_eq!(sample.status_code(), 200);
        assert!(sample.content_match());
    }

    #[tokio::test]
    async fn test_http_check_no_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Hello World"))
            .mount(&server)
            .await;

        let pattern = r"you.*welcome at\s[0-9]{2}:[0-9]{2}$";
        let sample = checker().check(&endpoint(&server, Some(pattern))).await;
        assert_eq!(sample.status_code(), 200);
        assert!(!sample.content_match());
    }

    #[tokio::test]
    async fn test_http_check_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("You are always welcome!"))
            .mount(&server)
            .await;

        let sample = checker().check(&endpoint(&server, None)).await;
        assert_eq!(sample.status_code(), 503);
        assert!(!sample.content_match());
    }

    #[tokio::test]
    async fn test_http_check_slow_body_counts_full_duration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let sample = checker().check(&endpoint(&server, None)).await;
        assert_eq!(sample.status_code(), 200);
        assert!(sample.duration() >= 0.3, "duration was {}", sample.duration());
        assert!(sample.duration() < 2.0);
    }

    #[tokio::test]
    async fn test_http_check_connection_refused() {
        // Bind then drop a listener so the port is known to be closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoint =
            Arc::new(Endpoint::new(7, &format!("http://127.0.0.1:{port}/"), None, 5).unwrap());

        let sample = checker().check(&endpoint).await;
        assert_eq!(sample.status_code(), 0);
        assert!(!sample.content_match());
        assert!(sample.duration() > 0.0);
    }

    #[tokio::test]
    async fn test_http_check_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let checker = HttpChecker::new(Duration::from_millis(200), "uptime-watcher-test").unwrap();
        let sample = checker.check(&endpoint(&server, None)).await;
        assert!(sample.is_transport_failure());
        assert!(sample.duration() >= 0.2);
    }
}
