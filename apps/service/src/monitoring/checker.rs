use std::error::Error as _;
use std::time::Duration;

use reqwest::redirect::Policy;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use super::types::Outcome;
use super::validation::ValidCheck;

const USER_AGENT: &str = concat!("upwatch/", env!("CARGO_PKG_VERSION"));

/// Performs one probe against a check's target.
///
/// Implementations never fail: every transport problem is folded into an
/// errored [`Outcome`].
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, check: &ValidCheck) -> Outcome;
}

/// HTTP/HTTPS prober.
///
/// Redirects are not followed, so a `301` is reported as `301`.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Create a new prober. Redirects are never followed.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }
}

/// Build the request URL from the check's protocol and `host/path?query`.
pub fn target_url(check: &ValidCheck) -> Result<Url, url::ParseError> {
    Url::parse(&check.target())
}

/// Flatten an error and its sources into one line.
fn describe(error: &reqwest::Error) -> String {
    let mut detail = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, check: &ValidCheck) -> Outcome {
        let target = match target_url(check) {
            Ok(target) => target,
            Err(e) => return Outcome::failure(format!("invalid target {}: {e}", check.target())),
        };
        let limit = Duration::from_secs(check.timeout_seconds);

        let request = self.client.request(check.method.into(), target).timeout(limit).send();

        // Whichever of the response, the transport error or the deadline comes
        // first decides the outcome; the other is dropped with the future.
        let outcome = match timeout(limit, request).await {
            Ok(Ok(response)) => Outcome::response(response.status().as_u16()),
            Ok(Err(e)) if e.is_timeout() => Outcome::timed_out(),
            Ok(Err(e)) => Outcome::failure(describe(&e)),
            Err(_) => Outcome::timed_out(),
        };

        debug!(check_id = %check.id, ?outcome, "Probe finished");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::{CheckState, Method, Protocol};
    use crate::test_support::{closed_port, serve_once, silent_server};
    use std::time::Instant;

    fn check(url: String, method: Method, timeout_seconds: u64) -> ValidCheck {
        ValidCheck {
            id: "abcdefghij0123456789".into(),
            user_phone: "5551234567".into(),
            protocol: Protocol::Http,
            url,
            method,
            success_codes: vec![200],
            timeout_seconds,
            state: CheckState::Down,
            last_checked: None,
        }
    }

    #[test]
    fn builds_target_with_path_and_query() {
        let check = check("example.com:8080/health?deep=1".into(), Method::Get, 1);
        let url = target_url(&check).unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.port(), Some(8080));
        assert_eq!(url.path(), "/health");
        assert_eq!(url.query(), Some("deep=1"));
    }

    #[tokio::test]
    async fn reports_status_code_and_method() {
        let (addr, request) = serve_once("HTTP/1.1 404 Not Found").await;
        let prober = HttpProber::new().unwrap();

        let outcome = prober.probe(&check(format!("{addr}/missing?x=1"), Method::Delete, 2)).await;

        assert_eq!(outcome, Outcome::response(404));
        let request = request.await.unwrap();
        assert!(request.starts_with("DELETE /missing?x=1 HTTP/1.1"), "{request}");
    }

    #[tokio::test]
    async fn does_not_follow_redirects() {
        let (addr, _request) =
            serve_once("HTTP/1.1 301 Moved Permanently\r\nLocation: http://127.0.0.1:1/").await;
        let prober = HttpProber::new().unwrap();

        let outcome = prober.probe(&check(addr.to_string(), Method::Get, 2)).await;
        assert_eq!(outcome, Outcome::response(301));
    }

    #[tokio::test]
    async fn connection_refused_is_an_error() {
        let addr = closed_port().await;
        let prober = HttpProber::new().unwrap();

        let outcome = prober.probe(&check(addr.to_string(), Method::Get, 2)).await;
        assert!(outcome.errored);
        assert!(!outcome.is_timeout());
        assert_eq!(outcome.response_code, None);
    }

    #[tokio::test]
    async fn silent_target_times_out_once() {
        let (addr, _server) = silent_server().await;
        let prober = HttpProber::new().unwrap();

        let started = Instant::now();
        let outcome = prober.probe(&check(addr.to_string(), Method::Post, 1)).await;

        assert!(outcome.is_timeout(), "{outcome:?}");
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
