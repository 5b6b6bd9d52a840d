//! HTTP GET probe

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use tokio::time::Instant;

use super::resolver::Resolver;
use super::ProbeError;

/// Add `http://` when the target carries no scheme
pub fn normalize_target(target: &str) -> Result<Url, ProbeError> {
    let target = target.trim();
    let with_scheme = if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("http://{}", target)
    };
    Url::parse(&with_scheme).map_err(|_| ProbeError::InvalidTarget(target.to_string()))
}

/// Time a GET request; any status in [200, 400) counts as reachable.
///
/// The host name is resolved before the clock starts and pinned for the
/// request, so the Host header and SNI still carry the original name.
/// Redirects are not followed.
pub async fn probe(
    target: &str,
    timeout: Duration,
    resolver: &dyn Resolver,
) -> Result<Duration, ProbeError> {
    let url = normalize_target(target)?;

    let mut builder = Client::builder().redirect(Policy::none()).timeout(timeout);
    let host = url
        .host_str()
        .ok_or_else(|| ProbeError::InvalidTarget(target.to_string()))?;
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if literal.parse::<IpAddr>().is_err() {
        let ip = resolver.resolve(host).await.map_err(ProbeError::Resolve)?;
        // Port 0 keeps the port from the URL
        builder = builder.resolve(host, SocketAddr::new(ip, 0));
    }
    let client = builder
        .build()
        .map_err(|e| ProbeError::Http(e.to_string()))?;

    let start = Instant::now();
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(timeout)
            } else {
                ProbeError::Http(e.to_string())
            }
        })?;
    let rtt = start.elapsed();

    let status = response.status().as_u16();
    if (200..400).contains(&status) {
        Ok(rtt)
    } else {
        Err(ProbeError::Status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_scheme() {
        assert_eq!(
            normalize_target("example.com/health").unwrap().as_str(),
            "http://example.com/health"
        );
        assert_eq!(
            normalize_target("https://example.com").unwrap().as_str(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_normalize_rejects_unparseable() {
        assert!(normalize_target("http://").is_err());
    }
}
