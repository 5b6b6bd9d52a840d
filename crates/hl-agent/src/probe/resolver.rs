//! Host name resolution for probes

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;

/// Resolves a host name to one address
#[async_trait]
pub trait Resolver: Send + Sync {
    /// First address for `host`
    async fn resolve(&self, host: &str) -> io::Result<IpAddr>;
}

/// Resolver using the operating system's lookup
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<IpAddr> {
        tokio::net::lookup_host((host, 0))
            .await?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", host))
            })
    }
}

/// Resolve `host` unless it already is an IP literal
pub async fn resolve_host(resolver: &dyn Resolver, host: &str) -> io::Result<IpAddr> {
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Ok(ip);
    }
    resolver.resolve(host).await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    #[async_trait]
    impl Resolver for Unreachable {
        async fn resolve(&self, host: &str) -> io::Result<IpAddr> {
            panic!("lookup of {} should have been skipped", host);
        }
    }

    #[tokio::test]
    async fn test_ip_literals_skip_lookup() {
        assert_eq!(
            resolve_host(&Unreachable, "10.1.2.3").await.unwrap(),
            "10.1.2.3".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            resolve_host(&Unreachable, "[::1]").await.unwrap(),
            "::1".parse::<IpAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_system_resolver_localhost() {
        let ip = SystemResolver.resolve("localhost").await.unwrap();
        assert!(ip.is_loopback());
    }
}
