//! TCP connect probe

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;

use super::resolver::{resolve_host, Resolver};
use super::ProbeError;

const DEFAULT_PORT: u16 = 80;

/// Split `host[:port]`, accepting `[v6]:port` and bare IPv6 literals
pub fn split_target(target: &str) -> Result<(String, u16), ProbeError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ProbeError::InvalidTarget(target.to_string()));
    }

    if let Some(rest) = target.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ProbeError::InvalidTarget(target.to_string()))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => parse_port(target, port)?,
            None if tail.is_empty() => DEFAULT_PORT,
            None => return Err(ProbeError::InvalidTarget(target.to_string())),
        };
        return Ok((host.to_string(), port));
    }

    match target.matches(':').count() {
        0 => Ok((target.to_string(), DEFAULT_PORT)),
        1 => {
            let (host, port) = target
                .split_once(':')
                .ok_or_else(|| ProbeError::InvalidTarget(target.to_string()))?;
            Ok((host.to_string(), parse_port(target, port)?))
        }
        // Unbracketed IPv6 literal
        _ => Ok((target.to_string(), DEFAULT_PORT)),
    }
}

fn parse_port(target: &str, port: &str) -> Result<u16, ProbeError> {
    port.parse()
        .map_err(|_| ProbeError::InvalidTarget(target.to_string()))
}

/// Time a TCP handshake. Name resolution happens before the clock starts.
pub async fn probe(
    target: &str,
    timeout: Duration,
    resolver: &dyn Resolver,
) -> Result<Duration, ProbeError> {
    let (host, port) = split_target(target)?;
    let ip = resolve_host(resolver, &host).await.map_err(ProbeError::Resolve)?;
    let addr = SocketAddr::new(ip, port);

    let start = Instant::now();
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))??;
    let rtt = start.elapsed();
    drop(stream);

    Ok(rtt)
}
