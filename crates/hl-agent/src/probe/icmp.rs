//! ICMP echo probe

use std::net::IpAddr;
use std::time::Duration;

use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};

use super::resolver::{resolve_host, Resolver};
use super::ProbeError;

const PAYLOAD: [u8; 56] = [0; 56];

/// Send one echo request and return its round-trip time
pub async fn probe(
    target: &str,
    timeout: Duration,
    resolver: &dyn Resolver,
) -> Result<Duration, ProbeError> {
    let ip = resolve_host(resolver, target.trim())
        .await
        .map_err(ProbeError::Resolve)?;

    let config = match ip {
        IpAddr::V4(_) => Config::default(),
        IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
    };
    let client = Client::new(&config)?;

    let mut pinger = client.pinger(ip, identifier()).await;
    pinger.timeout(timeout);

    let (_reply, rtt) = pinger
        .ping(PingSequence(0), &PAYLOAD)
        .await
        .map_err(|e| match e {
            surge_ping::SurgeError::Timeout { .. } => ProbeError::Timeout(timeout),
            other => ProbeError::Icmp(other.to_string()),
        })?;

    Ok(rtt)
}

fn identifier() -> PingIdentifier {
    PingIdentifier((std::process::id() & 0xffff) as u16)
}
