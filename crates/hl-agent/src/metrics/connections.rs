//! Socket counts

use hl_protocol::report::Connections;

/// Count open TCP and UDP sockets (IPv4 and IPv6)
#[cfg(target_os = "linux")]
pub fn count() -> Result<Connections, String> {
    let tcp = count_table("/proc/net/tcp")? + count_table("/proc/net/tcp6")?;
    let udp = count_table("/proc/net/udp")? + count_table("/proc/net/udp6")?;
    Ok(Connections { tcp, udp })
}

#[cfg(not(target_os = "linux"))]
pub fn count() -> Result<Connections, String> {
    Err(format!(
        "connection counts are not supported on {}",
        std::env::consts::OS
    ))
}

#[cfg(target_os = "linux")]
fn count_table(path: &str) -> Result<u64, String> {
    match std::fs::read_to_string(path) {
        Ok(table) => Ok(count_rows(&table)),
        // No IPv6 stack
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(format!("failed to read {}: {}", path, e)),
    }
}

/// Rows of a /proc/net socket table, excluding the header
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn count_rows(table: &str) -> u64 {
    table
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .count() as u64
}
