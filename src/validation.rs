//! Centralized validation functions for intelsync.
//!
//! This module provides unified validation for:
//! - Blacklist entries (IPv4 addresses and CIDR ranges)
//! - Sync intervals
//! - The remote API base address

use anyhow::{bail, Result};
use ipnet::Ipv4Net;
use reqwest::Url;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Validate a blacklist value and return the parsed IPv4 network.
///
/// Plain addresses are accepted as /32 networks. IPv6 is rejected because the
/// compiled nftables set is of type `ipv4_addr`.
///
/// # Examples
/// ```
/// use intelsync::validation::validate_blacklist_ip;
/// assert!(validate_blacklist_ip("1.2.3.4").is_ok());
/// assert!(validate_blacklist_ip("10.0.0.0/8").is_ok());
/// assert!(validate_blacklist_ip("::1").is_err());
/// assert!(validate_blacklist_ip("invalid").is_err());
/// ```
pub fn validate_blacklist_ip(value: &str) -> Result<Ipv4Net> {
    if value.contains('/') {
        value
            .parse::<Ipv4Net>()
            .map_err(|_| anyhow::anyhow!("Invalid IPv4 CIDR: {}", value))
    } else {
        let ip: Ipv4Addr = value
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid IPv4 address: {}", value))?;
        Ok(Ipv4Net::from(ip))
    }
}

/// Parse a sync interval like `30s`, `15m`, `1h` or `1d`.
///
/// Requires ASCII-only input and a non-zero count.
///
/// # Examples
/// ```
/// use intelsync::validation::parse_interval;
/// use std::time::Duration;
/// assert_eq!(parse_interval("1h").unwrap(), Duration::from_secs(3600));
/// assert!(parse_interval("0m").is_err());
/// assert!(parse_interval("4x").is_err());
/// ```
pub fn parse_interval(interval: &str) -> Result<Duration> {
    if interval.is_empty() {
        bail!("Sync interval cannot be empty");
    }

    // Reject non-ASCII so byte slicing below stays on a char boundary
    if !interval.is_ascii() {
        bail!(
            "Invalid sync interval '{}'. Only ASCII characters allowed",
            interval
        );
    }

    if interval.len() < 2 {
        bail!(
            "Invalid sync interval '{}'. Use format like '30s', '15m', '1h', '1d'",
            interval
        );
    }

    let (num_part, suffix) = interval.split_at(interval.len() - 1);

    let unit_secs: u64 = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        _ => bail!(
            "Invalid sync interval '{}'. Suffix must be s, m, h, or d",
            interval
        ),
    };

    let count: u32 = num_part.parse().map_err(|_| {
        anyhow::anyhow!(
            "Invalid sync interval '{}'. Number part must be a positive integer",
            interval
        )
    })?;

    if count == 0 {
        bail!("Sync interval '{}' must be greater than zero", interval);
    }

    Ok(Duration::from_secs(u64::from(count) * unit_secs))
}

/// Validate the remote API base address (http or https, with a host).
pub fn validate_base_url(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url)
        .map_err(|e| anyhow::anyhow!("Invalid API base URL '{}': {}", base_url, e))?;

    if !matches!(url.scheme(), "http" | "https") {
        bail!(
            "API base URL must use http or https, got '{}'",
            url.scheme()
        );
    }

    if url.host_str().is_none() {
        bail!("API base URL '{}' has no host", base_url);
    }

    if url.query().is_some() {
        bail!("API base URL '{}' must not carry a query string", base_url);
    }

    Ok(url)
}
