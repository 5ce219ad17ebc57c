// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! SSRF guard for `web_fetch`: rejects non-http(s) schemes and any host that
//! literally is, or resolves to, a loopback / private / link-local address.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use anyhow::{bail, Context};
use url::Url;

/// `true` if `addr` is not publicly routable (loopback, RFC 1918, link-local,
/// IPv6 ULA / link-local / loopback).
pub fn is_blocked_addr(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(v4: &Ipv4Addr) -> bool {
    v4.is_loopback()
        || v4.is_link_local()
        || v4.is_private()
        || v4.is_broadcast()
        || v4.is_unspecified()
}

fn is_blocked_v6(v6: &Ipv6Addr) -> bool {
    if v6.is_loopback() || v6.is_unspecified() {
        return true;
    }
    if let Some(v4) = v6.to_ipv4_mapped() {
        return is_blocked_v4(&v4);
    }
    let segments = v6.segments();
    // fc00::/7 (unique local)
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    // fe80::/10 (link-local)
    if (segments[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    false
}

/// Validate `raw_url`'s scheme (must be http/https) and reject a literal
/// blocked host before any network I/O happens.
pub fn validate_scheme_and_literal_host(raw_url: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw_url).context("invalid URL")?;
    if url.scheme() != "http" && url.scheme() != "https" {
        bail!("blocked: only http and https URLs are allowed");
    }
    let host = url.host_str().context("URL has no host")?;
    if host.eq_ignore_ascii_case("localhost") {
        bail!("blocked: target address is not publicly routable");
    }
    if let Ok(addr) = host.parse::<IpAddr>() {
        if is_blocked_addr(&addr) {
            bail!("blocked: target address is not publicly routable");
        }
    }
    Ok(url)
}

/// Resolve `host:port` and re-validate every resolved address, since the
/// literal host may be a public-looking DNS name that resolves internally.
pub async fn resolve_and_validate(host: &str, port: u16) -> anyhow::Result<Vec<IpAddr>> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("DNS resolution failed for {host}"))?
        .map(|sa| sa.ip())
        .collect::<Vec<_>>();
    if addrs.is_empty() {
        bail!("DNS resolution returned no addresses for {host}");
    }
    for addr in &addrs {
        if is_blocked_addr(addr) {
            bail!("blocked: target address is not publicly routable");
        }
    }
    Ok(addrs)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
