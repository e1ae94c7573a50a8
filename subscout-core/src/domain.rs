//! Target domain validation.

use crate::error::{Result, ScanError};
use once_cell::sync::Lazy;
use regex::Regex;

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z][a-z0-9-]{0,61}[a-z0-9]$")
        .expect("domain regex should compile")
});

const MAX_DOMAIN_LEN: usize = 253;

/// Canonicalises user input into a bare, lowercase domain.
///
/// Accepts a pasted URL (`https://Example.com/path`) or a fully qualified
/// name with a trailing dot. Anything that is still not a hostname after
/// that is rejected, which also keeps shell metacharacters out of tool
/// arguments.
pub fn normalize_domain(input: &str) -> Result<String> {
    let mut domain = input.trim().to_ascii_lowercase();

    if let Some((_, rest)) = domain.split_once("://") {
        domain = rest.to_string();
    }
    if let Some(end) = domain.find(['/', '?', '#']) {
        domain.truncate(end);
    }
    if let Some((host, port)) = domain.rsplit_once(':')
        && !port.is_empty()
        && port.chars().all(|c| c.is_ascii_digit())
    {
        domain = host.to_string();
    }
    let domain = domain.trim_end_matches('.').to_string();

    if domain.is_empty()
        || domain.len() > MAX_DOMAIN_LEN
        || !DOMAIN_RE.is_match(&domain)
    {
        return Err(ScanError::InvalidDomain(input.trim().to_string()));
    }
    Ok(domain)
}

/// True when `host` is `domain` itself or one of its subdomains.
pub fn is_within(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').as_bytes();
    let domain = domain.as_bytes();
    if host.len() == domain.len() {
        return host.eq_ignore_ascii_case(domain);
    }
    host.len() > domain.len()
        && host[host.len() - domain.len() - 1] == b'.'
        && host[host.len() - domain.len()..].eq_ignore_ascii_case(domain)
}
