//! Best-effort parsing of tool output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use subscout_model::{Findings, ToolName};

use crate::{domain::is_within, normalize::clean_entries};

const FQDN_TAG: &str = "(FQDN)";
const RELATION_ARROW: &str = "-->";

static NODE_TYPE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\([A-Za-z][A-Za-z0-9_]*\)").expect("node type regex should compile")
});

fn is_relationship_line(line: &str) -> bool {
    line.contains(RELATION_ARROW) || NODE_TYPE_TAG.is_match(line)
}

/// Entities carried by one line of streamed output.
///
/// subfinder prints one name per line. amass either does the same or prints
/// relationship lines such as `a.example.com (FQDN) --> a_record --> 192.0.2.1 (IPAddress)`,
/// from which only in-scope `(FQDN)` nodes are kept. A relationship line
/// without such a node (netblocks, ASNs, addresses) yields nothing.
pub fn parse_stream_line(tool: ToolName, domain: &str, line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    if tool == ToolName::Amass && is_relationship_line(line) {
        return line
            .split(RELATION_ARROW)
            .filter_map(|part| part.trim().strip_suffix(FQDN_TAG))
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| is_within(name, domain))
            .collect();
    }
    match line.split_whitespace().next() {
        Some(name) => vec![name.to_string()],
        None => Vec::new(),
    }
}

fn string_list(document: &Value, key: &str) -> Vec<String> {
    document
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Reads theHarvester's JSON report.
///
/// Host entries look like `www.example.com` or `www.example.com:192.0.2.1`;
/// names strictly below `domain` are also reported as subdomains.
pub fn parse_harvester_report(domain: &str, raw: &[u8]) -> Result<Findings, String> {
    let document: Value = serde_json::from_slice(raw)
        .map_err(|e| format!("theHarvester output is not valid JSON: {e}"))?;
    if !document.is_object() {
        return Err("theHarvester output is not a JSON object".to_string());
    }

    let hosts = clean_entries(string_list(&document, "hosts"));
    let subdomains = clean_entries(
        hosts
            .iter()
            .map(|host| host.split(':').next().unwrap_or_default().to_ascii_lowercase())
            .filter(|name| name.len() > domain.len() && is_within(name, domain)),
    );

    Ok(Findings {
        subdomains,
        emails: clean_entries(string_list(&document, "emails")),
        hosts,
        ips: clean_entries(string_list(&document, "ips")),
    })
}
