//! Deduplication and reshaping of tool output into [`Findings`].

use serde_json::{Map, Value};
use std::collections::HashSet;
use subscout_model::Findings;

/// List-valued keys deduplicated when no explicit set is given.
pub const DEFAULT_KEYS: [&str; 4] = ["emails", "hosts", "subdomains", "ips"];

/// Removes repeated values from each list under `keys`, keeping the first
/// occurrence of every value in its original position.
///
/// Absent keys stay absent and non-list values are left untouched. Applying
/// this twice is the same as applying it once.
pub fn deduplicate(result: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        if let Some(Value::Array(items)) = result.get_mut(*key) {
            let mut seen = HashSet::with_capacity(items.len());
            items.retain(|item| seen.insert(item.to_string()));
        }
    }
}

/// [`deduplicate`] over a whole JSON value; anything but an object passes
/// through unchanged.
pub fn deduplicate_value(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        deduplicate(map, &DEFAULT_KEYS);
    }
    value
}

/// Order-preserving dedup for one list.
pub fn dedupe_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Trims every entry, drops blanks and repeats.
pub fn clean_entries<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    dedupe_preserving_order(
        entries
            .into_iter()
            .map(|entry| entry.as_ref().trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect(),
    )
}

/// Typed counterpart of [`deduplicate`].
pub fn normalize_findings(findings: Findings) -> Findings {
    Findings {
        subdomains: clean_entries(findings.subdomains),
        emails: clean_entries(findings.emails),
        hosts: clean_entries(findings.hosts),
        ips: clean_entries(findings.ips),
    }
}
