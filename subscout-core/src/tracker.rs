//! In-flight findings for running tools.
//!
//! Entries live only in memory. A crash mid-scan loses them, which is
//! acceptable because they only exist to salvage data when a tool is
//! stopped early.

use dashmap::DashMap;
use std::{collections::HashSet, fmt};
use subscout_model::{Findings, ScanId, ToolName};
use uuid::Uuid;

/// Identifies one tool run. Keying by scan rather than by domain keeps two
/// concurrent scans of the same domain from seeing each other's data.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TrackerKey {
    pub run: Uuid,
    pub tool: ToolName,
}

impl TrackerKey {
    pub fn for_scan(scan_id: ScanId, tool: ToolName) -> Self {
        Self {
            run: scan_id.as_uuid(),
            tool,
        }
    }

    /// A run with no scan record behind it.
    pub fn adhoc(tool: ToolName) -> Self {
        Self {
            run: Uuid::new_v4(),
            tool,
        }
    }
}

impl fmt::Display for TrackerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.run, self.tool.as_str())
    }
}

#[derive(Default)]
struct Entry {
    findings: Findings,
    seen: HashSet<(&'static str, String)>,
}

/// Per-run accumulator of entities discovered so far.
#[derive(Default)]
pub struct PartialResultTracker {
    entries: DashMap<TrackerKey, Entry>,
}

impl fmt::Debug for PartialResultTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialResultTracker")
            .field("active_entries", &self.entries.len())
            .finish()
    }
}

impl PartialResultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) an empty entry.
    pub fn init(&self, key: TrackerKey) {
        self.entries.insert(key, Entry::default());
    }

    /// Appends values not already recorded under `field`. Unknown fields are
    /// ignored. Returns how many values were new.
    pub fn update<I, S>(&self, key: TrackerKey, field: &str, values: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(field) = Findings::FIELDS.iter().copied().find(|f| *f == field)
        else {
            return 0;
        };
        let mut entry = self.entries.entry(key).or_default();
        let Entry { findings, seen } = &mut *entry;
        let Some(list) = findings.field_mut(field) else {
            return 0;
        };
        let mut added = 0;
        for value in values {
            let value = value.into();
            if seen.insert((field, value.clone())) {
                list.push(value);
                added += 1;
            }
        }
        added
    }

    /// Snapshot of the entry; empty when nothing was recorded.
    pub fn get(&self, key: &TrackerKey) -> Findings {
        self.entries
            .get(key)
            .map(|entry| entry.findings.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self, key: &TrackerKey) -> Option<Findings> {
        self.entries.remove(key).map(|(_, entry)| entry.findings)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
