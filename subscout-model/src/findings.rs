use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical entity lists every tool's output is reshaped into.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Findings {
    #[serde(default)]
    pub subdomains: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub ips: Vec<String>,
}

impl Findings {
    pub const FIELDS: [&'static str; 4] = ["subdomains", "emails", "hosts", "ips"];

    pub fn is_empty(&self) -> bool {
        self.subdomains.is_empty()
            && self.emails.is_empty()
            && self.hosts.is_empty()
            && self.ips.is_empty()
    }

    pub fn total(&self) -> usize {
        self.subdomains.len() + self.emails.len() + self.hosts.len() + self.ips.len()
    }

    /// Headline count stored next to the lists: the number of subdomains,
    /// or every entity when the tool produced no subdomains at all.
    pub fn count(&self) -> usize {
        if self.subdomains.is_empty() {
            self.total()
        } else {
            self.subdomains.len()
        }
    }

    pub fn field(&self, name: &str) -> Option<&Vec<String>> {
        match name {
            "subdomains" => Some(&self.subdomains),
            "emails" => Some(&self.emails),
            "hosts" => Some(&self.hosts),
            "ips" => Some(&self.ips),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Vec<String>> {
        match name {
            "subdomains" => Some(&mut self.subdomains),
            "emails" => Some(&mut self.emails),
            "hosts" => Some(&mut self.hosts),
            "ips" => Some(&mut self.ips),
            _ => None,
        }
    }
}

/// A completed tool run as persisted in the scan's per-tool column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSuccess {
    #[serde(flatten)]
    pub findings: Findings,
    pub count: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// A failed tool run. Timeouts and cancellations keep whatever was salvaged
/// before the process was stopped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subdomains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timeout: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}


/// Per-tool result blob. A blob carrying an `error` key is a failure no
/// matter what else it holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResult {
    Failed(ToolFailure),
    Completed(ToolSuccess),
}

impl ToolResult {
    pub fn completed(
        findings: Findings,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let count = findings.count();
        ToolResult::Completed(ToolSuccess {
            findings,
            count,
            start_time,
            end_time,
        })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ToolResult::Failed(failure) => Some(&failure.error),
            ToolResult::Completed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn count_falls_back_to_all_entities() {
        let only_emails = Findings {
            emails: vec!["a@x.com".into(), "b@x.com".into()],
            ..Default::default()
        };
        assert_eq!(only_emails.count(), 2);

        let mixed = Findings {
            subdomains: vec!["a.x.com".into()],
            emails: vec!["a@x.com".into()],
            ..Default::default()
        };
        assert_eq!(mixed.count(), 1);
    }

    #[test]
    fn success_blob_has_every_list() {
        let value =
            serde_json::to_value(ToolResult::completed(Findings::default(), at(0), at(5)))
                .unwrap();
        for key in Findings::FIELDS {
            assert_eq!(value[key], json!([]), "{key}");
        }
        assert_eq!(value["count"], json!(0));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn timeout_blob_shape() {
        let blob = ToolResult::Failed(ToolFailure {
            error: "amass timed out after 120 seconds".into(),
            subdomains: vec!["a.example.com".into(), "b.example.com".into()],
            emails: vec![],
            hosts: vec![],
            ips: vec![],
            count: Some(2),
            start_time: at(0),
            end_time: at(120),
            timeout: true,
            partial: true,
        });
        let value = serde_json::to_value(&blob).unwrap();
        assert_eq!(value["timeout"], json!(true));
        assert_eq!(value["partial"], json!(true));
        assert_eq!(value["subdomains"].as_array().map(Vec::len), Some(2));
        assert!(value.get("emails").is_none());

        let back: ToolResult = serde_json::from_value(value).unwrap();
        assert_eq!(back.error(), Some("amass timed out after 120 seconds"));
    }

    #[test]
    fn plain_error_omits_flags() {
        let value = serde_json::to_value(ToolResult::Failed(ToolFailure {
            error: "boom".into(),
            subdomains: vec![],
            emails: vec![],
            hosts: vec![],
            ips: vec![],
            count: None,
            start_time: at(0),
            end_time: at(1),
            timeout: false,
            partial: false,
        }))
        .unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 3, "{keys:?}");
    }
}
