//! Entity categories, the update cursor and the remote update payload.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::SyncError;

/// Wire format of the `delta` query parameter: fixed six fractional digits, no zone.
pub const DELTA_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// The three entity collections kept in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    MalwareSignatures,
    YaraRules,
    BlacklistedIps,
}

impl Category {
    /// Processing order used by the reconciliation engine.
    pub const ALL: [Category; 3] = [
        Category::MalwareSignatures,
        Category::YaraRules,
        Category::BlacklistedIps,
    ];

    /// Array field in the update payload.
    pub fn payload_field(self) -> &'static str {
        match self {
            Category::MalwareSignatures => "malwareSignatures",
            Category::YaraRules => "yaraRules",
            Category::BlacklistedIps => "blacklistedIpAddresses",
        }
    }

    /// Identifying field inside each payload entry.
    pub fn value_field(self) -> &'static str {
        match self {
            Category::MalwareSignatures => "signature",
            Category::YaraRules => "rule",
            Category::BlacklistedIps => "ipAddress",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Category::MalwareSignatures => "malware_signatures",
            Category::YaraRules => "yara_rules",
            Category::BlacklistedIps => "blacklisted_ip_addresses",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Category::MalwareSignatures => "signature",
            Category::YaraRules => "rule",
            Category::BlacklistedIps => "ip_address",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Watermark of the most recent applied update, held at microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cursor(DateTime<Utc>);

impl Cursor {
    /// Wrap a timestamp, dropping anything finer than a microsecond.
    pub fn new(ts: DateTime<Utc>) -> Self {
        Self(ts.trunc_subsecs(6))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// Render the cursor the way the update endpoint expects it.
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use intelsync::model::Cursor;
    /// let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
    /// assert_eq!(Cursor::new(ts).to_delta_param(), "2024-03-01T12:30:05.000000");
    /// ```
    pub fn to_delta_param(&self) -> String {
        self.0.format(DELTA_FORMAT).to_string()
    }

    /// Inverse of [`Cursor::to_delta_param`].
    pub fn parse_delta_param(s: &str) -> Result<Self, SyncError> {
        NaiveDateTime::parse_from_str(s, DELTA_FORMAT)
            .map(|naive| Self::new(naive.and_utc()))
            .map_err(|e| SyncError::Parse(format!("Invalid cursor '{}': {}", s, e)))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_delta_param())
    }
}

impl From<DateTime<Utc>> for Cursor {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::new(ts)
    }
}

/// Body of `GET /api/database/updates`.
///
/// Entries are kept as raw JSON so that a malformed entry only drops itself,
/// not the whole payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    #[serde(rename = "malwareSignatures", default)]
    pub malware_signatures: Option<Vec<Value>>,

    #[serde(rename = "yaraRules", default)]
    pub yara_rules: Option<Vec<Value>>,

    #[serde(rename = "blacklistedIpAddresses", default)]
    pub blacklisted_ips: Option<Vec<Value>>,
}

impl UpdatePayload {
    pub fn from_json(body: &str) -> Result<Self, SyncError> {
        serde_json::from_str(body)
            .map_err(|e| SyncError::Parse(format!("Invalid update payload: {}", e)))
    }

    /// Raw entries of a category (empty when the field was absent or null).
    pub fn entries(&self, category: Category) -> &[Value] {
        let field = match category {
            Category::MalwareSignatures => &self.malware_signatures,
            Category::YaraRules => &self.yara_rules,
            Category::BlacklistedIps => &self.blacklisted_ips,
        };
        field.as_deref().unwrap_or(&[])
    }

    /// True when no category carries a single raw entry.
    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|c| self.entries(*c).is_empty())
    }
}

/// One add or remove instruction extracted from a payload entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaEntry {
    pub value: String,
    pub removed: bool,
}

impl DeltaEntry {
    /// Extract the entry for `category`, or `None` when its value field is missing.
    ///
    /// Signatures and rules are kept byte for byte; only blacklist addresses
    /// are trimmed.
    pub fn from_value(category: Category, item: &Value) -> Option<Self> {
        let raw = item.get(category.value_field()).and_then(Value::as_str)?;
        let value = match category {
            Category::BlacklistedIps => raw.trim(),
            Category::MalwareSignatures | Category::YaraRules => raw,
        };
        if value.is_empty() {
            return None;
        }

        let removed = item
            .get("wasRemoved")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Some(Self {
            value: value.to_string(),
            removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_cursor_truncates_to_micros() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let cursor = Cursor::new(ts);
        assert_eq!(cursor.timestamp().timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn test_cursor_delta_param_format() {
        let ts = Utc.timestamp_opt(1_700_000_000, 42_000).unwrap();
        assert_eq!(
            Cursor::new(ts).to_delta_param(),
            "2023-11-14T22:13:20.000042"
        );
    }

    #[test]
    fn test_cursor_parse_delta_param() {
        let cursor = Cursor::parse_delta_param("2023-11-14T22:13:20.000042").unwrap();
        assert_eq!(cursor.to_delta_param(), "2023-11-14T22:13:20.000042");
        assert!(Cursor::parse_delta_param("2023-11-14 22:13:20").is_err());
    }

    #[test]
    fn test_cursor_ordering() {
        let a = Cursor::new(Utc.timestamp_opt(100, 0).unwrap());
        let b = Cursor::new(Utc.timestamp_opt(100, 1_000).unwrap());
        assert!(a < b);
    }

    #[test]
    fn test_payload_all_fields() {
        let payload = UpdatePayload::from_json(
            r#"{
                "malwareSignatures": [{"signature": "abc"}],
                "yaraRules": [{"rule": "rule x {}", "wasRemoved": true}],
                "blacklistedIpAddresses": [{"ipAddress": "1.2.3.4"}]
            }"#,
        )
        .unwrap();
        assert_eq!(payload.entries(Category::MalwareSignatures).len(), 1);
        assert_eq!(payload.entries(Category::YaraRules).len(), 1);
        assert_eq!(payload.entries(Category::BlacklistedIps).len(), 1);
        assert!(!payload.is_empty());
    }

    #[test]
    fn test_payload_missing_and_null_fields() {
        let payload = UpdatePayload::from_json(r#"{"yaraRules": null}"#).unwrap();
        assert!(payload.is_empty());
        assert!(payload.entries(Category::YaraRules).is_empty());

        let payload = UpdatePayload::from_json("{}").unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_payload_empty_arrays_are_empty() {
        let payload = UpdatePayload::from_json(
            r#"{"malwareSignatures": [], "yaraRules": [], "blacklistedIpAddresses": []}"#,
        )
        .unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_payload_rejects_non_object_body() {
        assert!(UpdatePayload::from_json("[1, 2]").is_err());
        assert!(UpdatePayload::from_json("not json").is_err());
    }

    #[test]
    fn test_delta_entry_flag() {
        let add = DeltaEntry::from_value(Category::BlacklistedIps, &json!({"ipAddress": "1.2.3.4"}));
        assert_eq!(
            add,
            Some(DeltaEntry {
                value: "1.2.3.4".into(),
                removed: false
            })
        );

        let explicit_false = DeltaEntry::from_value(
            Category::BlacklistedIps,
            &json!({"ipAddress": "1.2.3.4", "wasRemoved": false}),
        )
        .unwrap();
        assert!(!explicit_false.removed);

        let remove = DeltaEntry::from_value(
            Category::YaraRules,
            &json!({"rule": "r", "wasRemoved": true}),
        )
        .unwrap();
        assert!(remove.removed);
    }

    #[test]
    fn test_delta_entry_without_value_field() {
        assert!(DeltaEntry::from_value(Category::MalwareSignatures, &json!({"rule": "x"})).is_none());
        assert!(DeltaEntry::from_value(Category::MalwareSignatures, &json!({"signature": 5})).is_none());
        assert!(DeltaEntry::from_value(Category::MalwareSignatures, &json!("abc")).is_none());
        assert!(DeltaEntry::from_value(Category::MalwareSignatures, &json!({"signature": ""})).is_none());
        assert!(DeltaEntry::from_value(Category::BlacklistedIps, &json!({"ipAddress": "  "})).is_none());
    }

    #[test]
    fn test_entry_value_kept_verbatim_except_blacklist() {
        let sig = DeltaEntry::from_value(Category::MalwareSignatures, &json!({"signature": " abc"}))
            .unwrap();
        assert_eq!(sig.value, " abc");
        let rule = DeltaEntry::from_value(Category::YaraRules, &json!({"rule": "rule r {}\n"})).unwrap();
        assert_eq!(rule.value, "rule r {}\n");
        let ip = DeltaEntry::from_value(Category::BlacklistedIps, &json!({"ipAddress": " 1.2.3.4 "}))
            .unwrap();
        assert_eq!(ip.value, "1.2.3.4");
    }

    #[test]
    fn test_category_names() {
        assert_eq!(Category::BlacklistedIps.table(), "blacklisted_ip_addresses");
        assert_eq!(Category::BlacklistedIps.column(), "ip_address");
        assert_eq!(Category::YaraRules.value_field(), "rule");
        assert_eq!(Category::MalwareSignatures.to_string(), "malware_signatures");
    }
}
