use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::node::SchemaVersion;
use crate::proposal::search::find_value;

/// Display pattern for timestamps in notifications and the watermark file.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Type tag used when a proposal carries no `@type` at all.
pub const GENERIC_TYPE: &str = "Generic";

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("proposal is not a JSON object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid timestamp in `{field}`: {value:?}")]
    BadTimestamp { field: &'static str, value: String },
}

/// How title/description are extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalKind {
    /// Upgrade plan: name is the title, height the description.
    SoftwareUpgrade,
    /// Everything else, with its type tag.
    Generic(String),
}

impl ProposalKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            // gov/v1 message and v1beta1 content type respectively
            "MsgSoftwareUpgrade" | "SoftwareUpgradeProposal" => ProposalKind::SoftwareUpgrade,
            other => ProposalKind::Generic(other.to_string()),
        }
    }
}

/// Uniform record for one new proposal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedProposal {
    pub node_label: String,
    pub id: String,
    pub proposal_type: String,
    pub title: String,
    pub description: String,
    pub voting_end_time: DateTime<Utc>,
}

impl NormalizedProposal {
    /// `YYYY-MM-DD HH:MM:SS`
    pub fn voting_ends(&self) -> String {
        self.voting_end_time.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl fmt::Display for NormalizedProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} [{}] {}",
            self.node_label, self.id, self.proposal_type, self.title
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// Append `plan.info` to software-upgrade descriptions.
    pub include_upgrade_info: bool,
}

impl Normalizer {
    pub fn new(include_upgrade_info: bool) -> Self {
        Self {
            include_upgrade_info,
        }
    }

    pub fn normalize(
        &self,
        node_label: &str,
        raw: &Value,
        version: SchemaVersion,
    ) -> Result<NormalizedProposal, NormalizeError> {
        if !raw.is_object() {
            return Err(NormalizeError::NotAnObject);
        }

        let id = text(raw.get(version.id_field()));
        if id.is_empty() {
            return Err(NormalizeError::MissingField(version.id_field()));
        }

        let payload = payload(raw, version);
        let proposal_type = type_tag(raw, payload);
        let kind = ProposalKind::from_tag(&proposal_type);

        let (title, description) = match kind {
            ProposalKind::SoftwareUpgrade => self.upgrade_fields(raw, payload),
            ProposalKind::Generic(_) => generic_fields(raw, payload),
        };

        let end_raw = raw
            .get("voting_end_time")
            .and_then(Value::as_str)
            .ok_or(NormalizeError::MissingField("voting_end_time"))?;
        let voting_end_time = parse_timestamp(end_raw)
            .map(strip_subsec)
            .ok_or_else(|| NormalizeError::BadTimestamp {
                field: "voting_end_time",
                value: end_raw.to_string(),
            })?;

        Ok(NormalizedProposal {
            node_label: node_label.to_string(),
            id,
            proposal_type,
            title,
            description,
            voting_end_time,
        })
    }

    fn upgrade_fields(&self, raw: &Value, payload: Option<&Value>) -> (String, String) {
        let plan = payload.and_then(|p| p.get("plan"));
        let title = text(lookup(raw, plan, "name"));
        let height = text(lookup(raw, plan, "height"));

        if !self.include_upgrade_info {
            return (title, height);
        }
        let info = text(lookup(raw, plan, "info"));
        if info.is_empty() {
            (title, height)
        } else {
            (title, format!("{}\nInfo: {}", height, info))
        }
    }
}

fn generic_fields(raw: &Value, payload: Option<&Value>) -> (String, String) {
    let title = text(lookup(raw, payload, "title"));

    let direct = payload
        .and_then(|p| non_null(p.get("summary")))
        .or_else(|| payload.and_then(|p| non_null(p.get("description"))));
    let description = match direct {
        Some(v) => text(Some(v)),
        None => text(find_value(raw, "summary").or_else(|| find_value(raw, "description"))),
    };

    (title, description)
}

/// Where the proposal content lives for this schema, with one extra
/// `content` wrapper peeled off when a node double-nests it.
fn payload(raw: &Value, version: SchemaVersion) -> Option<&Value> {
    let outer = match version {
        SchemaVersion::Current => raw.get("messages").and_then(|m| m.get(0)),
        SchemaVersion::Legacy => raw.get("content"),
    }
    .filter(|v| v.is_object())?;

    match outer.get("content") {
        Some(inner) if inner.is_object() => Some(inner),
        _ => Some(outer),
    }
}

/// Last dot segment of `@type` (`/cosmos.upgrade.v1beta1.MsgSoftwareUpgrade`
/// -> `MsgSoftwareUpgrade`), or `Generic` when nothing is tagged.
fn type_tag(raw: &Value, payload: Option<&Value>) -> String {
    lookup(raw, payload, "@type")
        .and_then(Value::as_str)
        .and_then(|t| t.rsplit('.').next())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(GENERIC_TYPE)
        .to_string()
}

/// `key` at the expected place, else anywhere in the raw proposal.
fn lookup<'a>(raw: &'a Value, at: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    at.and_then(|v| non_null(v.get(key)))
        .or_else(|| find_value(raw, key))
}

fn non_null(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| !v.is_null())
}

/// Render a JSON value as plain text; null or missing becomes "".
fn text(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn strip_subsec(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

/// Parse node timestamps: RFC 3339 (`2024-03-01T12:00:00.123456789Z`), or a
/// bare ISO-8601 / `YYYY-MM-DD HH:MM:SS` string taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", TIMESTAMP_FORMAT]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// The proposal's `submit_time`.
pub fn submit_time(raw: &Value) -> Result<DateTime<Utc>, NormalizeError> {
    let s = raw
        .get("submit_time")
        .and_then(Value::as_str)
        .ok_or(NormalizeError::MissingField("submit_time"))?;
    parse_timestamp(s).ok_or_else(|| NormalizeError::BadTimestamp {
        field: "submit_time",
        value: s.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn current_upgrade() -> Value {
        json!({
            "id": "42",
            "messages": [{
                "@type": "/cosmos.upgrade.v1beta1.MsgSoftwareUpgrade",
                "authority": "cosmos10d07y265gmmuvt4z0w9aw880jnsr700j6zn9kn",
                "plan": {"name": "v2", "height": "1000", "info": "https://example.invalid/v2.json"}
            }],
            "status": "PROPOSAL_STATUS_VOTING_PERIOD",
            "submit_time": "2024-03-01T10:00:00.123456Z",
            "voting_end_time": "2024-03-04T10:00:00.987654321Z",
            "title": "Upgrade to v2",
            "summary": "Chain upgrade"
        })
    }

    #[test]
    fn test_current_software_upgrade() {
        let p = Normalizer::default()
            .normalize("A", &current_upgrade(), SchemaVersion::Current)
            .unwrap();
        assert_eq!(p.id, "42");
        assert_eq!(p.proposal_type, "MsgSoftwareUpgrade");
        assert_eq!(p.title, "v2");
        assert!(p.description.contains("1000"));
        assert!(!p.description.contains("Info"));
        assert_eq!(p.voting_ends(), "2024-03-04 10:00:00");
    }

    #[test]
    fn test_upgrade_info_included_when_enabled() {
        let p = Normalizer::new(true)
            .normalize("A", &current_upgrade(), SchemaVersion::Current)
            .unwrap();
        assert_eq!(p.description, "1000\nInfo: https://example.invalid/v2.json");
    }

    #[test]
    fn test_legacy_text_proposal() {
        let raw = json!({
            "proposal_id": "117",
            "content": {
                "@type": "/cosmos.gov.v1beta1.TextProposal",
                "title": "Community pool spend",
                "description": "Fund the explorer team"
            },
            "submit_time": "2023-01-01T00:00:00Z",
            "voting_end_time": "2023-01-15T00:00:00Z"
        });
        let p = Normalizer::default()
            .normalize("B", &raw, SchemaVersion::Legacy)
            .unwrap();
        assert_eq!(p.id, "117");
        assert_eq!(p.proposal_type, "TextProposal");
        assert_eq!(p.title, "Community pool spend");
        assert_eq!(p.description, "Fund the explorer team");
        assert_eq!(p.node_label, "B");
    }

    #[test]
    fn test_legacy_software_upgrade_proposal() {
        let raw = json!({
            "proposal_id": 9,
            "content": {
                "@type": "/cosmos.upgrade.v1beta1.SoftwareUpgradeProposal",
                "title": "Upgrade",
                "description": "long text",
                "plan": {"name": "v10", "height": 5500000}
            },
            "submit_time": "2023-01-01T00:00:00Z",
            "voting_end_time": "2023-01-15T00:00:00Z"
        });
        let p = Normalizer::default()
            .normalize("B", &raw, SchemaVersion::Legacy)
            .unwrap();
        assert_eq!(p.id, "9");
        assert_eq!(p.title, "v10");
        assert_eq!(p.description, "5500000");
    }

    #[test]
    fn test_double_nested_content_unwrapped() {
        let raw = json!({
            "id": "3",
            "messages": [{
                "@type": "/cosmos.gov.v1.MsgExecLegacyContent",
                "content": {
                    "@type": "/cosmos.params.v1beta1.ParameterChangeProposal",
                    "title": "Raise max validators",
                    "description": "150 -> 180"
                },
                "authority": "cosmos1..."
            }],
            "submit_time": "2024-01-01T00:00:00Z",
            "voting_end_time": "2024-01-08T00:00:00Z"
        });
        let p = Normalizer::default()
            .normalize("A", &raw, SchemaVersion::Current)
            .unwrap();
        assert_eq!(p.proposal_type, "ParameterChangeProposal");
        assert_eq!(p.title, "Raise max validators");
        assert_eq!(p.description, "150 -> 180");
    }

    #[test]
    fn test_summary_preferred_over_description() {
        let raw = json!({
            "id": "4",
            "messages": [{
                "@type": "/cosmos.gov.v1.MsgCommunityPoolSpend",
                "title": "Spend",
                "summary": "short",
                "description": "long"
            }],
            "submit_time": "2024-01-01T00:00:00Z",
            "voting_end_time": "2024-01-08T00:00:00Z"
        });
        let p = Normalizer::default()
            .normalize("A", &raw, SchemaVersion::Current)
            .unwrap();
        assert_eq!(p.proposal_type, "MsgCommunityPoolSpend");
        assert_eq!(p.description, "short");
    }

    #[test]
    fn test_text_proposal_without_messages_is_generic() {
        let raw = json!({
            "id": "5",
            "messages": [],
            "title": "Raise gas limit",
            "summary": "Increase block gas to 80M",
            "submit_time": "2024-01-01T00:00:00Z",
            "voting_end_time": "2024-01-08T00:00:00.5Z"
        });
        let p = Normalizer::default()
            .normalize("A", &raw, SchemaVersion::Current)
            .unwrap();
        assert_eq!(p.proposal_type, GENERIC_TYPE);
        assert_eq!(p.title, "Raise gas limit");
        assert_eq!(p.description, "Increase block gas to 80M");
        assert_eq!(p.voting_ends(), "2024-01-08 00:00:00");
    }

    #[test]
    fn test_fallback_search_deep_in_list() {
        let raw = json!({
            "id": "6",
            "messages": [{"@type": "/custom.v1.MsgWeird", "body": {"wrapped": {}}}],
            "metadata_blobs": [
                {"kind": "x"},
                {"doc": {"meta": {"title": "Found me", "description": "Deep text"}}}
            ],
            "submit_time": "2024-01-01T00:00:00Z",
            "voting_end_time": "2024-01-08T00:00:00Z"
        });
        let p = Normalizer::default()
            .normalize("A", &raw, SchemaVersion::Current)
            .unwrap();
        assert_eq!(p.proposal_type, "MsgWeird");
        assert_eq!(p.title, "Found me");
        assert_eq!(p.description, "Deep text");
    }

    #[test]
    fn test_missing_title_and_description_are_empty() {
        let raw = json!({
            "id": "7",
            "messages": [{"@type": "/x.v1.MsgNothing", "title": null}],
            "submit_time": "2024-01-01T00:00:00Z",
            "voting_end_time": "2024-01-08T00:00:00Z"
        });
        let p = Normalizer::default()
            .normalize("A", &raw, SchemaVersion::Current)
            .unwrap();
        assert_eq!(p.title, "");
        assert_eq!(p.description, "");
    }

    #[test]
    fn test_wrong_schema_id_is_an_error() {
        let raw = json!({
            "proposal_id": "1",
            "submit_time": "2024-01-01T00:00:00Z",
            "voting_end_time": "2024-01-08T00:00:00Z"
        });
        let err = Normalizer::default()
            .normalize("A", &raw, SchemaVersion::Current)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::MissingField("id")));
    }

    #[test]
    fn test_bad_voting_end_time() {
        let raw = json!({"id": "1", "voting_end_time": "next tuesday"});
        let err = Normalizer::default()
            .normalize("A", &raw, SchemaVersion::Current)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::BadTimestamp { .. }));
        assert!(Normalizer::default()
            .normalize("A", &json!([1, 2]), SchemaVersion::Current)
            .is_err());
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 12:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-01T12:30:00.123456789Z").map(strip_subsec),
            Some(expected)
        );
        assert_eq!(parse_timestamp("garbage"), None);
    }

    #[test]
    fn test_submit_time() {
        let raw = json!({"submit_time": "2024-03-01T12:30:00.5Z"});
        assert!(submit_time(&raw).is_ok());
        assert!(matches!(
            submit_time(&json!({})),
            Err(NormalizeError::MissingField("submit_time"))
        ));
    }
}
