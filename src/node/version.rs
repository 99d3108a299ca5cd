use std::fmt;
use std::str::FromStr;

/// First SDK minor release serving the `gov/v1` API.
const CURRENT_SCHEMA_MIN_MINOR: u32 = 47;

/// `proposal_status` value for "voting period".
pub const VOTING_PERIOD_STATUS: &str = "2";

/// Which governance REST shape a node produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    Legacy,
    Current,
}

impl SchemaVersion {
    pub fn proposals_path(&self) -> &'static str {
        match self {
            SchemaVersion::Legacy => "/cosmos/gov/v1beta1/proposals",
            SchemaVersion::Current => "/cosmos/gov/v1/proposals",
        }
    }

    /// Field holding the proposal number.
    pub fn id_field(&self) -> &'static str {
        match self {
            SchemaVersion::Legacy => "proposal_id",
            SchemaVersion::Current => "id",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVersion::Legacy => write!(f, "legacy (gov/v1beta1)"),
            SchemaVersion::Current => write!(f, "current (gov/v1)"),
        }
    }
}

/// Parsed `cosmos_sdk_version`, e.g. `v0.47.2` or `v0.47.5-ics-lsm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkVersion {
    pub major: u32,
    pub minor: u32,
}

impl SdkVersion {
    pub fn schema(&self) -> SchemaVersion {
        if self.major > 0 || self.minor >= CURRENT_SCHEMA_MIN_MINOR {
            SchemaVersion::Current
        } else {
            SchemaVersion::Legacy
        }
    }
}

impl FromStr for SdkVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let stripped = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let mut parts = stripped.split('.');

        let major = parts
            .next()
            .and_then(leading_number)
            .ok_or_else(|| format!("no major version in {:?}", s))?;
        let minor = parts
            .next()
            .and_then(leading_number)
            .ok_or_else(|| format!("no minor version in {:?}", s))?;

        Ok(SdkVersion { major, minor })
    }
}

/// Digits at the start of a version segment ("47-ics" -> 47).
fn leading_number(segment: &str) -> Option<u32> {
    let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
