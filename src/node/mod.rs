//! Cosmos SDK node REST access.
//!
//! Two governance schemas are in the wild:
//! - `Legacy` (SDK < 0.47): `/cosmos/gov/v1beta1/proposals`, `proposal_id`, `content`
//! - `Current` (SDK >= 0.47): `/cosmos/gov/v1/proposals`, `id`, `messages[]`
//!
//! The schema is re-detected from `node_info` every cycle since a node can be
//! upgraded between polls.

pub mod client;
pub mod version;

pub use client::{fetch_proposals, GovernanceApi, NodeError, RestNodeClient};
pub use version::{SchemaVersion, SdkVersion};
