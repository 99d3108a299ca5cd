//! Proposal normalization.
//!
//! A raw proposal is turned into a `NormalizedProposal` by looking at the
//! expected location for the node's schema first and falling back to a
//! whole-object key search (`find_value`) when the shape deviates.

pub mod normalize;
pub mod search;

pub use normalize::{
    parse_timestamp, submit_time, NormalizeError, NormalizedProposal, Normalizer, ProposalKind,
};
pub use search::find_value;
