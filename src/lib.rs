//! Governance proposal watcher for Cosmos SDK nodes.
//!
//! Polls each configured node for proposals in voting period, keeps the
//! ones submitted since the last cycle and posts one webhook notification
//! per new proposal.

pub mod config;
pub mod node;
pub mod notify;
pub mod poller;
pub mod proposal;
pub mod watermark;
