//! # Integration Flows
//!
//! Several clients against one registry and one bus. Every client runs its
//! own sync loop; the registry publishes the logs of each mined transaction.

pub mod scan_flows;
pub mod session_flows;
pub mod transfer_flow;
