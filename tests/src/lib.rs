//! # GovChain Client Test Suite
//!
//! Cross-crate flows: several clients share one in-memory registry and one
//! event bus, the way several wallets share one deployed contract.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Deployment + per-account client builders
//! └── integration/      # End-to-end flows
//!     ├── transfer_flow.rs   # Request → approvals → completion
//!     ├── scan_flows.rs      # Probe window, miss tolerance, teardown
//!     └── session_flows.rs   # Connect, network switch, restore
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p gc-tests
//! cargo test -p gc-tests integration::transfer_flow
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
