//! # Adapters
//!
//! Implementations of the outbound ports against real endpoints: JSON-RPC
//! over HTTP for the contract and wallet, a WebSocket log subscription for
//! events, Pinata for document bytes and a JSON file for the session.

pub mod abi;
pub mod json_rpc;
pub mod pinata;
pub mod session_store;
pub mod ws_events;

pub use json_rpc::JsonRpcClient;
pub use pinata::{gateway_url, PinataStore};
pub use session_store::FileSessionStore;
pub use ws_events::LogSubscriber;
