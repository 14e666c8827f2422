//! # Shared Bus - Registry Event Bus
//!
//! Carries decoded registry contract events from the event sources (the
//! WebSocket log subscription, or the in-memory registry in tests) to the
//! sync loop and any other listener in the process.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Event Source │                    │  Sync Loop   │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Guarantees
//!
//! - **Duplicate suppression:** A log identified by `(tx_hash, log_index)` is
//!   delivered at most once within the seen-log window, so a reconnecting
//!   source that replays recent logs does not cause double notices.
//! - **Drop to unsubscribe:** Dropping a `Subscription` releases it.
//! - **Lag is reported:** A subscriber more than [`DEFAULT_CHANNEL_CAPACITY`]
//!   events behind loses the oldest ones and gets
//!   `SubscriptionError::Lagged` from its next receive.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod seen_logs;
pub mod subscriber;

// Re-export main types
pub use events::{ContractEvent, EventFilter, EventTopic, LogMeta, RegistryEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use seen_logs::SeenLogCache;
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
