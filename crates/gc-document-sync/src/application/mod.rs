//! # Application Module
//!
//! Services orchestrating the domain and outbound ports: the session, the
//! sync loop, the action gateway and transfer history.

pub mod client;
pub mod gateway;
pub mod history;
pub mod notifications;
pub mod session;
pub mod sync_loop;

pub use client::{RegistryClient, RegistryPorts};
pub use gateway::{InFlightActions, InFlightGuard, TransferGateway};
pub use history::HistoryService;
pub use notifications::{notice_for_event, NotificationLedger, Notifier};
pub use session::{ActiveSession, Session, SessionState};
pub use sync_loop::{spawn_sync_loop, Refresher, SyncHandle, SyncInputs};
