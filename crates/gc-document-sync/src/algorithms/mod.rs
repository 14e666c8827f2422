//! # Algorithms Module
//!
//! Scanning, role classification and history selection.

pub mod history;
pub mod roles;
pub mod scanner;

pub use history::{relation_of, select_history};
pub use roles::{classify, classify_str};
pub use scanner::{is_incoming, is_visible, scan_documents};
