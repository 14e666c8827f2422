//! # Shared Types Crate
//!
//! This crate contains the registry entities used by every other crate in the
//! workspace: addresses, token identifiers, transaction hashes and the
//! `DocumentRecord` returned by the registry contract.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: The contract's record layout is defined once.
//! - **Parsed, not compared**: Addresses are parsed into bytes at the edge, so
//!   equality is case-insensitive with respect to their hex spelling.
//! - **Zero means absent**: The zero address is the contract's "no such token"
//!   and "no pending transfer" sentinel.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
