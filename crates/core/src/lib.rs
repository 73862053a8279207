//! NutriFit Core - Shared types library.
//!
//! This crate provides the domain types used across the NutriFit client:
//! - `client` - Session, onboarding, route gating and analysis services
//! - `cli` - Terminal front end
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no async
//! runtime. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, identities, nutrition results and
//!   profile records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
