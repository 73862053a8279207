//! NutriFit client library.
//!
//! Session state, onboarding, route gating and nutrition analysis for the
//! NutriFit food-photo app, with REST clients for the backend that holds
//! accounts, profiles and avatars.
//!
//! # Modules
//!
//! - [`session`] - Session store fed by an [`session::IdentityProvider`]
//! - [`onboarding`] - Device-local onboarding flag
//! - [`gate`] - Route authorization decisions
//! - [`analysis`] - Analysis request coordinator and service client
//! - [`backend`] - Backend identity provider and profile store
//! - [`app`] - Application context wiring it all together

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod analysis;
pub mod app;
pub mod backend;
pub mod config;
pub mod error;
pub mod gate;
pub mod notify;
pub mod onboarding;
pub mod session;
pub mod storage;
pub mod telemetry;

pub use app::App;
pub use config::ClientConfig;
pub use error::{AppError, Result};
