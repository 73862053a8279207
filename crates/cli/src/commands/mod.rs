//! Command implementations.

pub mod analyze;
pub mod navigate;
pub mod onboarding;
pub mod profile;
pub mod session;
