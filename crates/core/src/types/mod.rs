//! Core types for NutriFit.
//!
//! This module provides type-safe wrappers for the client's domain concepts.

pub mod email;
pub mod id;
pub mod identity;
pub mod nutrition;
pub mod profile;

pub use email::{Email, EmailError};
pub use id::*;
pub use identity::{Identity, SessionStatus};
pub use nutrition::{FoodItem, NutrientAmount, NutrientAmountError, NutrientBreakdown, NutritionResult};
pub use profile::{Allergy, NewAllergy, Profile, Severity};
