//! Profile and allergy records owned by the profile domain.
//!
//! Rows are stored by the backend keyed by owner id; these types match its
//! column names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{AllergyId, UserId};

/// A user's profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Same id as the owning [`Identity`](super::Identity).
    pub id: UserId,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Single uppercase letter for an avatar placeholder.
    #[must_use]
    pub fn initial(&self) -> char {
        self.full_name
            .as_deref()
            .and_then(|name| name.trim().chars().next())
            .map_or('U', |c| c.to_ascii_uppercase())
    }
}

/// How severe a reaction to a substance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Mild,
    Moderate,
    Severe,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mild => write!(f, "mild"),
            Self::Moderate => write!(f, "moderate"),
            Self::Severe => write!(f, "severe"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mild" => Ok(Self::Mild),
            "moderate" => Ok(Self::Moderate),
            "severe" => Ok(Self::Severe),
            _ => Err(format!("invalid severity: {s} (expected mild, moderate or severe)")),
        }
    }
}

/// A self-reported allergy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allergy {
    pub id: AllergyId,
    pub user_id: UserId,
    pub substance: String,
    pub severity: Severity,
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new allergy row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAllergy {
    pub user_id: UserId,
    pub substance: String,
    pub severity: Severity,
}
