//! Nutrition analysis results as returned by the analysis service.
//!
//! Field names follow the service's JSON exactly (`total_calories`,
//! `food_items`, ...), so these types deserialize the response body directly.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A single recognized food item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    /// Human-readable label, e.g. "Avocado Toast".
    pub item: String,
    /// Estimated calories for this item.
    pub calories: f64,
}

/// Macro nutrient breakdown.
///
/// Each value is formatted by the service as `"<amount><unit> (<percent>%)"`,
/// e.g. `"45g (30%)"`. Use [`NutrientAmount::parse`] to pull it apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutrientBreakdown {
    pub carbohydrates: String,
    pub protein: String,
    pub fats: String,
    pub fiber: String,
    pub sugar: String,
}

impl NutrientBreakdown {
    /// The five macros in display order, paired with their labels.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("carbohydrates", self.carbohydrates.as_str()),
            ("protein", self.protein.as_str()),
            ("fats", self.fats.as_str()),
            ("fiber", self.fiber.as_str()),
            ("sugar", self.sugar.as_str()),
        ]
    }
}

/// Structured nutrition analysis of a single photo.
///
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionResult {
    pub total_calories: f64,
    pub food_items: Vec<FoodItem>,
    /// Free-form rating such as "Healthy" or "Moderately Healthy".
    pub healthiness: String,
    pub nutrient_breakdown: NutrientBreakdown,
    /// Whether the meal is safe given the user's recorded allergies.
    pub is_safe_to_consume: bool,
}

impl NutritionResult {
    /// Sum of the per-item calories.
    ///
    /// The service reports `total_calories` separately; the two may differ
    /// when it rounds or accounts for unlisted ingredients.
    #[must_use]
    pub fn item_calories(&self) -> f64 {
        self.food_items.iter().map(|item| item.calories).sum()
    }
}

/// Error parsing a nutrient breakdown string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid nutrient amount: {0:?}")]
pub struct NutrientAmountError(pub String);

/// A parsed breakdown entry such as `"45g (30%)"`.
#[derive(Debug, Clone, PartialEq)]
pub struct NutrientAmount {
    pub amount: f64,
    pub unit: String,
    /// Share of the recommended daily value, in percent.
    pub percent: f64,
}

impl NutrientAmount {
    /// Parse `"<amount><unit> (<percent>%)"`. Whitespace between the amount
    /// and unit is tolerated.
    ///
    /// ```
    /// use nutrifit_core::NutrientAmount;
    ///
    /// let fat = NutrientAmount::parse("25g (40%)").unwrap();
    /// assert_eq!(fat.unit, "g");
    /// assert!((fat.percent - 40.0).abs() < f64::EPSILON);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`NutrientAmountError`] when the text does not have that shape.
    pub fn parse(s: &str) -> Result<Self, NutrientAmountError> {
        let err = || NutrientAmountError(s.to_owned());

        let (quantity, rest) = s.trim().split_once('(').ok_or_else(err)?;
        let percent = rest
            .trim()
            .strip_suffix(')')
            .and_then(|p| p.trim().strip_suffix('%'))
            .ok_or_else(err)?
            .trim()
            .parse::<f64>()
            .map_err(|_| err())?;

        let quantity = quantity.trim();
        let split = quantity
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(quantity.len());
        let (amount, unit) = quantity.split_at(split);
        let amount = amount.parse::<f64>().map_err(|_| err())?;
        let unit = unit.trim();
        if unit.is_empty() {
            return Err(err());
        }

        Ok(Self {
            amount,
            unit: unit.to_owned(),
            percent,
        })
    }
}

impl fmt::Display for NutrientAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} ({}%)", self.amount, self.unit, self.percent)
    }
}
