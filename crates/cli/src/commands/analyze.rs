//! Nutrition analysis command.

use std::path::Path;

use nutrifit_client::analysis::ImageHandle;
use nutrifit_client::{App, AppError};
use nutrifit_core::{NutrientAmount, NutritionResult};

/// Analyse a food photo and print the breakdown.
///
/// # Errors
///
/// Returns `BadRequest` if the file is unreadable or not an image, and the
/// coordinator's error if analysis fails.
pub async fn analyze(app: &App, path: &Path) -> Result<(), AppError> {
    let image = ImageHandle::from_path(path)
        .await
        .map_err(|e| AppError::BadRequest(format!("Cannot read {}: {e}", path.display())))?;
    if !image.content_type.starts_with("image/") {
        return Err(AppError::BadRequest("Please upload an image file".to_string()));
    }

    // Analysis needs the session; give it the usual time to resolve
    app.resolve_identity().await;

    let result = app.analysis().submit(image).await?;
    report(&result);
    Ok(())
}

fn report(result: &NutritionResult) {
    tracing::info!("Total calories: {:.0}", result.total_calories);
    tracing::info!("Healthiness: {}", result.healthiness);
    for item in &result.food_items {
        tracing::info!("  {}: {:.0} kcal", item.item, item.calories);
    }
    for (label, value) in result.nutrient_breakdown.entries() {
        match NutrientAmount::parse(value) {
            Ok(amount) => tracing::info!("  {label}: {amount}"),
            Err(_) => tracing::info!("  {label}: {value}"),
        }
    }
    if result.is_safe_to_consume {
        tracing::info!("Safe to consume given your allergies");
    } else {
        tracing::warn!("Not safe to consume given your allergies");
    }
}
