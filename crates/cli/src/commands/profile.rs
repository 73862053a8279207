//! Profile and allergy commands.

use std::path::Path;

use nutrifit_client::analysis::ImageHandle;
use nutrifit_client::backend::ProfileError;
use nutrifit_client::{App, AppError};
use nutrifit_core::{AllergyId, Severity, UserId};

/// Signed-in user's id, once the session has resolved.
async fn signed_in_user(app: &App) -> Result<UserId, AppError> {
    app.resolve_identity()
        .await
        .map(|identity| identity.id)
        .ok_or(AppError::Profile(ProfileError::NotAuthenticated))
}

/// Show the profile.
///
/// # Errors
///
/// Returns `NotAuthenticated` without a session, or the backend's error.
pub async fn show(app: &App) -> Result<(), AppError> {
    let user = signed_in_user(app).await?;
    let profile = app.profiles().profile(&user).await?;

    tracing::info!("[{}] {}", profile.initial(), profile.full_name.as_deref().unwrap_or("(no name)"));
    if let Some(email) = app.session().identity().and_then(|identity| identity.email) {
        tracing::info!("Email: {email}");
    }
    if let Some(avatar) = &profile.avatar_url {
        tracing::info!("Avatar: {avatar}");
    }
    if let Some(created_at) = profile.created_at {
        tracing::info!("Member since {}", created_at.format("%B %-d, %Y"));
    }
    Ok(())
}

/// Change the display name.
///
/// # Errors
///
/// Returns `NotAuthenticated` without a session, or the backend's error.
pub async fn rename(app: &App, name: &str) -> Result<(), AppError> {
    let user = signed_in_user(app).await?;
    let profile = app.profiles().update_full_name(&user, name).await?;
    tracing::info!(full_name = ?profile.full_name, "Profile updated");
    Ok(())
}

/// Upload a profile picture.
///
/// # Errors
///
/// Returns `BadRequest` for unreadable or non-image files, `NotAuthenticated`
/// without a session, or the backend's error.
pub async fn avatar(app: &App, path: &Path) -> Result<(), AppError> {
    let image = ImageHandle::from_path(path)
        .await
        .map_err(|e| AppError::BadRequest(format!("Cannot read {}: {e}", path.display())))?;
    if !image.content_type.starts_with("image/") {
        return Err(AppError::BadRequest("Please upload an image file".to_string()));
    }

    let user = signed_in_user(app).await?;
    let profile = app.profiles().upload_avatar(&user, image).await?;
    tracing::info!(avatar_url = ?profile.avatar_url, "Avatar uploaded");
    Ok(())
}

/// List allergies.
///
/// # Errors
///
/// Returns `NotAuthenticated` without a session, or the backend's error.
pub async fn list_allergies(app: &App) -> Result<(), AppError> {
    let user = signed_in_user(app).await?;
    let allergies = app.profiles().allergies(&user).await?;

    if allergies.is_empty() {
        tracing::info!("No allergies recorded");
    }
    for allergy in &allergies {
        tracing::info!("{}  {} ({})", allergy.id, allergy.substance, allergy.severity);
    }
    Ok(())
}

/// Record an allergy.
///
/// # Errors
///
/// Returns `NotAuthenticated` without a session, `InvalidInput` for a blank
/// substance, or the backend's error.
pub async fn add_allergy(app: &App, substance: &str, severity: Severity) -> Result<(), AppError> {
    let user = signed_in_user(app).await?;
    let allergy = app.profiles().add_allergy(&user, substance, severity).await?;
    tracing::info!(allergy_id = %allergy.id, "Added {} ({})", allergy.substance, allergy.severity);
    Ok(())
}

/// Remove an allergy.
///
/// # Errors
///
/// Returns `NotAuthenticated` without a session, or the backend's error.
pub async fn remove_allergy(app: &App, id: &str) -> Result<(), AppError> {
    signed_in_user(app).await?;
    app.profiles().remove_allergy(&AllergyId::new(id)).await?;
    Ok(())
}
