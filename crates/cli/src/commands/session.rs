//! Session commands.
//!
//! # Environment Variables
//!
//! - `NUTRIFIT_PASSWORD` - Password, when `--password` is not given

use secrecy::SecretString;

use nutrifit_client::gate::{Decision, Route};
use nutrifit_client::session::{Credentials, ProfileSeed};
use nutrifit_client::{App, AppError};
use nutrifit_core::Email;

/// Sign in with email and password.
///
/// # Errors
///
/// Returns the provider's error if sign-in fails.
pub async fn login(app: &App, email: Email, password: String) -> Result<(), AppError> {
    let identity = app.session().sign_in(&Credentials::new(email, password)).await?;
    tracing::info!(
        user_id = %identity.id,
        "Logged in as {}",
        identity.greeting_name().unwrap_or("you")
    );
    Ok(())
}

/// Create an account.
///
/// # Errors
///
/// Returns `BadRequest` for a blank name, or the provider's error.
pub async fn signup(
    app: &App,
    email: Email,
    name: &str,
    password: String,
) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("Please enter your full name".to_string()));
    }

    let seed = ProfileSeed {
        full_name: name.trim().to_string(),
    };
    match app
        .session()
        .sign_up(&Credentials::new(email, password), &seed)
        .await?
    {
        Some(identity) => tracing::info!(user_id = %identity.id, "Account created and signed in"),
        None => tracing::info!("Account created; confirm your email, then log in"),
    }
    Ok(())
}

/// Sign out.
///
/// # Errors
///
/// Returns the provider's error if sign-out fails.
pub async fn logout(app: &App) -> Result<(), AppError> {
    app.session().sign_out().await?;
    Ok(())
}

/// Set a new password from the reset form.
///
/// # Errors
///
/// Returns `BadRequest` if the reset form is not reachable (no session), or
/// the provider's error.
pub async fn reset_password(app: &App, password: String) -> Result<(), AppError> {
    if password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".to_string(),
        ));
    }

    let reset = Route::Auth { reset: true };
    match app.navigate(&reset.path()).await {
        Decision::Render(_) if app.session().status().is_authenticated() => {}
        _ => {
            return Err(AppError::BadRequest(
                "Your password reset link has expired. Please request a new one.".to_string(),
            ));
        }
    }

    app.session()
        .update_password(&SecretString::from(password))
        .await?;
    tracing::info!("Password updated; log in with your new password");
    Ok(())
}
