//! Route navigation.
//!
//! # Usage
//!
//! ```bash
//! nutrifit open /
//! nutrifit open /auth?reset=true
//! ```

use nutrifit_client::App;
use nutrifit_client::gate::{Decision, Route};

/// Resolve `path` through the gate, following redirects, and describe the
/// screen that ends up rendered.
pub async fn open(app: &App, path: &str) {
    let mut target = path.to_string();
    // The gate never chains more than two redirects
    for _ in 0..4 {
        match app.navigate(&target).await {
            Decision::Render(route) => {
                describe(app, &route);
                return;
            }
            Decision::Redirect(route) => {
                tracing::info!(from = %target, to = %route, "Redirected");
                target = route.path();
            }
            Decision::Loading => {
                tracing::info!("Still loading");
                return;
            }
        }
    }
    tracing::warn!(path = %path, "Too many redirects");
}

fn describe(app: &App, route: &Route) {
    match route {
        Route::Home => {
            let name = app
                .session()
                .identity()
                .and_then(|identity| identity.greeting_name().map(str::to_string))
                .unwrap_or_else(|| "there".to_string());
            tracing::info!("Hi {name}! Snap or upload a food photo with `nutrifit analyze <image>`");
        }
        Route::Profile => tracing::info!("Profile: see `nutrifit profile show` and `nutrifit allergies list`"),
        Route::Auth { reset: true } => {
            tracing::info!("Set a new password with `nutrifit reset-password`");
        }
        Route::Auth { reset: false } => {
            tracing::info!("Log in with `nutrifit login` or create an account with `nutrifit signup`");
        }
        Route::ForgotPassword => tracing::info!("Password reset: contact support to receive a recovery link"),
        Route::Onboarding => {
            tracing::info!("Welcome to NutriFit.ai! Finish with `nutrifit onboarding complete`");
        }
        Route::NotFound(path) => tracing::info!(path = %path, "404: page not found"),
    }
}
