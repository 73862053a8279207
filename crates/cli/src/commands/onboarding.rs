//! Onboarding flag commands.

use nutrifit_client::App;

/// Report whether onboarding is complete on this device.
pub fn status(app: &App) {
    let completed = app.onboarding().get();
    tracing::info!(completed, "Onboarding {}", if completed { "complete" } else { "pending" });
}

pub async fn complete(app: &App) {
    app.onboarding().complete().await;
    tracing::info!("Onboarding marked complete");
}

pub async fn reset(app: &App) {
    app.onboarding().reset().await;
    tracing::info!("Onboarding will be shown again");
}
