//! NutriFit CLI - Terminal front end for the NutriFit client.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (password from --password or NUTRIFIT_PASSWORD)
//! nutrifit login -e sam@example.com
//!
//! # See what a route resolves to
//! nutrifit open /profile
//!
//! # Analyse a food photo
//! nutrifit analyze ./avocado-toast.jpg
//!
//! # Manage allergies
//! nutrifit allergies add peanuts --severity severe
//! ```
//!
//! # Commands
//!
//! - `open` - Navigate to a route through the authorization gate
//! - `login` / `signup` / `logout` / `reset-password` - Session management
//! - `analyze` - Submit an image for nutrition analysis
//! - `onboarding` - Inspect or change the onboarding flag
//! - `profile` - Show or edit the profile
//! - `allergies` - List, add or remove allergies

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use nutrifit_client::config::LogFormat;
use nutrifit_client::notify::TracingNotifier;
use nutrifit_client::{App, AppError, ClientConfig, telemetry};
use nutrifit_core::{Email, Severity};

mod commands;

#[derive(Parser)]
#[command(name = "nutrifit")]
#[command(author, version, about = "NutriFit food analysis client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Navigate to a route (e.g. `/`, `/profile`, `/auth?reset=true`)
    Open {
        /// Route path
        path: String,
    },
    /// Sign in with email and password
    Login {
        /// Account email address
        #[arg(short, long)]
        email: Email,

        /// Account password
        #[arg(short, long, env = "NUTRIFIT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account
    Signup {
        /// Account email address
        #[arg(short, long)]
        email: Email,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Account password
        #[arg(short, long, env = "NUTRIFIT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out
    Logout,
    /// Set a new password for the signed-in account
    ResetPassword {
        /// New password
        #[arg(short, long, env = "NUTRIFIT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Analyse a food image
    Analyze {
        /// Path to the image file
        image: PathBuf,
    },
    /// Manage the onboarding flag
    Onboarding {
        #[command(subcommand)]
        action: OnboardingAction,
    },
    /// Show or edit the profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Manage allergies
    Allergies {
        #[command(subcommand)]
        action: AllergyAction,
    },
}

#[derive(Subcommand)]
enum OnboardingAction {
    /// Show whether onboarding is complete
    Status,
    /// Mark onboarding as complete
    Complete,
    /// Show onboarding again next time
    Reset,
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Show the profile
    Show,
    /// Change the display name
    Rename {
        /// New display name
        name: String,
    },
    /// Upload a profile picture
    Avatar {
        /// Path to the image file
        image: PathBuf,
    },
}

#[derive(Subcommand)]
enum AllergyAction {
    /// List allergies
    List,
    /// Add an allergy
    Add {
        /// Substance, e.g. "peanuts"
        substance: String,

        /// Severity (`mild`, `moderate`, `severe`)
        #[arg(short, long, default_value = "mild")]
        severity: Severity,
    },
    /// Remove an allergy by id
    Remove {
        /// Allergy id
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            telemetry::init_tracing(LogFormat::default());
            tracing::error!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = telemetry::init_sentry(&config);
    telemetry::init_tracing(config.log_format);

    if let Err(e) = run(cli, &config).await {
        e.report();
        tracing::error!("Command failed: {}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), AppError> {
    let app = App::start(config, Arc::new(TracingNotifier)).await?;

    let result = match cli.command {
        Commands::Open { path } => {
            commands::navigate::open(&app, &path).await;
            Ok(())
        }
        Commands::Login { email, password } => {
            commands::session::login(&app, email, password).await
        }
        Commands::Signup {
            email,
            name,
            password,
        } => commands::session::signup(&app, email, &name, password).await,
        Commands::Logout => commands::session::logout(&app).await,
        Commands::ResetPassword { password } => {
            commands::session::reset_password(&app, password).await
        }
        Commands::Analyze { image } => commands::analyze::analyze(&app, &image).await,
        Commands::Onboarding { action } => {
            match action {
                OnboardingAction::Status => commands::onboarding::status(&app),
                OnboardingAction::Complete => commands::onboarding::complete(&app).await,
                OnboardingAction::Reset => commands::onboarding::reset(&app).await,
            }
            Ok(())
        }
        Commands::Profile { action } => match action {
            ProfileAction::Show => commands::profile::show(&app).await,
            ProfileAction::Rename { name } => commands::profile::rename(&app, &name).await,
            ProfileAction::Avatar { image } => commands::profile::avatar(&app, &image).await,
        },
        Commands::Allergies { action } => match action {
            AllergyAction::List => commands::profile::list_allergies(&app).await,
            AllergyAction::Add {
                substance,
                severity,
            } => commands::profile::add_allergy(&app, &substance, severity).await,
            AllergyAction::Remove { id } => commands::profile::remove_allergy(&app, &id).await,
        },
    };

    app.shutdown();
    result
}
