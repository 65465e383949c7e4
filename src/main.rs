use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use evp_analyst::app::AppState;
use evp_analyst::model::Config;

/// Analyze a company's EVP and business position with quality checks
#[derive(Debug, Parser)]
#[command(name = "evp-analyst", version)]
struct Args {
    /// Company name as the user would type it
    #[arg(long)]
    company: String,

    /// Company homepage, used for domain-scoped evidence
    #[arg(long)]
    homepage: Option<String>,

    /// Focus area emphasized in the narrative
    #[arg(long, default_value = "general")]
    focus: String,

    /// Print the report as single-line JSON
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore if missing)
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries only the report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize");
            eprintln!("error[{}]: {}", e.reason_code(), e);
            return ExitCode::from(2);
        }
    };

    let report = match state
        .pipeline
        .analyze(&args.company, args.homepage.as_deref(), &args.focus)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error[{}]: {}", e.reason_code(), e);
            return ExitCode::FAILURE;
        }
    };

    let output = if args.compact {
        serde_json::to_string(&report)
    } else {
        report.to_json_pretty()
    };

    match output {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize report");
            ExitCode::FAILURE
        }
    }
}
