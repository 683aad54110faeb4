use autoeval::cli::Args;
use autoeval::config::Config;
use autoeval::logging::setup_logging;
use clap::Parser;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Config must load before logging so the level is honored; a missing
    // credential section aborts here, before any network activity.
    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(2);
        }
    };
    setup_logging(&config, args.tracing);

    match autoeval::app::run(config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "run aborted");
            ExitCode::from(2)
        }
    }
}
