use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Automated course-evaluation runner for the university portal.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c', default_value = "autoeval.toml")]
    pub config: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = TracingFormat::Pretty)]
    pub tracing: TracingFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    Pretty,
    Json,
}
