use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tasktrack::cli::{Cli, LogFormat};
use tasktrack::config::Config;
use tasktrack::state::AppState;

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tasktrack=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout carries only the command's JSON.
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = Config::from_env();
    cli.apply_overrides(&mut config);
    config.validate()?;

    let state = AppState::from_config(&config).await?;
    let result = cli.run(&state).await;
    state.shutdown().await;

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output.body)?);

    Ok(if output.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
