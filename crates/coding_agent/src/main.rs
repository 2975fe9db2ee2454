use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context};
use clap::Parser;
use coding_agent::app::{App, AppIo};
use coding_agent::config::{AgentConfig, CliArgs};
use coding_agent::console::ConsoleInput;
use coding_agent::providers::provider_for_config;
use coding_agent::tools::ConsoleApprover;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let config = AgentConfig::from_env(&cli).context("invalid configuration")?;
    init_tracing(config.log_file.as_deref())?;

    let provider = provider_for_config(&config).map_err(|message| anyhow!(message))?;
    let mut input = ConsoleInput::spawn().context("failed to start console input")?;
    let io = AppIo {
        out: Box::new(io::stdout()),
        observer_out: Box::new(io::stdout()),
        approver: Box::new(ConsoleApprover::new(
            Box::new(input.clone()),
            Box::new(io::stdout()),
        )),
    };

    let mut app = App::start(config, provider, io).context("failed to start agent")?;
    app.run(&mut input)?;
    Ok(())
}

/// Logs go to stderr, or to `log_file` without ANSI colors. `RUST_LOG` overrides
/// the default `warn` level.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    };

    result.map_err(|error| anyhow!("failed to initialize logging: {error}"))
}
