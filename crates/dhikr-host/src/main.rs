//! dhikr-host
//!
//! Runs the offline worker as a local reverse proxy in front of the dhikr
//! counter origin.

mod config;
mod proxy;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use dhikr_common::{init_logging, LogConfig, LogFormat, ResultExt};
use tokio::net::TcpListener;
use tracing::error;

use config::HostConfig;
use proxy::AppState;

#[derive(Parser, Debug)]
#[command(name = "dhikr-host")]
#[command(about = "Serve the dhikr counter through its offline worker")]
struct Args {
    /// Host configuration file (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Listen address, overriding the configuration file
    #[arg(long)]
    listen: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormatArg::Pretty)]
    log_format: LogFormatArg,

    /// Debug logging with source locations and span events
    #[arg(long)]
    debug: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(LogConfig::for_host(args.debug, args.log_format.into())) {
        eprintln!("dhikr-host: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, category = e.category(), "dhikr-host failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> dhikr_common::Result<()> {
    let mut config = HostConfig::load(&args.config).await?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let state = AppState::start(&config).await?;

    let listener = TcpListener::bind(&config.listen)
        .await
        .context(format!("binding {}", config.listen))?;
    proxy::serve(listener, state).await
}
