//! Echoprobe client binary.
//!
//! # Usage
//!
//! ```bash
//! # Connect with a token minted by the backend
//! echoprobe-client "$(cat token.b64)"
//!
//! # Bind a specific local address and stop after ten seconds
//! echoprobe-client --bind 127.0.0.1 --max-ticks 600 "$TOKEN"
//! ```
//!
//! Exits 0 when the session ends for any connection reason or on Ctrl-C,
//! 1 on usage, token or setup errors, and 101 when an echoed packet comes
//! back altered.

use std::{io, process::ExitCode};

use clap::Parser;
use echoprobe_client::{
    Client, ClientConfig, DriverConfig, EXIT_FAILURE, PlainUdpEngine, SystemEnv,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Echoprobe test client
#[derive(Parser, Debug)]
#[command(name = "echoprobe-client")]
#[command(about = "Connect with a token and verify echoed packets")]
#[command(version)]
struct Args {
    /// Base64-encoded connect token
    token: String,

    /// Local address to bind the client socket to
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Stop cleanly after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> ClientConfig {
        ClientConfig {
            bind_address: self.bind.clone(),
            driver: DriverConfig { max_ticks: self.max_ticks, ..Default::default() },
        }
    }
}

/// Exit code after clap rejected the arguments and tried to print why.
///
/// `--help` and `--version` exit 0 unless printing them failed.
fn usage_exit_code(err: &clap::Error, printed: io::Result<()>) -> u8 {
    if err.use_stderr() || printed.is_err() { EXIT_FAILURE } else { 0 }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => return ExitCode::from(usage_exit_code(&e, e.print())),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("[client]");

    let engine = match PlainUdpEngine::init() {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(EXIT_FAILURE);
        },
    };

    let client = Client::new(SystemEnv::new(), engine, args.config());
    let interrupts = match client.shutdown_signal().listen_for_interrupt() {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::warn!("interrupt handler unavailable: {e}");
            None
        },
    };

    let result = client.run(&args.token).await;
    if let Some(listener) = interrupts {
        listener.abort();
    }

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(e.exit_code())
        },
    }
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn token_is_required() {
        let err = Args::try_parse_from(["echoprobe-client"]).expect_err("missing token");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert!(err.use_stderr());
    }

    #[test]
    fn help_is_not_an_error_exit() {
        let err = Args::try_parse_from(["echoprobe-client", "--help"]).expect_err("help");
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert!(!err.use_stderr());
    }

    #[test]
    fn usage_errors_exit_with_failure() {
        let err = Args::try_parse_from(["echoprobe-client"]).expect_err("missing token");
        assert_eq!(usage_exit_code(&err, Ok(())), EXIT_FAILURE);
    }

    #[test]
    fn help_exits_zero_unless_printing_fails() {
        let err = Args::try_parse_from(["echoprobe-client", "--help"]).expect_err("help");
        assert_eq!(usage_exit_code(&err, Ok(())), 0);
        let closed = io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed");
        assert_eq!(usage_exit_code(&err, Err(closed)), EXIT_FAILURE);
    }

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["echoprobe-client", "dG9rZW4="]).expect("parse");
        let config = args.config();
        assert_eq!(args.token, "dG9rZW4=");
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.driver, DriverConfig::default());
    }

    #[test]
    fn overrides() {
        let args = Args::try_parse_from([
            "echoprobe-client",
            "--bind",
            "127.0.0.1:5000",
            "--max-ticks",
            "600",
            "dG9rZW4=",
        ])
        .expect("parse");
        let config = args.config();
        assert_eq!(config.bind_address, "127.0.0.1:5000");
        assert_eq!(config.driver.max_ticks, Some(600));
    }
}
