//! Upload a firmware image to a Smoothie board over YMODEM.
//!
//! Usage:
//!   upload-ym firmware.bin USB0
//!   upload-ym --flash firmware.bin ACM0

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::process::ExitCode;

use upload_ym::config::Overrides;
use upload_ym::upload::{self, UploadSpecs};
use upload_ym::{
    exit_code, CancelToken, ExternalSender, SerialDevice, SerialSpecs, TransferRequest,
    EXIT_FAILURE,
};

/// ymodem upload file to smoothie
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// filename to be uploaded
    file: PathBuf,

    /// Smoothie serial device, e.g. USB0 for /dev/ttyUSB0
    device: String,

    /// verbose output
    #[arg(short, long)]
    verbose: bool,

    /// flash the image once it is uploaded
    #[arg(short, long)]
    flash: bool,

    /// 128/256 byte blocks instead of 1K
    #[arg(short = '1', long)]
    notonek: bool,
}

fn run(cli: Cli, cancel: &CancelToken) -> Result<bool> {
    let overrides = Overrides::from_env()?;
    let device = SerialDevice::new(SerialSpecs::new(&cli.device)?);
    let mut sender = ExternalSender::new(overrides.sender);

    let specs = UploadSpecs {
        request: TransferRequest {
            file: cli.file,
            verbose: cli.verbose,
            one_k: !cli.notonek,
        },
        flash: cli.flash,
        handshake: overrides.handshake,
        flash_verify: overrides.flash_verify,
    };

    let outcome = upload::run(&device, &mut sender, &specs, cancel)?;
    Ok(outcome.uploaded)
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("terminal logger not installed")?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("{:#}", e);
    }

    let cancel = CancelToken::new();
    if let Err(e) = cancel.register_signals() {
        error!("{:#}", e);
        return ExitCode::from(EXIT_FAILURE as u8);
    }

    match run(cli, &cancel) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_FAILURE as u8),
        Err(e) => {
            if cancel.is_cancelled() {
                info!("got termination signal, exiting");
            } else {
                error!("{:#}", e);
            }
            ExitCode::from(exit_code(&e) as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_logger_setup_is_reported() {
        let _ = init_logging(false);
        let err = init_logging(true).unwrap_err();
        assert!(err.to_string().contains("terminal logger not installed"));
    }
}
