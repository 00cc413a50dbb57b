use anyhow::{Error, Result};
use humantime::format_duration;
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::error::UploadError;
use crate::handshake::{self, HandshakePolicy, PROMPT};
use crate::sender::{Transfer, TransferRequest};
use crate::transport::{decode_line, Console, Device};
use crate::transport_serial::{DEFAULT_TIMEOUT, PROBE_TIMEOUT};

/// Starts a quiet YMODEM receive on the device shell.
pub const RECEIVE_COMMAND: &[u8] = b"ry -q\n";

/// Sent in order once an image has been received.
pub const FLASH_COMMANDS: [&str; 3] = ["rm flashme.bin", "mv smoothiev2.bin flashme.bin", "flash"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlashVerify {
    /// write and move on, the console reply is not looked at
    #[default]
    FireAndForget,
    /// read one line after each command and warn unless it starts with "ok"
    Acknowledge,
}

pub struct UploadSpecs {
    pub request: TransferRequest,
    pub flash: bool,
    pub handshake: HandshakePolicy,
    pub flash_verify: FlashVerify,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub uploaded: bool,
    pub flashed: bool,
}

/// Handshake, hand the device to the sender, flash if asked to.
///
/// Fatal errors are returned; a failed transfer is logged and reported
/// through `UploadOutcome::uploaded`.
pub fn run<D, T>(
    device: &D,
    sender: &mut T,
    specs: &UploadSpecs,
    cancel: &CancelToken,
) -> Result<UploadOutcome, Error>
where
    D: Device,
    T: Transfer,
{
    specs.request.validate()?;
    info!(
        "uploading file: {} to {}",
        specs.request.file.display(),
        device.path().display()
    );

    start_receive(device, &specs.handshake, cancel)?;

    let uploaded = transfer(device, sender, &specs.request, cancel)?;

    let mut outcome = UploadOutcome {
        uploaded,
        flashed: false,
    };
    if uploaded && specs.flash {
        cancel.check()?;
        flash(device, specs.flash_verify)?;
        outcome.flashed = true;
    }
    Ok(outcome)
}

/// Wait for the prompt and put the device into YMODEM receive.
/// The console is closed on return.
pub fn start_receive<D: Device>(
    device: &D,
    policy: &HandshakePolicy,
    cancel: &CancelToken,
) -> Result<()> {
    cancel.check()?;
    let mut console = device.open_console(PROBE_TIMEOUT)?;
    handshake::acquire(&mut console, policy, cancel)?;

    console.clear_input()?;
    console.write_line(RECEIVE_COMMAND)?;
    debug!("sent {:?}", decode_line(RECEIVE_COMMAND));
    Ok(())
}

/// Run the sender over the raw device. Ok(false) on a failed transfer.
fn transfer<D, T>(
    device: &D,
    sender: &mut T,
    request: &TransferRequest,
    cancel: &CancelToken,
) -> Result<bool>
where
    D: Device,
    T: Transfer,
{
    cancel.check()?;
    let streams = device.open_raw()?;

    let start_time = Instant::now();
    let result = sender.send(request, &streams, cancel);
    drop(streams);
    debug!("raw streams closed");

    cancel.check()?;
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(UploadError::Cancelled) = e.downcast_ref::<UploadError>() {
                return Err(e);
            }
            error!("exception: {:?}", e);
            return Ok(false);
        }
    };

    if !outcome.success() {
        error!(
            "failed: {}",
            UploadError::TransferFailed { code: outcome.code }
        );
        return Ok(false);
    }

    let elapsed = Duration::from_secs(start_time.elapsed().as_secs_f64().round() as u64);
    info!("uploaded ok, took {}", format_duration(elapsed));
    Ok(true)
}

/// Replace flashme.bin with the new image and start the flash.
pub fn flash<D: Device>(device: &D, verify: FlashVerify) -> Result<()> {
    let mut console = device.open_console(DEFAULT_TIMEOUT)?;
    console.clear_input()?;

    for (i, command) in FLASH_COMMANDS.iter().enumerate() {
        let mut line = command.as_bytes().to_vec();
        line.push(b'\n');
        console.write_line(&line)?;
        debug!("sent {:?}", command);

        // the board resets on "flash", nothing comes back
        let last = i + 1 == FLASH_COMMANDS.len();
        if verify == FlashVerify::Acknowledge && !last {
            let reply = decode_line(&console.read_line()?);
            if !reply.starts_with(PROMPT) {
                let err = UploadError::FlashCommand {
                    command: command.to_string(),
                    reply: reply.trim_end().to_string(),
                };
                warn!("{}", err);
            }
        }
        console.clear_input()?;
    }
    info!("flash started");
    Ok(())
}
