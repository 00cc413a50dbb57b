use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use humantime::format_duration;

/// Exit status for a run interrupted by SIGTERM/SIGINT.
pub const EXIT_CANCELLED: i32 = 130;
/// Exit status for fatal errors and failed transfers.
pub const EXIT_FAILURE: i32 = 1;

// Errors the orchestrator and main branch on
#[derive(Debug)]
pub enum UploadError {
    // serial device path could not be opened
    DeviceOpen { path: PathBuf },
    // bounded handshake gave up without seeing "ok"
    HandshakeTimeout { attempts: u32, elapsed: Duration },
    // sender exited non-zero, None when it was killed by a signal
    TransferFailed { code: Option<i32> },
    // acknowledgement mode only: reply did not start with "ok"
    FlashCommand { command: String, reply: String },
    // a termination signal was received
    Cancelled,
}

impl UploadError {
    pub fn exit_code(&self) -> i32 {
        match self {
            UploadError::Cancelled => EXIT_CANCELLED,
            _ => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UploadError::DeviceOpen { path } => {
                write!(f, "cannot open serial device {}", path.display())
            }
            UploadError::HandshakeTimeout { attempts, elapsed } => {
                // round to milliseconds, humantime prints every nanosecond otherwise
                let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
                write!(
                    f,
                    "no \"ok\" from device after {} probes ({})",
                    attempts,
                    format_duration(elapsed)
                )
            }
            UploadError::TransferFailed { code: Some(code) } => {
                write!(f, "transfer failed with exit code {}", code)
            }
            UploadError::TransferFailed { code: None } => {
                write!(f, "transfer terminated by signal")
            }
            UploadError::FlashCommand { command, reply } => {
                write!(f, "command {:?} not acknowledged, got {:?}", command, reply)
            }
            UploadError::Cancelled => write!(f, "cancelled by termination signal"),
        }
    }
}

impl std::error::Error for UploadError {}

/// Exit status for an error coming out of the upload sequence.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<UploadError>() {
        Some(e) => e.exit_code(),
        None => EXIT_FAILURE,
    }
}
