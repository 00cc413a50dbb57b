use anyhow::{bail, Context, Result};
use log::{debug, warn};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::UploadError;
use crate::transport::RawStreams;

/// lrzsz sender, found on PATH unless overridden.
pub const DEFAULT_SENDER: &str = "sx";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What to send and how the sender should behave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub file: PathBuf,
    pub verbose: bool,
    /// 1024-byte blocks (`-k`); false falls back to 128/256-byte blocks
    pub one_k: bool,
}

impl TransferRequest {
    /// Fails unless `file` is a readable regular file.
    pub fn validate(&self) -> Result<()> {
        let meta = fs::metadata(&self.file)
            .with_context(|| format!("cannot access {}", self.file.display()))?;
        if !meta.is_file() {
            bail!("{} is not a regular file", self.file.display());
        }
        fs::File::open(&self.file)
            .with_context(|| format!("cannot read {}", self.file.display()))?;
        Ok(())
    }

    /// `--ymodem [-k] <-vvv|-q> <file>`
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--ymodem".into()];
        if self.one_k {
            args.push("-k".into());
        }
        args.push(if self.verbose { "-vvv" } else { "-q" }.into());
        args.push(self.file.clone().into_os_string());
        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    /// None when the sender was killed by a signal
    pub code: Option<i32>,
}

impl TransferOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// External YMODEM sender bound to the raw device streams.
pub trait Transfer {
    /// Run to completion. `Err` is reserved for spawn/wait failures and
    /// cancellation; a non-zero exit is a normal outcome.
    fn send(
        &mut self,
        request: &TransferRequest,
        streams: &RawStreams,
        cancel: &CancelToken,
    ) -> Result<TransferOutcome>;
}

pub struct ExternalSender {
    program: OsString,
}

impl ExternalSender {
    pub fn new(program: impl Into<OsString>) -> ExternalSender {
        ExternalSender {
            program: program.into(),
        }
    }
}

impl Default for ExternalSender {
    fn default() -> ExternalSender {
        ExternalSender::new(DEFAULT_SENDER)
    }
}

impl Transfer for ExternalSender {
    fn send(
        &mut self,
        request: &TransferRequest,
        streams: &RawStreams,
        cancel: &CancelToken,
    ) -> Result<TransferOutcome> {
        let args = request.args();
        debug!("spawning {:?} {:?}", self.program, args);

        let stdin = streams.input.try_clone().context("failed to clone device input")?;
        let stdout = streams.output.try_clone().context("failed to clone device output")?;
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn {:?}", self.program))?;

        loop {
            if let Some(status) = child.try_wait().context("failed to wait for sender")? {
                // Ctrl-C reaches sx through the process group first
                if cancel.is_cancelled() {
                    return Err(UploadError::Cancelled.into());
                }
                return Ok(TransferOutcome {
                    code: status.code(),
                });
            }
            if cancel.is_cancelled() {
                warn!("stopping sender");
                if let Err(e) = child.kill() {
                    debug!("kill: {}", e);
                }
                child.wait().context("failed to reap sender")?;
                return Err(UploadError::Cancelled.into());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(verbose: bool, one_k: bool) -> TransferRequest {
        TransferRequest {
            file: PathBuf::from("fw.bin"),
            verbose,
            one_k,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn default_args_use_1k_blocks_and_quiet() {
        assert_eq!(
            strings(request(false, true).args()),
            ["--ymodem", "-k", "-q", "fw.bin"]
        );
    }

    #[test]
    fn notonek_omits_k() {
        let args = strings(request(false, false).args());
        assert_eq!(args, ["--ymodem", "-q", "fw.bin"]);
    }

    #[test]
    fn verbose_selects_vvv() {
        assert_eq!(
            strings(request(true, true).args()),
            ["--ymodem", "-k", "-vvv", "fw.bin"]
        );
        assert_eq!(
            strings(request(true, false).args()),
            ["--ymodem", "-vvv", "fw.bin"]
        );
    }

    #[test]
    fn validate_checks_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut req = request(false, true);
        req.file = file.path().to_path_buf();
        assert!(req.validate().is_ok());

        req.file = file.path().with_extension("missing");
        assert!(req.validate().is_err());

        req.file = std::env::temp_dir();
        assert!(req.validate().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_is_reported() {
        let dev = tempfile::NamedTempFile::new().unwrap();
        let streams = RawStreams::open(dev.path()).unwrap();
        let cancel = CancelToken::new();

        let ok = ExternalSender::new("true")
            .send(&request(false, true), &streams, &cancel)
            .unwrap();
        assert!(ok.success());

        let failed = ExternalSender::new("false")
            .send(&request(false, true), &streams, &cancel)
            .unwrap();
        assert_eq!(failed.code, Some(1));
        assert!(!failed.success());
    }

    #[cfg(unix)]
    #[test]
    fn exit_after_signal_is_cancellation() {
        let dev = tempfile::NamedTempFile::new().unwrap();
        let streams = RawStreams::open(dev.path()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = ExternalSender::new("true")
            .send(&request(false, true), &streams, &cancel)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UploadError>(),
            Some(UploadError::Cancelled)
        ));
    }

    #[test]
    fn missing_program_is_an_error() {
        let dev = tempfile::NamedTempFile::new().unwrap();
        let streams = RawStreams::open(dev.path()).unwrap();
        let result = ExternalSender::new("definitely-not-an-sx-binary")
            .send(&request(false, true), &streams, &CancelToken::new());
        assert!(result.is_err());
    }
}
