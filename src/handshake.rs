use anyhow::{anyhow, Result};
use log::debug;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::error::UploadError;
use crate::transport::{decode_line, Console};

pub const PROMPT: &str = "ok";

/// Limits on the probe loop. The default probes until the device answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandshakePolicy {
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

impl HandshakePolicy {
    fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts.map_or(false, |max| attempts >= max)
            || self.timeout.map_or(false, |limit| elapsed >= limit)
    }
}

/// Probe with newlines until a line starting with "ok" comes back.
/// Returns the number of probes sent.
pub fn acquire<C: Console>(
    console: &mut C,
    policy: &HandshakePolicy,
    cancel: &CancelToken,
) -> Result<u32> {
    let start = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        cancel.check()?;
        if policy.exhausted(attempts, start.elapsed()) {
            return Err(anyhow!(UploadError::HandshakeTimeout {
                attempts,
                elapsed: start.elapsed(),
            }));
        }

        // startup banners and stale prompts
        console.clear_input()?;
        console.write_line(b"\n")?;
        attempts += 1;

        let reply = decode_line(&console.read_line()?);
        if reply.starts_with(PROMPT) {
            debug!("device ready after {} probes", attempts);
            return Ok(attempts);
        }
        debug!("probe {}: {:?}", attempts, reply);
    }
}
