use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::UploadError;

/// Flag shared with the signal handler, polled at every resource boundary.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Set the token on SIGTERM and SIGINT.
    pub fn register_signals(&self) -> Result<()> {
        for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
            signal_hook::flag::register(signal, Arc::clone(&self.flag))
                .with_context(|| format!("failed to register handler for signal {}", signal))?;
        }
        Ok(())
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Err(Cancelled) once the token is set.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(anyhow!(UploadError::Cancelled));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let handler_side = token.clone();
        assert!(token.check().is_ok());
        handler_side.cancel();
        assert!(token.is_cancelled());
        let err = token.check().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UploadError>(),
            Some(UploadError::Cancelled)
        ));
    }
}
