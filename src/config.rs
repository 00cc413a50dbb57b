use anyhow::{bail, Context, Result};
use std::ffi::OsString;

use crate::handshake::HandshakePolicy;
use crate::sender::DEFAULT_SENDER;
use crate::upload::FlashVerify;

pub const ENV_SENDER: &str = "UPLOAD_YM_SENDER";
pub const ENV_HANDSHAKE_TIMEOUT: &str = "UPLOAD_YM_HANDSHAKE_TIMEOUT";
pub const ENV_HANDSHAKE_ATTEMPTS: &str = "UPLOAD_YM_HANDSHAKE_ATTEMPTS";
pub const ENV_FLASH_VERIFY: &str = "UPLOAD_YM_FLASH_VERIFY";

/// Settings the command line does not expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overrides {
    pub sender: OsString,
    pub handshake: HandshakePolicy,
    pub flash_verify: FlashVerify,
}

impl Default for Overrides {
    fn default() -> Overrides {
        Overrides {
            sender: DEFAULT_SENDER.into(),
            handshake: HandshakePolicy::default(),
            flash_verify: FlashVerify::default(),
        }
    }
}

impl Overrides {
    pub fn from_env() -> Result<Overrides> {
        Overrides::from_vars(|name| std::env::var_os(name))
    }

    /// `lookup` returns the raw value of a variable, None when unset.
    pub fn from_vars<F>(lookup: F) -> Result<Overrides>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut overrides = Overrides::default();
        let text = |name: &str| -> Result<Option<String>> {
            match lookup(name) {
                None => Ok(None),
                Some(value) => value
                    .into_string()
                    .map(Some)
                    .map_err(|_| anyhow::anyhow!("{} is not valid UTF-8", name)),
            }
        };

        if let Some(sender) = lookup(ENV_SENDER) {
            if sender.is_empty() {
                bail!("{} is empty", ENV_SENDER);
            }
            overrides.sender = sender;
        }

        if let Some(value) = text(ENV_HANDSHAKE_TIMEOUT)? {
            let timeout = humantime::parse_duration(value.trim())
                .with_context(|| format!("invalid {}: {:?}", ENV_HANDSHAKE_TIMEOUT, value))?;
            overrides.handshake.timeout = Some(timeout);
        }

        if let Some(value) = text(ENV_HANDSHAKE_ATTEMPTS)? {
            let attempts: u32 = value
                .trim()
                .parse()
                .with_context(|| format!("invalid {}: {:?}", ENV_HANDSHAKE_ATTEMPTS, value))?;
            if attempts == 0 {
                bail!("{} must be at least 1", ENV_HANDSHAKE_ATTEMPTS);
            }
            overrides.handshake.max_attempts = Some(attempts);
        }

        if let Some(value) = text(ENV_FLASH_VERIFY)? {
            overrides.flash_verify = match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => FlashVerify::Acknowledge,
                "" | "0" | "false" | "no" | "off" => FlashVerify::FireAndForget,
                _ => bail!("invalid {}: {:?}", ENV_FLASH_VERIFY, value),
            };
        }

        Ok(overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn parse(vars: &[(&str, &str)]) -> Result<Overrides> {
        let map: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        Overrides::from_vars(|name| map.get(name).cloned())
    }

    #[test]
    fn nothing_set_keeps_reference_behaviour() {
        let overrides = parse(&[]).unwrap();
        assert_eq!(overrides.sender, OsString::from("sx"));
        assert_eq!(overrides.handshake.max_attempts, None);
        assert_eq!(overrides.handshake.timeout, None);
        assert_eq!(overrides.flash_verify, FlashVerify::FireAndForget);
    }

    #[test]
    fn all_knobs() {
        let overrides = parse(&[
            (ENV_SENDER, "/usr/local/bin/lsx"),
            (ENV_HANDSHAKE_TIMEOUT, "1m 30s"),
            (ENV_HANDSHAKE_ATTEMPTS, "200"),
            (ENV_FLASH_VERIFY, "yes"),
        ])
        .unwrap();
        assert_eq!(overrides.sender, OsString::from("/usr/local/bin/lsx"));
        assert_eq!(overrides.handshake.timeout, Some(Duration::from_secs(90)));
        assert_eq!(overrides.handshake.max_attempts, Some(200));
        assert_eq!(overrides.flash_verify, FlashVerify::Acknowledge);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = parse(&[(ENV_HANDSHAKE_TIMEOUT, "soon")]).unwrap_err();
        assert!(err.to_string().contains(ENV_HANDSHAKE_TIMEOUT));

        let err = parse(&[(ENV_HANDSHAKE_ATTEMPTS, "0")]).unwrap_err();
        assert!(err.to_string().contains(ENV_HANDSHAKE_ATTEMPTS));

        let err = parse(&[(ENV_FLASH_VERIFY, "maybe")]).unwrap_err();
        assert!(err.to_string().contains(ENV_FLASH_VERIFY));

        assert!(parse(&[(ENV_SENDER, "")]).is_err());
    }
}
