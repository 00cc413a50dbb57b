// Copyright © 2023-2024 Vouch.io LLC

use anyhow::{anyhow, bail, Error, Result};
use log::debug;
use serialport::{ClearBuffer, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::UploadError;
use crate::transport::{Console, Device, RawStreams};

pub const BAUDRATE: u32 = 115200;
/// Read timeout while probing for the prompt.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(100);
/// Read timeout for the console opened after the transfer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

#[cfg(unix)]
const SERIAL_DIR: &str = "/dev";

pub struct SerialSpecs {
    pub device: PathBuf,
    pub baudrate: u32,
}

impl SerialSpecs {
    pub fn new(identifier: &str) -> Result<SerialSpecs> {
        Ok(SerialSpecs {
            device: device_path(identifier)?,
            baudrate: BAUDRATE,
        })
    }
}

/// `USB0` → `/dev/ttyUSB0`.
#[cfg(unix)]
pub fn device_path(identifier: &str) -> Result<PathBuf> {
    if identifier.is_empty() {
        bail!("device identifier is empty");
    }
    Ok(Path::new(SERIAL_DIR).join(format!("tty{}", identifier)))
}

/// `COM3` → `\\.\COM3`.
#[cfg(windows)]
pub fn device_path(identifier: &str) -> Result<PathBuf> {
    if identifier.is_empty() {
        bail!("device identifier is empty");
    }
    Ok(PathBuf::from(format!(r"\\.\{}", identifier)))
}

pub fn open_port(specs: &SerialSpecs, timeout: Duration) -> Result<Box<dyn SerialPort>, Error> {
    let name = specs.device.to_string_lossy();
    serialport::new(name.as_ref(), specs.baudrate)
        .timeout(timeout)
        .open()
        .map_err(|e| {
            anyhow!(e).context(UploadError::DeviceOpen {
                path: specs.device.clone(),
            })
        })
}

pub struct SerialConsole {
    port: Box<dyn SerialPort>,
    // bounds a whole read_line, not each byte
    timeout: Duration,
}

impl SerialConsole {
    pub fn new(port: Box<dyn SerialPort>, timeout: Duration) -> SerialConsole {
        SerialConsole { port, timeout }
    }

    fn read_until_deadline(&mut self, line: &mut Vec<u8>, deadline: Instant) -> Result<()> {
        let mut byte = [0u8];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            self.port.set_timeout(remaining)?;
            match self.port.read(&mut byte) {
                Ok(1) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        return Ok(());
                    }
                }
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Console for SerialConsole {
    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.port.write_all(line)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        let mut line = Vec::new();
        let result = self.read_until_deadline(&mut line, deadline);
        self.port.set_timeout(self.timeout)?;
        result.map(|_| line)
    }
}

impl Drop for SerialConsole {
    fn drop(&mut self) {
        debug!("closing {}", self.port.name().unwrap_or_else(|| "?".to_string()));
    }
}

pub struct SerialDevice {
    specs: SerialSpecs,
}

impl SerialDevice {
    pub fn new(specs: SerialSpecs) -> SerialDevice {
        SerialDevice { specs }
    }
}

impl Device for SerialDevice {
    type Console = SerialConsole;

    fn path(&self) -> &Path {
        &self.specs.device
    }

    fn open_console(&self, timeout: Duration) -> Result<SerialConsole> {
        let port = open_port(&self.specs, timeout)?;
        debug!("opened {} at {} baud", self.specs.device.display(), self.specs.baudrate);
        Ok(SerialConsole::new(port, timeout))
    }

    fn open_raw(&self) -> Result<RawStreams> {
        RawStreams::open(&self.specs.device).map_err(|e| {
            e.context(UploadError::DeviceOpen {
                path: self.specs.device.clone(),
            })
        })
    }
}
