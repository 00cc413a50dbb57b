use anyhow::Result;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Line-oriented side of the device: the shell console.
pub trait Console {
    /// Discard whatever the device already sent.
    fn clear_input(&mut self) -> Result<()>;

    /// Write `line` and flush. The caller supplies the terminator.
    fn write_line(&mut self, line: &[u8]) -> Result<()>;

    /// Read up to and including `\n`, or whatever arrived before the read
    /// timeout. Never fails on timeout; an empty vector means silence.
    fn read_line(&mut self) -> Result<Vec<u8>>;
}

/// Both directions of the character device, opened without buffering.
///
/// Dropping the value closes both handles.
pub struct RawStreams {
    pub input: File,
    pub output: File,
}

impl RawStreams {
    pub fn open(path: &Path) -> Result<RawStreams> {
        let input = File::open(path)?;
        let output = File::options().write(true).open(path)?;
        Ok(RawStreams { input, output })
    }
}

/// Something a firmware image can be pushed to.
pub trait Device {
    type Console: Console;

    /// Path the device was resolved to, for logging.
    fn path(&self) -> &Path;

    /// Open the console with the given read timeout.
    fn open_console(&self, timeout: Duration) -> Result<Self::Console>;

    /// Reopen the device as two raw byte streams for the sender.
    fn open_raw(&self) -> Result<RawStreams>;
}

/// Latin-1 decode: every byte maps to one char, so this never fails.
pub fn decode_line(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn latin1_decode_keeps_every_byte() {
        assert_eq!(decode_line(b"ok\r\n"), "ok\r\n");
        assert_eq!(decode_line(&[0xff, b'o', b'k']), "\u{ff}ok");
        assert!(!decode_line(&[0xc3, b'o', b'k']).starts_with("ok"));
    }

    #[test]
    fn raw_streams_share_the_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut streams = RawStreams::open(file.path()).unwrap();
        streams.output.write_all(b"C").unwrap();
        let mut buf = String::new();
        streams.input.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "C");
    }
}
