mod cancel;
pub mod config;
mod error;
mod handshake;
mod sender;
mod transport;
mod transport_serial;
pub mod upload;

pub use crate::cancel::CancelToken;
pub use crate::error::{exit_code, UploadError, EXIT_CANCELLED, EXIT_FAILURE};
pub use crate::handshake::{acquire, HandshakePolicy};
pub use crate::sender::{ExternalSender, Transfer, TransferOutcome, TransferRequest};
pub use crate::transport::{Console, Device, RawStreams};
pub use crate::transport_serial::{device_path, SerialDevice, SerialSpecs};
pub use crate::upload::{FlashVerify, UploadOutcome, UploadSpecs};
