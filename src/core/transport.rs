use crate::core::apdu::{ApduCommand, ApduResponse};
use crate::core::error::DriverResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token for an open reader session.
///
/// Issued by a [`CardTransport`] from `open` and meaningless once closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderHandle(u64);

impl ReaderHandle {
    /// Mint a handle; only transport implementations should call this
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Capability to talk to one reader at a time.
///
/// Calls block for the length of one exchange. Callers must serialize
/// access to a handle; the session state machine is the only caller.
pub trait CardTransport {
    /// Open a session with the named reader
    fn open(&mut self, reader_name: &str) -> DriverResult<ReaderHandle>;

    /// Release the session; closing an unknown or closed handle does nothing
    fn close(&mut self, handle: ReaderHandle);

    /// Whether a card is currently in the field
    fn is_card_present(&mut self, handle: ReaderHandle) -> DriverResult<bool>;

    /// Exchange one command APDU for its response
    fn transmit(&mut self, handle: ReaderHandle, command: &ApduCommand) -> DriverResult<ApduResponse>;
}

/// Reader names exposed by the host, plus whether the host service answered at all
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderList {
    pub readers: Vec<String>,
    pub service_available: bool,
}

impl ReaderList {
    pub fn available(readers: Vec<String>) -> Self {
        Self {
            readers,
            service_available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            readers: Vec::new(),
            service_available: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

/// Enumeration of readers; never fails, a missing service shows up in [`ReaderList`]
pub trait ReaderRegistry {
    fn list_readers(&self) -> ReaderList;
}

/// Platform-specific advice for installing the PC/SC layer
pub fn service_hint() -> &'static str {
    match std::env::consts::OS {
        "macos" => "Install the PC/SC library: brew install pcsc-lite",
        "linux" => "Install and start the PC/SC daemon: sudo apt-get install pcscd libpcsclite-dev",
        "windows" => "Make sure the Smart Card service (SCardSvr) is running",
        _ => "Install a PC/SC driver for this platform",
    }
}
