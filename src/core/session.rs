use crate::core::apdu::{interpret_card_number, request_card_number, select_application, CardIdentifier};
use crate::core::error::{DriverError, DriverResult};
use crate::core::transport::{CardTransport, ReaderHandle};
use std::fmt;

/// Where the session stands between ticks
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Reader open, no card selected
    Connected,
    /// SELECT succeeded on the card in the field
    CardSelected,
    /// The last cycle failed at application level; the next tick retries
    Error(DriverError),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("Disconnected"),
            SessionState::Connected => f.write_str("Connected"),
            SessionState::CardSelected => f.write_str("Card selected"),
            SessionState::Error(e) => write!(f, "Error: {e}"),
        }
    }
}

/// What one cycle observed when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No reader session; nothing was attempted
    Disconnected,
    /// Reader open but no card in the field
    NoCard,
    /// A card number was read
    Read(CardIdentifier),
}

/// Card session state machine.
///
/// Owns the transport, the current [`ReaderHandle`] and the [`SessionState`].
/// Application-level failures leave the reader open; a transport fault closes
/// it and drops back to `Disconnected`.
pub struct CardSession<T: CardTransport> {
    transport: T,
    handle: Option<ReaderHandle>,
    reader_name: Option<String>,
    state: SessionState,
}

impl<T: CardTransport> CardSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            handle: None,
            reader_name: None,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn reader_name(&self) -> Option<&str> {
        self.reader_name.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Open the named reader; an already open reader is closed first
    pub fn connect(&mut self, reader_name: &str) -> DriverResult<()> {
        if self.handle.is_some() {
            self.disconnect();
        }

        let handle = self.transport.open(reader_name)?;
        self.handle = Some(handle);
        self.reader_name = Some(reader_name.to_string());
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Close the reader; safe to call in any state
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.transport.close(handle);
        }
        self.reader_name = None;
        self.state = SessionState::Disconnected;
    }

    /// Check for a card without touching it
    pub fn probe(&mut self) -> DriverResult<bool> {
        let Some(handle) = self.handle else {
            return Ok(false);
        };
        self.transport
            .is_card_present(handle)
            .map_err(|e| self.fail(e))
    }

    /// One full cycle: detect card, SELECT, request number, extract
    pub fn tick(&mut self) -> DriverResult<TickOutcome> {
        let Some(handle) = self.handle else {
            return Ok(TickOutcome::Disconnected);
        };

        let present = self
            .transport
            .is_card_present(handle)
            .map_err(|e| self.fail(e))?;
        if !present {
            self.state = SessionState::Connected;
            return Ok(TickOutcome::NoCard);
        }

        select_application(&mut self.transport, handle).map_err(|e| self.fail(e))?;
        self.state = SessionState::CardSelected;

        let identifier = request_card_number(&mut self.transport, handle)
            .and_then(interpret_card_number)
            .map_err(|e| self.fail(e))?;

        log::info!("Read card number {identifier}");
        self.state = SessionState::Connected;
        Ok(TickOutcome::Read(identifier))
    }

    /// A manual read outside the poll timer; fails when no reader is open
    pub fn read_once(&mut self) -> DriverResult<Option<CardIdentifier>> {
        if self.handle.is_none() {
            return Err(DriverError::Connection("Not connected to a reader".to_string()));
        }

        match self.tick()? {
            TickOutcome::Read(identifier) => Ok(Some(identifier)),
            TickOutcome::NoCard | TickOutcome::Disconnected => Ok(None),
        }
    }

    /// Record a failure in the state, hard-resetting on transport faults
    fn fail(&mut self, err: DriverError) -> DriverError {
        if err.is_transport_fault() {
            log::error!("Transport fault, closing reader: {err}");
            self.disconnect();
        } else {
            log::warn!("Card read failed: {err}");
            self.state = SessionState::Error(err.clone());
        }
        err
    }
}

impl<T: CardTransport> Drop for CardSession<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
