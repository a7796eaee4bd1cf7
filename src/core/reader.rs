use crate::core::apdu::{ApduCommand, ApduResponse};
use crate::core::error::{DriverError, DriverResult};
use crate::core::transport::{CardTransport, ReaderHandle, ReaderList, ReaderRegistry};
use crate::core::utils::format_hex_spaced;
use pcsc::{Card, Context, Disposition, Protocols, ReaderState, Scope, ShareMode, State, MAX_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::time::Duration;

/// Snapshot of a reader for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderInfo {
    pub name: String,
    pub card_present: bool,
    pub atr: Option<Vec<u8>>,
}

/// The reader currently opened through [`PcscTransport`]
struct OpenReader {
    handle: ReaderHandle,
    name: String,
    cname: CString,
    card: Option<Card>,
}

/// PC/SC binding of [`CardTransport`] and [`ReaderRegistry`]
pub struct PcscTransport {
    context: Option<Context>,
    session: Option<OpenReader>,
    next_handle: u64,
}

impl PcscTransport {
    /// Establish a PC/SC context; a missing service is remembered, not returned
    pub fn new() -> Self {
        let context = match Context::establish(Scope::User) {
            Ok(context) => Some(context),
            Err(e) => {
                log::warn!("Failed to establish PCSC context: {e}");
                None
            }
        };

        Self {
            context,
            session: None,
            next_handle: 1,
        }
    }

    pub fn is_service_available(&self) -> bool {
        self.context.is_some()
    }

    /// List readers along with whether a card sits on each
    pub fn reader_infos(&self) -> Vec<ReaderInfo> {
        let Some(context) = self.context.as_ref() else {
            return Vec::new();
        };

        self.list_readers()
            .readers
            .into_iter()
            .map(|name| {
                let state = CString::new(name.as_str())
                    .ok()
                    .and_then(|cname| query_state(context, &cname).ok());
                match state {
                    Some((state, atr)) if state.contains(State::PRESENT) => ReaderInfo {
                        name,
                        card_present: true,
                        atr: Some(atr),
                    },
                    _ => ReaderInfo {
                        name,
                        card_present: false,
                        atr: None,
                    },
                }
            })
            .collect()
    }
}

impl Default for PcscTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn query_state(context: &Context, cname: &CString) -> Result<(State, Vec<u8>), pcsc::Error> {
    let mut states = [ReaderState::new(cname.clone(), State::UNAWARE)];
    context.get_status_change(Duration::ZERO, &mut states)?;
    Ok((states[0].event_state(), states[0].atr().to_vec()))
}

fn reader_gone(state: State) -> bool {
    state.contains(State::UNKNOWN) || state.contains(State::UNAVAILABLE)
}

fn transport_error(reader: &str, err: pcsc::Error) -> DriverError {
    DriverError::Transport(format!("{reader}: {err}"))
}

fn release_card(card: Card) {
    let _ = card
        .disconnect(Disposition::LeaveCard)
        .map_err(|(_, e)| log::warn!("Failed to disconnect cleanly from card: {e}"));
}

/// Card-level errors that just mean "nothing usable in the field right now"
fn is_no_card(err: pcsc::Error) -> bool {
    matches!(
        err,
        pcsc::Error::NoSmartcard
            | pcsc::Error::RemovedCard
            | pcsc::Error::ResetCard
            | pcsc::Error::UnresponsiveCard
            | pcsc::Error::UnpoweredCard
    )
}

impl CardTransport for PcscTransport {
    fn open(&mut self, reader_name: &str) -> DriverResult<ReaderHandle> {
        log::info!("Connecting to reader: {reader_name}");

        let context = self
            .context
            .as_ref()
            .ok_or_else(|| DriverError::Connection("PC/SC service is not running".to_string()))?;
        let cname = CString::new(reader_name)
            .map_err(|_| DriverError::Connection(format!("Invalid reader name: '{reader_name}'")))?;

        let (state, _) = query_state(context, &cname)
            .map_err(|e| DriverError::Connection(format!("Failed to connect to reader {reader_name}: {e}")))?;
        if reader_gone(state) {
            return Err(DriverError::Connection(format!("Reader not available: {reader_name}")));
        }

        // Claim the card now if one is already there so a busy reader fails here
        let card = if state.contains(State::PRESENT) {
            match context.connect(&cname, ShareMode::Shared, Protocols::ANY) {
                Ok(card) => Some(card),
                Err(pcsc::Error::SharingViolation) => {
                    return Err(DriverError::Connection(format!("Reader busy: {reader_name}")));
                }
                Err(e) if is_no_card(e) => None,
                Err(e) => {
                    return Err(DriverError::Connection(format!(
                        "Failed to connect to reader {reader_name}: {e}"
                    )));
                }
            }
        } else {
            None
        };

        if let Some(previous) = self.session.take() {
            log::warn!("Replacing open session on {}", previous.name);
            if let Some(card) = previous.card {
                release_card(card);
            }
        }

        let handle = ReaderHandle::new(self.next_handle);
        self.next_handle += 1;
        self.session = Some(OpenReader {
            handle,
            name: reader_name.to_string(),
            cname,
            card,
        });

        log::info!("Successfully connected to reader: {reader_name}");
        Ok(handle)
    }

    fn close(&mut self, handle: ReaderHandle) {
        match self.session.take() {
            Some(session) if session.handle == handle => {
                if let Some(card) = session.card {
                    release_card(card);
                }
                log::info!("Disconnected from reader: {}", session.name);
            }
            other => self.session = other,
        }
    }

    fn is_card_present(&mut self, handle: ReaderHandle) -> DriverResult<bool> {
        let session = match self.session.as_mut() {
            Some(session) if session.handle == handle => session,
            _ => return Err(DriverError::Transport(format!("Reader handle {handle} is not open"))),
        };
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| DriverError::Transport("PC/SC context lost".to_string()))?;

        let state = match query_state(context, &session.cname) {
            Ok((state, _)) => state,
            Err(pcsc::Error::Timeout) => return Ok(session.card.is_some()),
            Err(e) => return Err(transport_error(&session.name, e)),
        };

        if reader_gone(state) {
            return Err(DriverError::Transport(format!(
                "Reader no longer available: {}",
                session.name
            )));
        }

        if !state.contains(State::PRESENT) || state.contains(State::MUTE) {
            if let Some(card) = session.card.take() {
                log::debug!("Card left reader {}", session.name);
                release_card(card);
            }
            return Ok(false);
        }

        // A card swapped between polls leaves a stale handle behind
        if let Some(card) = session.card.as_ref() {
            if let Err(e) = card.status2_owned() {
                if !is_no_card(e) {
                    return Err(transport_error(&session.name, e));
                }
                if let Some(card) = session.card.take() {
                    release_card(card);
                }
            }
        }

        if session.card.is_none() {
            match context.connect(&session.cname, ShareMode::Shared, Protocols::ANY) {
                Ok(card) => session.card = Some(card),
                Err(e) if is_no_card(e) => return Ok(false),
                Err(e) => return Err(transport_error(&session.name, e)),
            }
        }

        Ok(true)
    }

    fn transmit(&mut self, handle: ReaderHandle, command: &ApduCommand) -> DriverResult<ApduResponse> {
        let session = match self.session.as_mut() {
            Some(session) if session.handle == handle => session,
            _ => return Err(DriverError::Transport(format!("Reader handle {handle} is not open"))),
        };
        let card = session
            .card
            .as_ref()
            .ok_or_else(|| DriverError::Transport(format!("No card connected on {}", session.name)))?;

        let mut response_buf = [0; MAX_BUFFER_SIZE];
        match card.transmit(command.as_bytes(), &mut response_buf) {
            Ok(response) => {
                log::debug!("Received response: {}", format_hex_spaced(response));
                ApduResponse::from_bytes(response.to_vec())
            }
            Err(e) => {
                log::error!("Transmit of {} failed: {e}", command.name());
                if matches!(e, pcsc::Error::RemovedCard | pcsc::Error::ResetCard) {
                    session.card = None;
                }
                Err(transport_error(&session.name, e))
            }
        }
    }
}

impl ReaderRegistry for PcscTransport {
    fn list_readers(&self) -> ReaderList {
        let Some(context) = self.context.as_ref() else {
            return ReaderList::unavailable();
        };

        let mut readers_buf = vec![0; 2048];
        match context.list_readers(&mut readers_buf) {
            Ok(names) => ReaderList::available(
                names.map(|name| name.to_string_lossy().to_string()).collect(),
            ),
            Err(pcsc::Error::NoReadersAvailable) => ReaderList::available(Vec::new()),
            Err(pcsc::Error::NoService) | Err(pcsc::Error::ServiceStopped) => {
                log::warn!("PCSC service stopped while listing readers");
                ReaderList::unavailable()
            }
            Err(e) => {
                log::warn!("Failed to list readers: {e}");
                ReaderList::available(Vec::new())
            }
        }
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Some(card) = session.card {
                release_card(card);
            }
        }
    }
}
