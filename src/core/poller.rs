use crate::core::apdu::CardIdentifier;
use crate::core::config::DriverConfig;
use crate::core::error::DriverError;
use crate::core::session::{CardSession, TickOutcome};
use crate::core::transport::{CardTransport, ReaderRegistry};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Requests from the consumer boundary to the polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    /// Open a reader by name, or the first listed reader
    Connect(Option<String>),
    Disconnect,
    /// Run one cycle now, outside the timer
    ReadOnce,
    Shutdown,
}

/// Everything the polling loop reports back, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Connected { reader: String },
    Disconnected,
    CardRead(CardIdentifier),
    /// A manual read found nothing on the reader
    CardAbsent,
    Failed(DriverError),
}

impl DriverEvent {
    /// Project onto the card-or-error view, dropping lifecycle notifications
    pub fn into_result(self) -> Option<Result<CardIdentifier, DriverError>> {
        match self {
            DriverEvent::CardRead(identifier) => Some(Ok(identifier)),
            DriverEvent::Failed(err) => Some(Err(err)),
            _ => None,
        }
    }
}

/// Suppresses repeat reports while a card stays on the reader.
///
/// Once a card has been reported nothing else is reported until the
/// reader has been seen empty at least once. A failing card is reported
/// once per distinct error; the same error again stays quiet until the
/// card is removed or the outcome changes.
#[derive(Debug, Default)]
pub struct Debouncer {
    reported: Option<CardIdentifier>,
    failed: Option<DriverError>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a card has been reported and not yet seen removed
    pub fn is_holding(&self) -> bool {
        self.reported.is_some()
    }

    pub fn last_reported(&self) -> Option<&CardIdentifier> {
        self.reported.as_ref()
    }

    /// Returns true when this read should reach the consumer
    pub fn admit(&mut self, identifier: &CardIdentifier) -> bool {
        if self.reported.is_some() {
            return false;
        }
        self.failed = None;
        self.reported = Some(identifier.clone());
        true
    }

    /// Returns true when this failure differs from the last one reported
    pub fn admit_error(&mut self, err: &DriverError) -> bool {
        if self.failed.as_ref() == Some(err) {
            log::debug!("Suppressing repeated failure: {err}");
            return false;
        }
        self.failed = Some(err.clone());
        true
    }

    /// The reader was observed empty
    pub fn card_removed(&mut self) {
        if let Some(previous) = self.reported.take() {
            log::debug!("Card {previous} removed");
        }
        self.failed = None;
    }

    pub fn reset(&mut self) {
        self.reported = None;
        self.failed = None;
    }
}

/// Polling loop: drives the session on a timer and debounces what it reads
pub struct Poller<T: CardTransport + ReaderRegistry> {
    session: CardSession<T>,
    debouncer: Debouncer,
    config: DriverConfig,
}

impl<T: CardTransport + ReaderRegistry> Poller<T> {
    pub fn new(transport: T, config: DriverConfig) -> Self {
        Self {
            session: CardSession::new(transport),
            debouncer: Debouncer::new(),
            config,
        }
    }

    pub fn session(&self) -> &CardSession<T> {
        &self.session
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Connect with retries; `None` picks the first reader the registry lists
    pub fn connect(&mut self, reader_name: Option<&str>) -> Result<String, DriverError> {
        let listing = self.session.transport().list_readers();
        if !listing.service_available {
            log::error!("PC/SC service unavailable");
            return Err(DriverError::ServiceUnavailable);
        }

        let reader = match reader_name {
            Some(name) => name.to_string(),
            None => listing
                .readers
                .first()
                .cloned()
                .ok_or_else(|| DriverError::Connection("No readers available".to_string()))?,
        };

        self.debouncer.reset();
        let attempts = self.config.connect_attempts.max(1);
        let mut last_err = DriverError::Connection(format!("Failed to connect to reader: {reader}"));

        for attempt in 1..=attempts {
            match self.session.connect(&reader) {
                Ok(()) => return Ok(reader),
                Err(e) => {
                    log::warn!("Connect attempt {attempt}/{attempts} to {reader} failed: {e}");
                    last_err = e;
                    if attempt < attempts {
                        thread::sleep(self.config.retry_delay());
                    }
                }
            }
        }

        Err(last_err)
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
        self.debouncer.reset();
    }

    /// One debounced tick; `None` means nothing is worth reporting
    pub fn poll_once(&mut self) -> Option<Result<CardIdentifier, DriverError>> {
        if !self.session.is_connected() {
            return None;
        }

        // While a reported card stays put only watch for its removal
        if self.debouncer.is_holding() {
            return match self.session.probe() {
                Ok(true) => None,
                Ok(false) => {
                    self.debouncer.card_removed();
                    None
                }
                Err(e) => {
                    self.debouncer.reset();
                    Some(Err(e))
                }
            };
        }

        match self.session.tick() {
            Ok(TickOutcome::Read(identifier)) => {
                if self.debouncer.admit(&identifier) {
                    Some(Ok(identifier))
                } else {
                    None
                }
            }
            Ok(TickOutcome::NoCard) => {
                self.debouncer.card_removed();
                None
            }
            Ok(TickOutcome::Disconnected) => None,
            Err(e) => {
                if !self.session.is_connected() {
                    self.debouncer.reset();
                    Some(Err(e))
                } else if self.debouncer.admit_error(&e) {
                    Some(Err(e))
                } else {
                    None
                }
            }
        }
    }

    /// A manual read; always reported, and marks the card so the timer does not repeat it
    pub fn read_once(&mut self) -> DriverEvent {
        match self.session.read_once() {
            Ok(Some(identifier)) => {
                self.debouncer.reset();
                self.debouncer.admit(&identifier);
                DriverEvent::CardRead(identifier)
            }
            Ok(None) => {
                self.debouncer.card_removed();
                DriverEvent::CardAbsent
            }
            Err(e) => DriverEvent::Failed(e),
        }
    }

    /// Run until `Shutdown` arrives or the command channel closes.
    ///
    /// Ticks fire every `interval` while a reader is open. Commands are
    /// handled between ticks, so a disconnect requested mid-tick takes
    /// effect as soon as that tick returns. Ticks that fall due while a
    /// slow cycle is still running are skipped, not queued.
    pub fn run<F>(&mut self, interval: Duration, commands: &Receiver<DriverCommand>, mut on_event: F)
    where
        F: FnMut(DriverEvent),
    {
        let mut next_tick = Instant::now() + interval;

        loop {
            let wait = next_tick.saturating_duration_since(Instant::now());
            match commands.recv_timeout(wait) {
                Ok(DriverCommand::Connect(reader)) => {
                    let was_connected = self.session.is_connected();
                    match self.connect(reader.as_deref()) {
                        Ok(reader) => {
                            on_event(DriverEvent::Connected { reader });
                            next_tick = Instant::now() + interval;
                        }
                        Err(e) => {
                            on_event(DriverEvent::Failed(e));
                            if was_connected && !self.session.is_connected() {
                                on_event(DriverEvent::Disconnected);
                            }
                        }
                    }
                }
                Ok(DriverCommand::Disconnect) => {
                    self.disconnect();
                    on_event(DriverEvent::Disconnected);
                }
                Ok(DriverCommand::ReadOnce) => {
                    let was_connected = self.session.is_connected();
                    on_event(self.read_once());
                    if was_connected && !self.session.is_connected() {
                        on_event(DriverEvent::Disconnected);
                    }
                }
                Ok(DriverCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    let was_connected = self.session.is_connected();
                    match self.poll_once() {
                        Some(Ok(identifier)) => on_event(DriverEvent::CardRead(identifier)),
                        Some(Err(e)) => on_event(DriverEvent::Failed(e)),
                        None => {}
                    }
                    if was_connected && !self.session.is_connected() {
                        on_event(DriverEvent::Disconnected);
                    }

                    next_tick += interval;
                    let now = Instant::now();
                    if next_tick <= now {
                        next_tick = now + interval;
                    }
                }
            }
        }

        if self.session.is_connected() {
            self.disconnect();
            on_event(DriverEvent::Disconnected);
        }
        log::debug!("Polling loop stopped");
    }
}
