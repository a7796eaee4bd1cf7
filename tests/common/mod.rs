//! Scripted in-memory reader shared by the integration tests
#![allow(dead_code)]

use pcsc_cardnum::core::{
    apdu::{ApduCommand, ApduResponse, GET_CARD_NUMBER, SELECT},
    error::{DriverError, DriverResult},
    transport::{CardTransport, ReaderHandle, ReaderList, ReaderRegistry},
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

pub const READER: &str = "Mock Reader 1";
pub const SEVEN_BYTE_UID: [u8; 7] = [0x04, 0xA2, 0x3B, 0x91, 0x5C, 0x70, 0x80];

/// What the fake reader and card do; tests tweak it while the driver runs
#[derive(Debug)]
pub struct Bench {
    pub service_available: bool,
    pub readers: Vec<String>,
    pub busy: bool,
    /// Card number payload of the card in the field
    pub card: Option<Vec<u8>>,
    pub select_sw: [u8; 2],
    pub number_sw: [u8; 2],
    pub fault_on_transmit: bool,
    pub fault_on_presence: bool,
    pub transmit_delay: Duration,
    pub open_handles: HashSet<u64>,
    pub open_attempts: usize,
    pub closes: usize,
    pub presence_checks: usize,
    pub sent: Vec<Vec<u8>>,
}

impl Default for Bench {
    fn default() -> Self {
        Self {
            service_available: true,
            readers: vec![READER.to_string(), "Mock Reader 2".to_string()],
            busy: false,
            card: None,
            select_sw: [0x90, 0x00],
            number_sw: [0x90, 0x00],
            fault_on_transmit: false,
            fault_on_presence: false,
            transmit_delay: Duration::ZERO,
            open_handles: HashSet::new(),
            open_attempts: 0,
            closes: 0,
            presence_checks: 0,
            sent: Vec::new(),
        }
    }
}

impl Bench {
    pub fn selects_sent(&self) -> usize {
        self.sent.iter().filter(|c| c.as_slice() == SELECT.as_bytes()).count()
    }
}

#[derive(Clone, Default)]
pub struct ScriptedTransport {
    bench: Arc<Mutex<Bench>>,
    next_handle: Arc<Mutex<u64>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_card(card: &[u8]) -> Self {
        let transport = Self::new();
        transport.bench().card = Some(card.to_vec());
        transport
    }

    pub fn bench(&self) -> MutexGuard<'_, Bench> {
        self.bench.lock().unwrap()
    }

    fn check_open(&self, handle: ReaderHandle) -> DriverResult<()> {
        if self.bench().open_handles.contains(&handle.id()) {
            Ok(())
        } else {
            Err(DriverError::Transport(format!("handle {handle} not open")))
        }
    }
}

impl CardTransport for ScriptedTransport {
    fn open(&mut self, reader_name: &str) -> DriverResult<ReaderHandle> {
        let mut bench = self.bench();
        bench.open_attempts += 1;

        if !bench.service_available {
            return Err(DriverError::Connection("service down".to_string()));
        }
        if bench.busy {
            return Err(DriverError::Connection(format!("Reader busy: {reader_name}")));
        }
        if !bench.readers.iter().any(|r| r == reader_name) {
            return Err(DriverError::Connection(format!("Reader not found: {reader_name}")));
        }

        let mut next = self.next_handle.lock().unwrap();
        *next += 1;
        bench.open_handles.insert(*next);
        Ok(ReaderHandle::new(*next))
    }

    fn close(&mut self, handle: ReaderHandle) {
        let mut bench = self.bench();
        if bench.open_handles.remove(&handle.id()) {
            bench.closes += 1;
        }
    }

    fn is_card_present(&mut self, handle: ReaderHandle) -> DriverResult<bool> {
        self.check_open(handle)?;
        let mut bench = self.bench();
        bench.presence_checks += 1;
        if bench.fault_on_presence {
            return Err(DriverError::Transport("reader unplugged".to_string()));
        }
        Ok(bench.card.is_some())
    }

    fn transmit(&mut self, handle: ReaderHandle, command: &ApduCommand) -> DriverResult<ApduResponse> {
        self.check_open(handle)?;

        let delay = {
            let mut bench = self.bench();
            bench.sent.push(command.as_bytes().to_vec());
            bench.transmit_delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let bench = self.bench();
        if bench.fault_on_transmit {
            return Err(DriverError::Transport("Card was removed".to_string()));
        }
        let Some(card) = bench.card.as_ref() else {
            return Err(DriverError::Transport("no card in field".to_string()));
        };

        if command.as_bytes() == SELECT.as_bytes() {
            ApduResponse::from_bytes(bench.select_sw.to_vec())
        } else if command.as_bytes() == GET_CARD_NUMBER.as_bytes() {
            let mut response = card.clone();
            response.extend_from_slice(&bench.number_sw);
            ApduResponse::from_bytes(response)
        } else {
            ApduResponse::from_bytes(vec![0x6D, 0x00])
        }
    }
}

impl ReaderRegistry for ScriptedTransport {
    fn list_readers(&self) -> ReaderList {
        let bench = self.bench();
        if bench.service_available {
            ReaderList::available(bench.readers.clone())
        } else {
            ReaderList::unavailable()
        }
    }
}
