//! PCSC Card Number Reader
//!
//! Reads the card number from ISO/IEC 14443 contactless cards through a
//! PC/SC reader: reader discovery, card polling, the SELECT / GET CARD
//! NUMBER exchange and response validation.

pub mod cli;
pub mod core;

// Re-export commonly used types
pub use crate::core::{
    apdu::{ApduCommand, ApduResponse, CardIdentifier, StatusWord, GET_CARD_NUMBER, SELECT},
    config::DriverConfig,
    driver::DriverHandle,
    error::{DriverError, DriverResult},
    poller::{DriverCommand, DriverEvent, Poller},
    reader::PcscTransport,
    session::{CardSession, SessionState, TickOutcome},
    transport::{CardTransport, ReaderHandle, ReaderList, ReaderRegistry},
};

// Common error type for the application boundary
pub type Result<T> = anyhow::Result<T>;
