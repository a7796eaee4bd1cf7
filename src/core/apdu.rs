use crate::core::error::{DriverError, DriverResult};
use crate::core::transport::{CardTransport, ReaderHandle};
use crate::core::utils::{describe_status_word, format_hex, format_hex_spaced};
use std::fmt;

/// Longest card number payload accepted before the response is treated as garbage
pub const MAX_CARD_NUMBER_LEN: usize = 16;

/// Select the card-number application
pub const SELECT: ApduCommand = ApduCommand::new("SELECT", &[0x00, 0xA4, 0x00, 0x00, 0x02, 0x42, 0x00]);

/// Request the card number from the selected application
pub const GET_CARD_NUMBER: ApduCommand = ApduCommand::new("GET_CARD_NUMBER", &[0x90, 0x4C, 0x00, 0x00, 0x04]);

/// A fixed command APDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApduCommand {
    name: &'static str,
    bytes: &'static [u8],
}

impl ApduCommand {
    pub const fn new(name: &'static str, bytes: &'static [u8]) -> Self {
        Self { name, bytes }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.bytes
    }
}

/// SW1/SW2 trailer of a response APDU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    pub sw1: u8,
    pub sw2: u8,
}

impl StatusWord {
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);

    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    /// Human-readable meaning per ISO 7816-4
    pub fn describe(&self) -> String {
        describe_status_word(self.sw1, self.sw2)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X}", self.sw1, self.sw2)
    }
}

/// Raw response: payload followed by a two-byte status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    bytes: Vec<u8>,
}

impl ApduResponse {
    /// Wrap raw response bytes, rejecting anything too short to carry a status word
    pub fn from_bytes(bytes: Vec<u8>) -> DriverResult<Self> {
        if bytes.len() < 2 {
            return Err(DriverError::MalformedResponse(format!(
                "response too short for a status word: '{}'",
                format_hex_spaced(&bytes)
            )));
        }
        Ok(Self { bytes })
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 2]
    }

    pub fn status_word(&self) -> StatusWord {
        let len = self.bytes.len();
        StatusWord::new(self.bytes[len - 2], self.bytes[len - 1])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Opaque card number bytes as returned by the card
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardIdentifier(Vec<u8>);

impl CardIdentifier {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Uppercase hex rendering handed to consumers
    pub fn to_hex(&self) -> String {
        format_hex(&self.0)
    }
}

impl fmt::Display for CardIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Send SELECT and require a 90 00 answer
pub fn select_application<T>(transport: &mut T, handle: ReaderHandle) -> DriverResult<()>
where
    T: CardTransport + ?Sized,
{
    log::debug!("Transmitting {}: {}", SELECT.name(), format_hex_spaced(SELECT.as_bytes()));
    let response = transport.transmit(handle, &SELECT)?;
    let sw = response.status_word();

    if sw.is_success() {
        log::debug!("Application selected ({})", format_hex_spaced(response.payload()));
        Ok(())
    } else {
        log::warn!("SELECT failed with status {} ({})", sw, sw.describe());
        Err(DriverError::ApplicationNotFound(sw))
    }
}

/// Send GET_CARD_NUMBER and return the raw response; the caller decides what the status word means
pub fn request_card_number<T>(transport: &mut T, handle: ReaderHandle) -> DriverResult<ApduResponse>
where
    T: CardTransport + ?Sized,
{
    log::debug!(
        "Transmitting {}: {}",
        GET_CARD_NUMBER.name(),
        format_hex_spaced(GET_CARD_NUMBER.as_bytes())
    );
    let response = transport.transmit(handle, &GET_CARD_NUMBER)?;
    log::debug!("Card number response: {}", format_hex_spaced(response.as_bytes()));
    Ok(response)
}

/// Strip the status word and take the payload verbatim as the card number
pub fn extract_identifier(response: ApduResponse) -> DriverResult<CardIdentifier> {
    let payload_len = response.payload().len();

    if payload_len == 0 {
        return Err(DriverError::EmptyCardNumber);
    }
    if payload_len > MAX_CARD_NUMBER_LEN {
        return Err(DriverError::MalformedResponse(format!(
            "card number of {payload_len} bytes exceeds {MAX_CARD_NUMBER_LEN}"
        )));
    }

    let mut bytes = response.bytes;
    bytes.truncate(payload_len);
    Ok(CardIdentifier(bytes))
}

/// Apply the status-word policy for GET_CARD_NUMBER, then extract.
///
/// `90 00` and `91 00` carry a card number. Warning classes `62 xx` and
/// `63 xx` mean the card answered but had nothing to give. Anything else is
/// reported as a malformed answer.
pub fn interpret_card_number(response: ApduResponse) -> DriverResult<CardIdentifier> {
    let sw = response.status_word();
    match (sw.sw1, sw.sw2) {
        (0x90, 0x00) | (0x91, 0x00) => extract_identifier(response),
        (0x62, _) | (0x63, _) => {
            log::warn!("Card number request returned warning {} ({})", sw, sw.describe());
            Err(DriverError::EmptyCardNumber)
        }
        _ => Err(DriverError::MalformedResponse(format!(
            "card number request rejected with status {} ({})",
            sw,
            sw.describe()
        ))),
    }
}
