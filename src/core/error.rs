use crate::core::apdu::StatusWord;

/// Every failure the driver can surface to the consumer boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// No PC/SC layer on this host
    #[error("PC/SC service unavailable")]
    ServiceUnavailable,

    /// Reader busy, removed, or not found
    #[error("Connection error: {0}")]
    Connection(String),

    /// I/O fault during an exchange; the reader handle is no longer usable
    #[error("Transport error: {0}")]
    Transport(String),

    /// SELECT answered with something other than 90 00
    #[error("Application not found (status {0}: {desc})", desc = .0.describe())]
    ApplicationNotFound(StatusWord),

    /// The card answered the number request without any payload
    #[error("Card returned an empty card number")]
    EmptyCardNumber,

    /// The card (or reader) answered with bytes that cannot be a card number
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl DriverError {
    /// Whether this error invalidates the current reader handle
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, DriverError::Transport(_))
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_a_fault() {
        assert!(DriverError::Transport("gone".to_string()).is_transport_fault());
        assert!(!DriverError::EmptyCardNumber.is_transport_fault());
        assert!(!DriverError::Connection("busy".to_string()).is_transport_fault());
        assert!(!DriverError::ApplicationNotFound(StatusWord::new(0x6A, 0x82)).is_transport_fault());
    }

    #[test]
    fn test_error_messages() {
        let err = DriverError::ApplicationNotFound(StatusWord::new(0x6A, 0x82));
        assert_eq!(
            err.to_string(),
            "Application not found (status 6A 82: Error: File not found)"
        );
        assert_eq!(
            DriverError::ServiceUnavailable.to_string(),
            "PC/SC service unavailable"
        );
    }
}
