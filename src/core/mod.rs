pub mod apdu;
pub mod config;
pub mod driver;
pub mod error;
pub mod history;
pub mod poller;
pub mod reader;
pub mod session;
pub mod transport;
pub mod utils;
