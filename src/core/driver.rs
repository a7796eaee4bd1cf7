use crate::core::config::DriverConfig;
use crate::core::poller::{DriverCommand, DriverEvent, Poller};
use crate::core::transport::{CardTransport, ReaderRegistry};
use anyhow::{Context as AnyhowContext, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Consumer-side handle to a polling loop running on its own thread.
///
/// The loop owns the session outright; this handle only sends commands and
/// receives events, in the order the loop produced them.
pub struct DriverHandle {
    commands: Sender<DriverCommand>,
    events: Receiver<DriverEvent>,
    worker: Option<JoinHandle<()>>,
}

impl DriverHandle {
    /// Start the polling thread around `transport`
    pub fn spawn<T>(transport: T, config: DriverConfig) -> Result<Self>
    where
        T: CardTransport + ReaderRegistry + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let interval = config.poll_interval();

        let worker = thread::Builder::new()
            .name("card-poller".to_string())
            .spawn(move || {
                let mut poller = Poller::new(transport, config);
                poller.run(interval, &command_rx, |event| {
                    // Receiver only goes away during shutdown
                    let _ = event_tx.send(event);
                });
            })
            .context("Failed to spawn card polling thread")?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            worker: Some(worker),
        })
    }

    pub fn connect(&self, reader_name: Option<&str>) {
        self.send(DriverCommand::Connect(reader_name.map(str::to_string)));
    }

    /// Stop polling after the current tick and close the reader
    pub fn disconnect(&self) {
        self.send(DriverCommand::Disconnect);
    }

    pub fn read_once(&self) {
        self.send(DriverCommand::ReadOnce);
    }

    /// Next event, waiting at most `timeout`
    pub fn next_event(&self, timeout: Duration) -> Option<DriverEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Block for the next event; `None` once the loop has stopped
    pub fn recv(&self) -> Option<DriverEvent> {
        self.events.recv().ok()
    }

    pub fn events(&self) -> &Receiver<DriverEvent> {
        &self.events
    }

    /// Stop the loop, close the reader and join the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, command: DriverCommand) {
        if self.commands.send(command).is_err() {
            log::warn!("Card polling thread is no longer running");
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.commands.send(DriverCommand::Shutdown);
            if worker.join().is_err() {
                log::error!("Card polling thread panicked");
            }
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
