//! Command execution with acknowledgement checking
//!
//! Each command frame is answered by a one-byte acknowledgement. After the
//! acknowledgement the executor polls the status query until the machine
//! reports the motion finished. A wrong acknowledgement is retransmitted a
//! bounded number of times; transport failures are returned immediately so
//! the translator can restart the session.

use super::frame::{
    to_hex, verify_frame, DeviceCommand, ACK_ACCEPTED, DONE_MARKER, STATUS_RESPONSE_LEN,
};
use super::session::DeviceSession;
use deskcnc_core::{ConnectionError, ConnectionState, ProtocolError, Result};
use std::time::Duration;

/// Sends device commands over a [`DeviceSession`]
#[derive(Debug)]
pub struct CommandExecutor {
    session: DeviceSession,
    max_retries: u32,
    ready_poll: Duration,
}

impl CommandExecutor {
    /// Retransmissions after a wrong acknowledgement
    pub const DEFAULT_MAX_RETRIES: u32 = 2;

    /// Create an executor around a session
    pub fn new(session: DeviceSession) -> Self {
        Self {
            session,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            ready_poll: Duration::from_millis(1),
        }
    }

    /// Set the retransmission limit
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the sleep between ready polls
    pub fn with_ready_poll(mut self, ready_poll: Duration) -> Self {
        self.ready_poll = ready_poll;
        self
    }

    /// Underlying session
    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Underlying session, mutably
    pub fn session_mut(&mut self) -> &mut DeviceSession {
        &mut self.session
    }

    /// Query whether the last motion has completed
    ///
    /// An empty status response means the link is dead.
    pub fn is_machine_ready(&mut self) -> Result<bool> {
        self.session.write_all(&DeviceCommand::StatusQuery.frame())?;
        let response = self.session.read_up_to(STATUS_RESPONSE_LEN)?;
        tracing::trace!("Status: {}", to_hex(&response));
        match response.last() {
            Some(&last) => Ok(last == DONE_MARKER),
            None => Err(ConnectionError::DeviceNotResponding.into()),
        }
    }

    /// Send a command and block until the machine is idle again
    pub fn execute(&mut self, command: &DeviceCommand) -> Result<()> {
        let frame = command.frame();
        debug_assert!(verify_frame(&frame), "bad checksum in {}", to_hex(&frame));
        let attempts = self.max_retries.saturating_add(1);
        let mut last_ack = Vec::new();

        for attempt in 1..=attempts {
            self.session.set_state(ConnectionState::Executing);
            let ack = match self.transmit(&frame) {
                Ok(ack) => ack,
                Err(e) => {
                    if e.is_connection_error() {
                        self.session.set_state(ConnectionState::Faulted);
                    }
                    return Err(e);
                }
            };
            self.session.set_state(ConnectionState::Ready);

            if ack == [ACK_ACCEPTED] {
                return Ok(());
            }
            tracing::warn!(
                attempt,
                "Unexpected response {:?}, expected {:#04x}",
                to_hex(&ack),
                ACK_ACCEPTED
            );
            last_ack = ack;
        }

        Err(ProtocolError::UnexpectedResponse {
            expected: ACK_ACCEPTED,
            actual: to_hex(&last_ack),
            attempts,
        }
        .into())
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        self.session.write_all(frame)?;
        tracing::debug!("Sent: {}", to_hex(frame));

        let ack = self.session.read_up_to(1)?;
        tracing::debug!("Response: {}", to_hex(&ack));

        while !self.is_machine_ready()? {
            std::thread::sleep(self.ready_poll);
        }
        Ok(ack)
    }
}
