//! Connection state machine and write transaction.
//!
//! [`Link`] owns the transport exclusively. Nothing here is shared: the link
//! task in [`super`] holds the only `Link`, which is what keeps writes and
//! supervisor reconnects from ever overlapping.

use log::{debug, error, info, warn};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;

use super::catalogue::Command;
use super::codec::{identity_response, identity_set, DEFAULT_NETWORK_ID};
use super::error::{CommandFailure, ConnectError, NordicProblem};
use super::events::{Event, EventBus};
use super::state::{step, ConnectionState, Trigger};
use super::transport::{read_poll, Transport};
use crate::logutil::byte_repr;
use crate::metrics::LinkMetrics;

/// Total attempts per command: the first try plus one retry.
pub const MAX_WRITE_ATTEMPTS: u32 = 2;

/// Delays dictated by the dongle's response latency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTiming {
    /// Reads per response before giving up.
    pub poll_count: u32,
    /// Sleep before each read, and before the trailing drain read.
    pub poll_delay: Duration,
    /// Quiet time after every exchange before the next write may start.
    pub settle_delay: Duration,
    /// Wait between opening the port and sending the handshake.
    pub open_settle: Duration,
    /// Supervisor liveness check period.
    pub supervisor_interval: Duration,
    /// Retry backoff unit, multiplied by the attempt number.
    pub retry_backoff: Duration,
    /// Gap between network-add and group-add when pairing a shade.
    pub pairing_gap: Duration,
}

impl Default for LinkTiming {
    fn default() -> Self {
        LinkTiming {
            poll_count: 10,
            poll_delay: Duration::from_millis(100),
            settle_delay: Duration::from_millis(400),
            open_settle: Duration::from_secs(1),
            supervisor_interval: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(1),
            pairing_gap: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOptions {
    pub network_id: u16,
    pub timing: LinkTiming,
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions {
            network_id: DEFAULT_NETWORK_ID,
            timing: LinkTiming::default(),
        }
    }
}

/// Bookkeeping for the one transaction in flight.
#[derive(Debug)]
struct WriteAttempt<'a> {
    command: &'a Command,
    count: u32,
    started: Instant,
}

impl<'a> WriteAttempt<'a> {
    fn new(command: &'a Command) -> Self {
        WriteAttempt {
            command,
            count: 0,
            started: Instant::now(),
        }
    }
}

pub struct Link {
    transport: Box<dyn Transport>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    events: EventBus,
    metrics: LinkMetrics,
    network_id: u16,
    timing: LinkTiming,
}

impl Link {
    pub fn new(
        transport: Box<dyn Transport>,
        options: LinkOptions,
        events: EventBus,
        metrics: LinkMetrics,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Link {
            transport,
            state: ConnectionState::Disconnected,
            state_tx,
            events,
            metrics,
            network_id: options.network_id,
            timing: options.timing,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn timing(&self) -> &LinkTiming {
        &self.timing
    }

    pub fn port_name(&self) -> &str {
        self.transport.port_name()
    }

    fn apply(&mut self, trigger: Trigger) {
        let step = step(self.state, trigger);
        self.state = step.next;
        if let Some(event) = step.event {
            debug!("link state -> {}", step.next);
            self.state_tx.send_replace(step.next);
            self.events.publish(event);
        }
    }

    /// Open the port and run the identity handshake.
    ///
    /// On failure the handle is closed and the state left Disconnected; the
    /// supervisor tries again on its next tick.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        self.metrics.inc_connect_attempts();
        info!(
            "Connecting to dongle on {} (network id {})",
            self.transport.port_name(),
            self.network_id
        );
        if let Err(e) = self.transport.open() {
            warn!("Problem connecting: {}", e);
            self.apply(Trigger::ConnectFailed);
            return Err(e);
        }
        sleep(self.timing.open_settle).await;

        match self.handshake().await {
            Ok(()) => {
                self.metrics.inc_connects();
                self.apply(Trigger::Connected);
                info!("Connected to dongle on {}", self.transport.port_name());
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_handshake_failures();
                warn!("Problem connecting: {}", e);
                self.transport.close();
                self.apply(Trigger::ConnectFailed);
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), ConnectError> {
        let command = identity_set(self.network_id);
        let expected = identity_response(self.network_id);
        match self.exchange(command.bytes(), Some(&expected)).await {
            Ok(_) => Ok(()),
            Err(NordicProblem::Read { expected, got }) => {
                Err(ConnectError::Handshake { expected, got })
            }
            Err(NordicProblem::Connection(reason)) => Err(ConnectError::Unresponsive {
                port: self.transport.port_name().to_string(),
                reason,
            }),
        }
    }

    /// Close the port. Safe to call repeatedly; only the first call publishes.
    pub fn disconnect(&mut self) {
        self.transport.close();
        if self.state != ConnectionState::Disconnected {
            info!("Disconnected from {}", self.transport.port_name());
        }
        self.apply(Trigger::Disconnected);
    }

    /// Whether the link has no usable handle: Disconnected, or Idle after a
    /// give-up closed the port.
    pub fn needs_connect(&self) -> bool {
        self.state == ConnectionState::Disconnected || !self.transport.is_open()
    }

    /// Periodic liveness check: reconnect when the link is down.
    pub async fn supervise(&mut self) {
        let needs_connect = match self.state {
            ConnectionState::Writing => false,
            _ => self.needs_connect() || !self.transport.is_alive(),
        };
        if needs_connect {
            debug!("supervisor: link down in state {}, reconnecting", self.state);
            // failures are logged inside connect; next tick retries
            let _ = self.connect().await;
        }
    }

    /// Point the link at a different device. The old handle is closed, never reused.
    pub fn set_port(&mut self, port_name: &str) {
        self.disconnect();
        info!(
            "Serial port changed from {} to {}",
            self.transport.port_name(),
            port_name
        );
        self.transport.retarget(port_name);
    }

    /// Run one command to completion with the retry policy.
    ///
    /// When `expected` is given, any other response counts as a failure.
    pub async fn write(
        &mut self,
        command: &Command,
        expected: Option<&[u8]>,
    ) -> Result<Vec<u8>, CommandFailure> {
        if self.needs_connect() {
            // one attempt; if it fails the transaction below reports it
            let _ = self.connect().await;
        }

        let mut attempt = WriteAttempt::new(command);
        loop {
            attempt.count += 1;
            self.apply(Trigger::BeginWrite);
            debug!(
                "Writing {} (attempt {}/{})",
                attempt.command, attempt.count, MAX_WRITE_ATTEMPTS
            );

            let problem = match self.exchange(command.bytes(), expected).await {
                Ok(response) => {
                    self.metrics.inc_commands_sent();
                    self.apply(Trigger::EndWrite);
                    debug!(
                        "{} done in {:?} after {} attempt(s)",
                        command.name(),
                        attempt.started.elapsed(),
                        attempt.count
                    );
                    return Ok(response);
                }
                Err(problem) => problem,
            };

            warn!(
                "Writing {} failed on attempt {}: {}",
                command.name(),
                attempt.count,
                problem
            );
            self.disconnect();

            if attempt.count < MAX_WRITE_ATTEMPTS {
                self.metrics.inc_retries();
                sleep(self.timing.retry_backoff * attempt.count).await;
                // a failed reconnect surfaces as a missing handle on the retry
                let _ = self.connect().await;
                continue;
            }

            self.metrics.inc_commands_failed();
            self.apply(Trigger::EndWrite);
            error!(
                "Giving up on {} after {} attempts ({:?})",
                command.name(),
                attempt.count,
                attempt.started.elapsed()
            );
            return Err(CommandFailure {
                command: command.name().to_string(),
                attempts: attempt.count,
                last: problem,
            });
        }
    }

    /// One write + read-back exchange, no retries.
    async fn exchange(
        &mut self,
        bytes: &[u8],
        expected: Option<&[u8]>,
    ) -> Result<Vec<u8>, NordicProblem> {
        self.transport.write_raw(bytes)?;
        self.metrics.add_bytes_out(bytes.len());
        debug!("Writing data to dongle: {}", byte_repr(bytes));
        self.events.publish(Event::OutgoingBytes(bytes.to_vec()));

        let response = read_poll(
            self.transport.as_mut(),
            self.timing.poll_count,
            self.timing.poll_delay,
        )
        .await;
        sleep(self.timing.settle_delay).await;

        let response = response.ok_or_else(|| {
            NordicProblem::Connection(format!(
                "no response within {} polls",
                self.timing.poll_count
            ))
        })?;
        debug!("Serial response: {}", byte_repr(&response));
        if let Some(expected) = expected {
            if response != expected {
                return Err(NordicProblem::Read {
                    expected: expected.to_vec(),
                    got: response,
                });
            }
        }
        self.metrics.add_bytes_in(response.len());
        self.events.publish(Event::IncomingBytes(response.clone()));
        Ok(response)
    }
}
