//! # Dongle Link
//!
//! Everything needed to drive the PowerView RF dongle over its serial port:
//! the command catalogue and wire codec, the serial transport, the connection
//! state machine with its write/retry policy, and an event stream for
//! observers.
//!
//! ## Architecture
//!
//! A single link task owns the [`link::Link`] (and through it the serial
//! handle). Callers hold a cloneable [`Dongle`] handle and send requests to
//! the task over an unbounded channel; each request carries a oneshot for the
//! reply. The same task runs the supervisor tick, so a reconnect can never
//! interleave with a write and at most one write is on the wire at a time.
//!
//! ```text
//! Dongle ──request──► link task ──► Link ──► Transport ──► device
//!    ▲                                 │
//!    └──────── EventStream ◄── EventBus┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "serial")]
//! # {
//! use pvdongle::dongle::{ConnectionState, Dongle};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let dongle = Dongle::spawn("/dev/ttyACM0", 38400);
//!     let mut events = dongle.subscribe();
//!     dongle.wait_for_state(ConnectionState::Idle).await?;
//!     dongle.open().await?;
//!     while let Some(event) = events.try_recv() {
//!         println!("{}", event);
//!     }
//!     dongle.shutdown().await;
//!     Ok(())
//! }
//! # }
//! ```

pub mod catalogue;
pub mod codec;
#[cfg(feature = "serial")]
pub mod discovery;
pub mod error;
pub mod events;
pub mod link;
pub mod state;
pub mod transport;

pub use catalogue::Command;
pub use error::{CommandFailure, ConnectError, DongleError, NordicProblem, UnknownCommand};
pub use events::{Event, EventBus, EventStream};
pub use link::{Link, LinkOptions, LinkTiming};
pub use state::ConnectionState;
pub use transport::Transport;

#[cfg(feature = "serial")]
pub use transport::SerialTransport;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::metrics::{LinkMetrics, MetricsSnapshot};

enum Request {
    Write {
        command: Command,
        expected: Option<Vec<u8>>,
        reply: oneshot::Sender<Result<Vec<u8>, CommandFailure>>,
    },
    Connect(oneshot::Sender<Result<(), ConnectError>>),
    Disconnect(oneshot::Sender<()>),
    SetPort {
        port: String,
        reply: oneshot::Sender<()>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to a running link task.
#[derive(Clone, Debug)]
pub struct Dongle {
    tx: mpsc::UnboundedSender<Request>,
    events: EventBus,
    state_rx: watch::Receiver<ConnectionState>,
    metrics: LinkMetrics,
    options: LinkOptions,
}

impl Dongle {
    /// Start a link to the serial device at `port_name` with default options.
    #[cfg(feature = "serial")]
    pub fn spawn(port_name: &str, baud_rate: u32) -> Self {
        Self::spawn_with(
            Box::new(SerialTransport::new(port_name, baud_rate)),
            LinkOptions::default(),
        )
    }

    /// Start a link task over any transport. Must be called inside a tokio runtime.
    pub fn spawn_with(transport: Box<dyn Transport>, options: LinkOptions) -> Self {
        let events = EventBus::new();
        let metrics = LinkMetrics::new();
        let link = Link::new(transport, options.clone(), events.clone(), metrics.clone());
        let state_rx = link.watch_state();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_link(link, rx));
        Dongle {
            tx,
            events,
            state_rx,
            metrics,
            options,
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, DongleError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| DongleError::LinkClosed)?;
        rx.await.map_err(|_| DongleError::LinkClosed)
    }

    /// Send a catalogue command by name.
    pub async fn write(&self, name: &str) -> Result<(), DongleError> {
        let command = catalogue::lookup(name).map_err(|e| {
            error!("{} (not in the command catalogue)", e);
            e
        })?;
        self.write_command(command).await
    }

    pub async fn write_command(&self, command: Command) -> Result<(), DongleError> {
        self.exchange(command, None).await.map(|_| ())
    }

    /// Send `command` and require the dongle to answer with exactly `expected`.
    pub async fn write_expecting(
        &self,
        command: Command,
        expected: Vec<u8>,
    ) -> Result<Vec<u8>, DongleError> {
        self.exchange(command, Some(expected)).await
    }

    async fn exchange(
        &self,
        command: Command,
        expected: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, DongleError> {
        let outcome = self
            .request(|reply| Request::Write {
                command,
                expected,
                reply,
            })
            .await?;
        Ok(outcome?)
    }

    pub async fn open(&self) -> Result<(), DongleError> {
        self.write_command(catalogue::OPEN).await
    }

    pub async fn close(&self) -> Result<(), DongleError> {
        self.write_command(catalogue::CLOSE).await
    }

    pub async fn stop(&self) -> Result<(), DongleError> {
        self.write_command(catalogue::STOP).await
    }

    pub async fn jog(&self) -> Result<(), DongleError> {
        self.write_command(catalogue::JOG).await
    }

    pub async fn tilt_open(&self) -> Result<(), DongleError> {
        self.write_command(catalogue::TILT_OPEN).await
    }

    pub async fn tilt_close(&self) -> Result<(), DongleError> {
        self.write_command(catalogue::TILT_CLOSE).await
    }

    pub async fn activate_scene(&self, index: u8) -> Result<(), DongleError> {
        self.write_command(codec::build_scene_activation(index)).await
    }

    /// Pair a shade whose program button has been pressed: join it to the
    /// dongle's network, then to its group.
    pub async fn connect_new_shade(&self) -> Result<(), DongleError> {
        self.write_command(catalogue::NETWORK_ADD).await?;
        sleep(self.options.timing.pairing_gap).await;
        self.write_command(catalogue::GROUP_ADD).await
    }

    /// Connect now instead of waiting for the next supervisor tick. A no-op
    /// when a handshaken port is already open.
    pub async fn connect(&self) -> Result<(), DongleError> {
        Ok(self.request(Request::Connect).await??)
    }

    pub async fn disconnect(&self) -> Result<(), DongleError> {
        self.request(Request::Disconnect).await
    }

    /// Switch to a different serial device. The link reconnects on the next tick.
    pub async fn set_port(&self, port: &str) -> Result<(), DongleError> {
        let port = port.to_string();
        self.request(|reply| Request::SetPort { port, reply }).await
    }

    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Wait until the link reports `wanted`.
    pub async fn wait_for_state(&self, wanted: ConnectionState) -> Result<(), DongleError> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|s| *s == wanted)
            .await
            .map(|_| ())
            .map_err(|_| DongleError::LinkClosed)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn network_id(&self) -> u16 {
        self.options.network_id
    }

    /// Stop the link task and close the port. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.request(Request::Shutdown).await;
    }
}

async fn run_link(mut link: Link, mut rx: mpsc::UnboundedReceiver<Request>) {
    info!("Starting dongle link task on {}", link.port_name());
    let mut supervisor = interval(link.timing().supervisor_interval);
    supervisor.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut done: Option<oneshot::Sender<()>> = None;
    loop {
        tokio::select! {
            req = rx.recv() => match req {
                Some(Request::Write { command, expected, reply }) => {
                    let outcome = link.write(&command, expected.as_deref()).await;
                    if reply.send(outcome).is_err() {
                        debug!("caller went away before {} completed", command.name());
                    }
                }
                Some(Request::Connect(reply)) => {
                    let outcome = if link.needs_connect() {
                        link.connect().await
                    } else {
                        Ok(())
                    };
                    let _ = reply.send(outcome);
                }
                Some(Request::Disconnect(reply)) => {
                    link.disconnect();
                    let _ = reply.send(());
                }
                Some(Request::SetPort { port, reply }) => {
                    link.set_port(&port);
                    let _ = reply.send(());
                }
                Some(Request::Shutdown(reply)) => {
                    done = Some(reply);
                    break;
                }
                None => {
                    warn!("All dongle handles dropped, stopping link task");
                    break;
                }
            },
            _ = supervisor.tick() => link.supervise().await,
        }
    }

    link.disconnect();
    info!("Dongle link task shutting down");
    if let Some(done) = done {
        let _ = done.send(());
    }
}
