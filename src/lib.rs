//! # pvdongle - Serial link for the PowerView RF dongle
//!
//! pvdongle drives the USB RF dongle (a Nordic based transceiver) that talks to
//! motorized PowerView shades over a proprietary byte protocol. It keeps one
//! serial connection alive, reconnects on its own, serializes commands over the
//! half-duplex wire, and publishes connection and traffic events.
//!
//! ## Features
//!
//! - **Command Catalogue**: every known movement, pairing, programming and motor command as exact wire bytes.
//! - **Self-healing Link**: a supervisor task reopens the port and repeats the identity handshake whenever the device goes away.
//! - **Retrying Writes**: each command gets one retry with a reconnect in between before it is reported as failed.
//! - **Event Stream**: any number of subscribers see state changes and raw traffic in order, without slowing the link down.
//! - **Async Design**: Built with Tokio; the serial handle is owned by a single task.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pvdongle::config::Config;
//! use pvdongle::dongle::{ConnectionState, Dongle, SerialTransport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("pvdongle.toml").await?;
//!     let transport = SerialTransport::new(&config.dongle.port, config.dongle.baud_rate);
//!     let dongle = Dongle::spawn_with(Box::new(transport), config.dongle.link_options());
//!
//!     dongle.wait_for_state(ConnectionState::Idle).await?;
//!     dongle.activate_scene(5).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`dongle`] - catalogue, codec, transport, state machine and the link task
//! - [`config`] - configuration file handling
//! - [`metrics`] - link counters
//! - [`logutil`] - readable rendering of raw bytes for logs

pub mod config;
pub mod dongle;
pub mod logutil;
pub mod metrics;
