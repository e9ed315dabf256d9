//! Serial transport: the only code that touches the physical device.
//!
//! [`Transport`] is the seam between the link state machine and the device so
//! the state machine can be driven by a scripted double in tests. The real
//! implementation, [`SerialTransport`], is available with the `serial` feature.

use log::{debug, trace, warn};
use std::time::Duration;
use tokio::time::sleep;

use super::error::{ConnectError, ReadError, WriteError};
use crate::logutil::hex_snippet;

/// Baud rate the dongle firmware ships with.
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Serial IO timeout. Writes block up to this long for the tty to drain;
/// reads never wait because they only take what `bytes_to_read` reports.
pub const IO_TIMEOUT: Duration = Duration::from_millis(500);

/// Exclusive owner of one serial handle.
pub trait Transport: Send {
    /// Open the device. Does not retry.
    fn open(&mut self) -> Result<(), ConnectError>;

    /// Whether a handle is currently held.
    fn is_open(&self) -> bool;

    /// Liveness probe used by the supervisor. A dead handle reports `false`.
    fn is_alive(&mut self) -> bool {
        self.is_open()
    }

    /// One blocking write of the whole buffer.
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), WriteError>;

    /// One non-blocking read of whatever is buffered; may be empty.
    fn read_available(&mut self) -> Result<Vec<u8>, ReadError>;

    /// Release the handle. Safe to call when already closed.
    fn close(&mut self);

    /// Close the current handle and point at a different device path.
    fn retarget(&mut self, port_name: &str);

    fn port_name(&self) -> &str;
}

/// Poll `port` for a response.
///
/// Sleeps `poll_delay` before each of up to `max_polls` reads. The first
/// non-empty read is followed by one more `poll_delay` and a drain read so a
/// response delivered in fragments comes back whole. Returns `None` when
/// nothing arrived, when the handle closes mid-poll, or on a read error.
pub async fn read_poll(
    port: &mut dyn Transport,
    max_polls: u32,
    poll_delay: Duration,
) -> Option<Vec<u8>> {
    for poll in 1..=max_polls {
        sleep(poll_delay).await;
        if !port.is_open() {
            debug!("read poll aborted: {} closed", port.port_name());
            return None;
        }
        let mut buf = match port.read_available() {
            Ok(buf) => buf,
            Err(e) => {
                warn!("read poll on {} failed: {}", port.port_name(), e);
                return None;
            }
        };
        if buf.is_empty() {
            trace!("poll {}/{}: nothing yet", poll, max_polls);
            continue;
        }
        sleep(poll_delay).await;
        if port.is_open() {
            match port.read_available() {
                Ok(tail) => buf.extend_from_slice(&tail),
                Err(e) => debug!("drain read after response failed: {}", e),
            }
        }
        trace!("poll {}/{}: {}", poll, max_polls, hex_snippet(&buf, 32));
        return Some(buf);
    }
    None
}

#[cfg(feature = "serial")]
pub use self::serial::SerialTransport;

#[cfg(feature = "serial")]
mod serial {
    use super::*;
    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::{ErrorKind, Read, Write};

    /// [`Transport`] backed by a real serial port.
    pub struct SerialTransport {
        port_name: String,
        baud_rate: u32,
        handle: Option<Box<dyn SerialPort>>,
    }

    impl SerialTransport {
        pub fn new(port_name: &str, baud_rate: u32) -> Self {
            SerialTransport {
                port_name: port_name.to_string(),
                baud_rate,
                handle: None,
            }
        }
    }

    impl Transport for SerialTransport {
        fn open(&mut self) -> Result<(), ConnectError> {
            // A previous handle is replaced, never reopened in place.
            self.close();
            debug!(
                "Opening serial port {} at {} baud",
                self.port_name, self.baud_rate
            );
            let port = serialport::new(&self.port_name, self.baud_rate)
                .timeout(IO_TIMEOUT)
                .data_bits(DataBits::Eight)
                .stop_bits(StopBits::One)
                .parity(Parity::None)
                .flow_control(FlowControl::None)
                .open()
                .map_err(|e| ConnectError::Open {
                    port: self.port_name.clone(),
                    reason: e.to_string(),
                })?;
            self.handle = Some(port);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.handle.is_some()
        }

        fn is_alive(&mut self) -> bool {
            match self.handle.as_ref() {
                Some(port) => match port.bytes_to_read() {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Serial port {} stopped responding: {}", self.port_name, e);
                        false
                    }
                },
                None => false,
            }
        }

        fn write_raw(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
            let port = self.handle.as_mut().ok_or(WriteError::NotOpen)?;
            port.write_all(bytes)?;
            port.flush()?;
            Ok(())
        }

        fn read_available(&mut self) -> Result<Vec<u8>, ReadError> {
            let port = self.handle.as_mut().ok_or(ReadError::NotOpen)?;
            let pending = port
                .bytes_to_read()
                .map_err(|e| ReadError::Io(std::io::Error::new(ErrorKind::Other, e)))?;
            if pending == 0 {
                return Ok(Vec::new());
            }
            let mut buf = vec![0u8; pending as usize];
            match port.read(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    Ok(buf)
                }
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    Ok(Vec::new())
                }
                Err(e) => Err(ReadError::Io(e)),
            }
        }

        fn close(&mut self) {
            if let Some(mut port) = self.handle.take() {
                // the device may already be gone; nothing to surface here
                if let Err(e) = port.flush() {
                    debug!("Ignoring error while closing {}: {}", self.port_name, e);
                }
                debug!("Closed serial port {}", self.port_name);
            }
        }

        fn retarget(&mut self, port_name: &str) {
            self.close();
            self.port_name = port_name.to_string();
        }

        fn port_name(&self) -> &str {
            &self.port_name
        }
    }

    impl Drop for SerialTransport {
        fn drop(&mut self) {
            self.close();
        }
    }
}
