//! Test utilities & fixtures.
//! Provides a scripted in-memory transport standing in for the serial dongle.
#![allow(dead_code)] // each test binary uses a different subset

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use pvdongle::dongle::codec::{identity_response, identity_set, DEFAULT_NETWORK_ID};
use pvdongle::dongle::error::{ReadError, WriteError};
use pvdongle::dongle::{ConnectError, ConnectionState, Event, Transport};

/// Reply the fake dongle gives to commands without a scripted response.
pub const ACK: &[u8] = b"\x03ok";

#[derive(Debug, Default)]
pub struct MockState {
    /// Calls to `open`, successful or not.
    pub opens: u32,
    /// Number of upcoming `open` calls to reject.
    pub fail_opens: u32,
    pub open: bool,
    /// Simulates an unplugged device: handle held but liveness probe fails.
    pub dead: bool,
    /// Every buffer handed to `write_raw` while open, including failed ones.
    pub attempted: Vec<Vec<u8>>,
    /// Buffers that made it onto the wire.
    pub written: Vec<Vec<u8>>,
    /// Number of upcoming writes (of any bytes) to fail.
    pub fail_next_writes: u32,
    /// Writes of these exact bytes always fail.
    pub fail_bytes: HashSet<Vec<u8>>,
    /// Exact write -> response script.
    pub replies: HashMap<Vec<u8>, Vec<u8>>,
    /// Response for writes not found in `replies`; `None` means silence.
    pub default_reply: Option<Vec<u8>>,
    pub rx: Vec<u8>,
    pub retargets: Vec<String>,
}

#[derive(Clone)]
pub struct MockTransport {
    port_name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A dongle that accepts the default handshake and acks every command.
    pub fn new(port_name: &str) -> Self {
        let mock = MockTransport {
            port_name: port_name.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        };
        mock.reply(
            identity_set(DEFAULT_NETWORK_ID).bytes(),
            &identity_response(DEFAULT_NETWORK_ID),
        );
        mock.state().default_reply = Some(ACK.to_vec());
        mock
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn reply(&self, request: &[u8], response: &[u8]) {
        self.state()
            .replies
            .insert(request.to_vec(), response.to_vec());
    }

    pub fn boxed(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }

    /// Written buffers after the handshake(s), in order.
    pub fn commands_written(&self) -> Vec<Vec<u8>> {
        let handshake = identity_set(DEFAULT_NETWORK_ID).bytes().to_vec();
        self.state()
            .written
            .iter()
            .filter(|w| **w != handshake)
            .cloned()
            .collect()
    }

    pub fn attempts_of(&self, bytes: &[u8]) -> usize {
        self.state().attempted.iter().filter(|w| *w == bytes).count()
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), ConnectError> {
        let mut s = self.state();
        s.opens += 1;
        if s.fail_opens > 0 {
            s.fail_opens -= 1;
            return Err(ConnectError::Open {
                port: self.port_name.clone(),
                reason: "No such file or directory".into(),
            });
        }
        s.open = true;
        s.dead = false;
        s.rx.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    fn is_alive(&mut self) -> bool {
        let s = self.state();
        s.open && !s.dead
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        let mut s = self.state();
        if !s.open {
            return Err(WriteError::NotOpen);
        }
        s.attempted.push(bytes.to_vec());
        if s.fail_next_writes > 0 || s.fail_bytes.contains(bytes) {
            s.fail_next_writes = s.fail_next_writes.saturating_sub(1);
            return Err(WriteError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device went away",
            )));
        }
        s.written.push(bytes.to_vec());
        let response = s
            .replies
            .get(bytes)
            .cloned()
            .or_else(|| s.default_reply.clone());
        if let Some(response) = response {
            s.rx.extend_from_slice(&response);
        }
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>, ReadError> {
        let mut s = self.state();
        if !s.open {
            return Err(ReadError::NotOpen);
        }
        Ok(std::mem::take(&mut s.rx))
    }

    fn close(&mut self) {
        self.state().open = false;
    }

    fn retarget(&mut self, port_name: &str) {
        self.close();
        self.state().retargets.push(port_name.to_string());
        self.port_name = port_name.to_string();
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// State changes only, in order.
pub fn state_changes(events: &[Event]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::ConnectionStateChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}
