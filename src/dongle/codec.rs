//! Wire codec for the dongle's parameterized commands.
//!
//! The dongle protocol carries 16-bit identifiers as two big-endian bytes.
//! Composite commands are a fixed prefix followed by encoded parameter bytes.

use super::catalogue::Command;

/// Network id the PowerView app presents when none is configured.
pub const DEFAULT_NETWORK_ID: u16 = 17520;

const SCENE_ACTIVATE_PREFIX: &[u8] = b"\x00\x03SG";
const IDENTITY_SET_PREFIX: &[u8] = b"\x00\x03i";
const IDENTITY_RESPONSE_PREFIX: &[u8] = b"\x03i";

/// Encode a 16-bit id into its big-endian wire form.
pub fn encode_id(id: u16) -> [u8; 2] {
    id.to_be_bytes()
}

/// Decode the big-endian wire form produced by [`encode_id`].
pub fn decode_id(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// Build the command that activates a stored scene.
///
/// Scene indices are the raw byte the hardware uses for addressing, so every
/// value in `0..=255` is passed through unchanged.
pub fn build_scene_activation(index: u8) -> Command {
    let mut bytes = Vec::with_capacity(SCENE_ACTIVATE_PREFIX.len() + 1);
    bytes.extend_from_slice(SCENE_ACTIVATE_PREFIX);
    bytes.push(index);
    Command::owned(format!("scene-{}", index), bytes)
}

/// Identity-set command sent right after the port opens.
pub fn identity_set(network_id: u16) -> Command {
    let mut bytes = IDENTITY_SET_PREFIX.to_vec();
    bytes.extend_from_slice(&encode_id(network_id));
    Command::owned("identity-set", bytes)
}

/// Bytes the dongle echoes back once it has accepted [`identity_set`].
pub fn identity_response(network_id: u16) -> Vec<u8> {
    let mut bytes = IDENTITY_RESPONSE_PREFIX.to_vec();
    bytes.extend_from_slice(&encode_id(network_id));
    bytes
}
