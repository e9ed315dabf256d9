//! Static command catalogue.
//!
//! Every logical action the dongle understands is a fixed byte string. The
//! first byte is always zero and the second is the length of the remainder.
//! These values are hard wired into the shade keypad firmware and must not
//! change.

use std::borrow::Cow;
use std::fmt;

use super::error::UnknownCommand;
use crate::logutil::byte_repr;

/// A named, immutable byte sequence sent to the dongle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: Cow<'static, str>,
    bytes: Cow<'static, [u8]>,
}

impl Command {
    pub(crate) const fn fixed(name: &'static str, bytes: &'static [u8]) -> Self {
        Command {
            name: Cow::Borrowed(name),
            bytes: Cow::Borrowed(bytes),
        }
    }

    /// Build a command at call time (scene activation, identity set, raw bytes).
    pub fn owned(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Command {
            name: Cow::Owned(name.into()),
            bytes: Cow::Owned(bytes),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, byte_repr(&self.bytes))
    }
}

pub const OPEN: Command = Command::fixed("open", b"\x00\x03RU\x00");
pub const CLOSE: Command = Command::fixed("close", b"\x00\x03RD\x00");
pub const TILT_OPEN: Command = Command::fixed("tilt-open", b"\x00\x03RR\x00");
pub const TILT_CLOSE: Command = Command::fixed("tilt-close", b"\x00\x03RL\x00");
pub const STOP: Command = Command::fixed("stop", b"\x00\x03RS\x00");
pub const JOG: Command = Command::fixed("jog", b"\x00\x03cj\x01");
pub const NETWORK_ADD: Command = Command::fixed("network-add", b"\x00\x01N");
pub const GROUP_ADD: Command = Command::fixed("group-add", b"\x00\x01A");
pub const RESET: Command = Command::fixed("reset", b"\x00\x03#@r");

/// Table order is the listing order used by `names()`.
static CATALOGUE: &[Command] = &[
    // movement
    OPEN,
    CLOSE,
    TILT_OPEN,
    TILT_CLOSE,
    STOP,
    JOG,
    // pairing
    Command::fixed("connect", b"\x00\x01N\x00\x01A"),
    NETWORK_ADD,
    GROUP_ADD,
    // maintenance
    RESET,
    Command::fixed("network-reset", b"\x00\x04@r?\x01"),
    Command::fixed("to-hub-id", b"\x00\x01z"),
    Command::fixed("reverse", b"\x00\x02#x"),
    // limit programming
    Command::fixed("start-program", b"\x00\x04#LPE"),
    Command::fixed("save-position-top", b"\x00\x04#LPO"),
    Command::fixed("save-position-bottom", b"\x00\x04#LPC"),
    Command::fixed("enable-slat", b"\x00\x04#LPr"),
    Command::fixed("save-slat-open", b"\x00\x04#LTO"),
    Command::fixed("save-venetian-slat", b"\x00\x04#LPR"),
    // motor types
    Command::fixed("m25s-pleated-free", b"\x00\x04#DS\x11"),
    Command::fixed("m25s-pleated-tensioned", b"\x00\x04#DSQ"),
    Command::fixed("m25s-duette-free", b"\x00\x04#DS\x06"),
    Command::fixed("m25s-duette-tensioned", b"\x00\x04#DSF"),
    Command::fixed("m25s-vvb-left-stack", b"\x00\x04#DS6"),
    Command::fixed("m25s-vvb-right-stack", b"\x00\x04#DS7"),
    Command::fixed("m25s-vvb-split-stack", b"\x00\x04#DS8"),
    Command::fixed("m25s-vvb-center-stack", b"\x00\x04#DS?"),
    Command::fixed("m25s-venetian-16mm", b"\x00\x04#DS>"),
    Command::fixed("m25s-venetian-25mm", b"\x00\x04#DS~"),
    Command::fixed("m25t-roller", b"\x00\x04#DS*"),
    Command::fixed("twist", b"\x00\x04#DS,"),
    // motor orientations
    Command::fixed("orient-vvb-left", b"\x00\x03#dR"),
    Command::fixed("orient-vvb-right", b"\x00\x03#dL"),
    Command::fixed("orient-vvb-center", b"\x00\x03#dC"),
    Command::fixed("orient-vvb-upright-left", b"\x00\x03#d\xB6"),
    Command::fixed("orient-vvb-upright-right", b"\x00\x03#d\xB0"),
    Command::fixed("orient-vvb-upright-center", b"\x00\x03#d\xA7"),
    // backroller orientations also apply to M25S venetian motors
    Command::fixed("orient-backroller-left", b"\x00\x03#dL"),
    Command::fixed("orient-backroller-right", b"\x00\x03#dR"),
    Command::fixed("orient-m25s-duette-left", b"\x00\x03#dR"),
    Command::fixed("orient-m25s-duette-right", b"\x00\x03#dL"),
];

/// Look up a catalogue command by name.
///
/// Names are matched case-insensitively and `_` is accepted in place of `-`.
/// A miss means the caller was built against a name that does not exist.
pub fn lookup(name: &str) -> Result<Command, UnknownCommand> {
    let wanted = name.trim().to_ascii_lowercase().replace('_', "-");
    CATALOGUE
        .iter()
        .find(|c| c.name() == wanted)
        .cloned()
        .ok_or_else(|| UnknownCommand(name.to_string()))
}

/// All catalogue entries, in table order.
pub fn all() -> &'static [Command] {
    CATALOGUE
}

pub fn names() -> impl Iterator<Item = &'static str> {
    CATALOGUE.iter().map(|c| c.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn movement_bytes_match_hardware() {
        assert_eq!(lookup("open").unwrap().bytes(), &[0x00, 0x03, 0x52, 0x55, 0x00]);
        assert_eq!(lookup("close").unwrap().bytes(), &[0x00, 0x03, 0x52, 0x44, 0x00]);
        assert_eq!(lookup("stop").unwrap().bytes(), &[0x00, 0x03, 0x52, 0x53, 0x00]);
        assert_eq!(lookup("jog").unwrap().bytes(), &[0x00, 0x03, 0x63, 0x6A, 0x01]);
        assert_eq!(lookup("network-add").unwrap().bytes(), &[0x00, 0x01, 0x4E]);
        assert_eq!(lookup("group-add").unwrap().bytes(), &[0x00, 0x01, 0x41]);
    }

    #[test]
    fn lookup_is_forgiving_about_case_and_separator() {
        assert_eq!(lookup("Tilt_Open").unwrap(), TILT_OPEN);
        assert_eq!(lookup(" stop ").unwrap(), STOP);
    }

    #[test]
    fn unknown_name_is_reported() {
        let err = lookup("levitate").unwrap_err();
        assert_eq!(err.0, "levitate");
    }

    #[test]
    fn names_are_unique_and_length_prefixed() {
        let mut seen = HashSet::new();
        for cmd in all() {
            assert!(seen.insert(cmd.name()), "duplicate name {}", cmd.name());
            let bytes = cmd.bytes();
            assert_eq!(bytes[0], 0x00, "{}", cmd.name());
            if cmd.name() != "connect" {
                assert_eq!(bytes[1] as usize, bytes.len() - 2, "{}", cmd.name());
            }
        }
        assert_eq!(names().count(), all().len());
    }
}
