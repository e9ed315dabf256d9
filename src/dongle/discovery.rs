//! Locate dongles among the host's serial ports by USB vendor/product id.

use anyhow::{anyhow, Result};
use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDongle {
    pub vid: u16,
    pub pid: u16,
    pub name: &'static str,
}

pub const KNOWN_DONGLES: &[KnownDongle] = &[
    KnownDongle {
        vid: 1027,
        pid: 24597,
        name: "Bremerhaven dongle",
    },
    KnownDongle {
        vid: 4966,
        pid: 4117,
        name: "Nordic dongle",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedPort {
    pub device: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    /// Name of the matching known dongle, if any.
    pub dongle: Option<&'static str>,
}

pub fn identify(vid: u16, pid: u16) -> Option<&'static KnownDongle> {
    KNOWN_DONGLES.iter().find(|d| d.vid == vid && d.pid == pid)
}

fn classify(device: String, usb_ids: Option<(u16, u16)>) -> DetectedPort {
    DetectedPort {
        device,
        vid: usb_ids.map(|(vid, _)| vid),
        pid: usb_ids.map(|(_, pid)| pid),
        dongle: usb_ids.and_then(|(vid, pid)| identify(vid, pid)).map(|d| d.name),
    }
}

fn usb_ids(info: &SerialPortInfo) -> Option<(u16, u16)> {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => Some((usb.vid, usb.pid)),
        _ => None,
    }
}

/// Every serial port on the host, with known dongles marked.
pub fn list_ports() -> Result<Vec<DetectedPort>> {
    let ports =
        serialport::available_ports().map_err(|e| anyhow!("Failed to enumerate serial ports: {}", e))?;
    Ok(ports
        .into_iter()
        .map(|info| {
            let ids = usb_ids(&info);
            classify(info.port_name, ids)
        })
        .collect())
}

/// Only the ports that look like a dongle.
pub fn find_dongles() -> Result<Vec<DetectedPort>> {
    let found: Vec<_> = list_ports()?
        .into_iter()
        .filter(|p| p.dongle.is_some())
        .collect();
    for port in &found {
        log::info!(
            "Serial port found. vid: {:?} pid: {:?} name: {}",
            port.vid,
            port.pid,
            port.device
        );
    }
    Ok(found)
}
