//! Session state for one flashing run
//!
//! `SessionState` is the single mutable aggregate threaded through the
//! orchestrator's transitions. It is reset at the start of each discovery
//! cycle and never persisted.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use crate::resolver::FirmwareArtifact;

/// Flash dispatch transport. Exactly one is active per dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Transport {
    Can,
    Usb,
    Dfu,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Can => write!(f, "CAN"),
            Transport::Usb => write!(f, "USB"),
            Transport::Dfu => write!(f, "DFU"),
        }
    }
}

/// How a discovered device presented itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Bus device answering with a bootloader role (CanBoot or Katapult)
    CanBootloader,
    /// Bus device still running its application firmware; needs bootloader
    /// entry before it may be flashed
    CanApplication,
    /// Serial device already enumerated under its bootloader name
    UsbBootloader,
    /// USB device in DFU negotiation mode
    UsbDfu,
}

impl TransportKind {
    pub fn transport(self) -> Transport {
        match self {
            TransportKind::CanBootloader | TransportKind::CanApplication => Transport::Can,
            TransportKind::UsbBootloader => Transport::Usb,
            TransportKind::UsbDfu => Transport::Dfu,
        }
    }

    /// Application-mode bus devices are never flash candidates; they must
    /// first be re-observed in bootloader mode.
    pub fn is_flashable(self) -> bool {
        !matches!(self, TransportKind::CanApplication)
    }
}

/// One discovered device. Identity is transport + identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub kind: TransportKind,
    /// Bus UUID for CAN devices, device path for USB, bus address for DFU
    pub identifier: String,
    pub discovered_at: SystemTime,
}

impl DeviceRecord {
    pub fn new(kind: TransportKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            discovered_at: SystemTime::now(),
        }
    }
}

/// Session outcome, reported to the caller after cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    #[default]
    Pending,
    Success,
    Failed,
}

/// Mutable aggregate for one run, owned exclusively by the orchestrator
#[derive(Debug, Default)]
pub struct SessionState {
    devices: BTreeMap<Transport, DeviceRecord>,
    active: Option<Transport>,
    pub resolved_uuid: Option<String>,
    pub selected_artifact: Option<FirmwareArtifact>,
    pub precondition_passed: bool,
    pub skew_acknowledged: bool,
    flashed: bool,
    pub outcome: Outcome,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset at the start of a discovery cycle
    pub fn reset(&mut self) {
        *self = Self {
            precondition_passed: self.precondition_passed,
            ..Self::default()
        };
    }

    /// Record a discovered device. At most one record per transport; a
    /// re-probe replaces the earlier record.
    pub fn record_device(&mut self, record: DeviceRecord) {
        self.devices.insert(record.kind.transport(), record);
    }

    pub fn device(&self, transport: Transport) -> Option<&DeviceRecord> {
        self.devices.get(&transport)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    /// Transports that currently hold a flashable candidate. Application-mode
    /// bus devices are excluded here by construction.
    pub fn flashable_transports(&self) -> Vec<Transport> {
        self.devices
            .values()
            .filter(|d| d.kind.is_flashable())
            .map(|d| d.kind.transport())
            .collect()
    }

    /// Mark a transport as the active one for dispatch. Refused when the
    /// transport has no record or its record is not in bootloader mode.
    pub fn set_active(&mut self, transport: Transport) -> bool {
        match self.devices.get(&transport) {
            Some(record) if record.kind.is_flashable() => {
                self.active = Some(transport);
                true
            }
            _ => false,
        }
    }

    pub fn active_device(&self) -> Option<&DeviceRecord> {
        self.active.and_then(|t| self.devices.get(&t))
    }

    /// One-shot dispatch latch: returns true exactly once per session, so at
    /// most one flash procedure runs even when several transports hold a
    /// candidate.
    pub fn try_latch_flash(&mut self) -> bool {
        if self.flashed {
            return false;
        }
        self.flashed = true;
        true
    }

    pub fn has_flashed(&self) -> bool {
        self.flashed
    }
}
