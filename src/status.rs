//! System status tracking.
//!
//! The acquisition loop reports health two ways. Steady-state outcomes are
//! queued: repeated updates within one reporting window coalesce and only
//! the latest value is published at the window boundary, so a tight loop
//! never floods the indicator. Faults bypass the queue through
//! [`StatusSubsystem::set`] and reach the indicator immediately. The
//! indicator is only notified when the published value actually changes.

use serde::Serialize;
use std::fmt;
use tracing::info;

/// Coarse health of the acquisition system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    /// Not running; the state after shutdown.
    Off,
    /// Drivers are being brought up.
    Initializing,
    /// Acquisition and fusion proceeding on schedule.
    Normal,
    /// Inbound command traffic being handled.
    Receiving,
    /// A contained error occurred; the loop keeps running.
    SoftFault,
    /// An unrecoverable error; the loop is stopping.
    HardFault,
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SystemStatus::Off => "off",
            SystemStatus::Initializing => "initializing",
            SystemStatus::Normal => "normal",
            SystemStatus::Receiving => "receiving",
            SystemStatus::SoftFault => "soft_fault",
            SystemStatus::HardFault => "hard_fault",
        };
        f.write_str(name)
    }
}

/// Sink notified whenever the published status changes.
pub trait StatusIndicator: Send {
    /// Called with the newly published value.
    fn indicate(&mut self, status: SystemStatus);
}

/// Indicator that reports transitions to the log.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl StatusIndicator for LogIndicator {
    fn indicate(&mut self, status: SystemStatus) {
        info!(status = %status, "system status changed");
    }
}

/// Current and pending status plus the indicator they feed.
pub struct StatusSubsystem {
    current: SystemStatus,
    pending: SystemStatus,
    indicator: Box<dyn StatusIndicator>,
}

impl StatusSubsystem {
    /// Start in [`SystemStatus::Off`] with nothing pending.
    pub fn new(indicator: Box<dyn StatusIndicator>) -> Self {
        Self {
            current: SystemStatus::Off,
            pending: SystemStatus::Off,
            indicator,
        }
    }

    /// Last published value.
    pub fn current(&self) -> SystemStatus {
        self.current
    }

    /// Record `status` for the next [`publish`]. Later calls in the same
    /// window overwrite earlier ones.
    ///
    /// [`publish`]: StatusSubsystem::publish
    pub fn queue(&mut self, status: SystemStatus) {
        self.pending = status;
    }

    /// Promote the pending value, notifying the indicator if it differs
    /// from the current one.
    pub fn publish(&mut self) {
        let pending = self.pending;
        self.apply(pending);
    }

    /// Publish `status` immediately, skipping the queue. The pending value
    /// is replaced too, so a stale queued status cannot undo a fault at
    /// the next window.
    pub fn set(&mut self, status: SystemStatus) {
        self.pending = status;
        self.apply(status);
    }

    fn apply(&mut self, status: SystemStatus) {
        if status != self.current {
            self.current = status;
            self.indicator.indicate(status);
        }
    }
}
