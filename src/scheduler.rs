//! Drift-compensated acquisition scheduler.
//!
//! The loop fires on a fixed deadline grid anchored when it starts:
//! deadline k sits at `origin + k * period` regardless of how long any
//! individual cycle took, so timing error never accumulates. A cycle that
//! overruns its slot delays the next firing but does not shift the grid;
//! when an overrun swallows whole slots, those deadlines are skipped and
//! counted rather than fired late in a burst.
//!
//! Each firing runs one fixed sequence: acquire from every installed
//! sensor, condition, snapshot a telemetry frame, fuse, update status,
//! service the control endpoint. Sensor errors are contained as a soft
//! fault; the loop only stops when the process shuts it down.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::control::{ControlCommand, ControlPort, TelemetryFrame};
use crate::device::SensorDriver;
use crate::error::SensorResult;
use crate::fusion::FusionStage;
use crate::sample::SampleBank;
use crate::status::{StatusIndicator, StatusSubsystem, SystemStatus};

/// Firings between queued-status publishes.
const STATUS_UPDATE_PERIOD: u32 = 4;

/// Deadline grid for the acquisition loop.
///
/// Deadlines are exact multiples of the period from the origin. Arming
/// always lands strictly in the future, so a long overrun skips the grid
/// instants it already passed instead of firing them back to back.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    origin: Instant,
    period: Duration,
    armed: Instant,
    fired: u64,
    skipped: u64,
}

impl Cadence {
    /// Anchor a grid at `origin`; the first deadline is one period later.
    pub fn starting_at(origin: Instant, period: Duration) -> Self {
        Self {
            origin,
            period,
            armed: origin + period,
            fired: 0,
            skipped: 0,
        }
    }

    /// Next instant the loop should fire.
    pub fn deadline(&self) -> Instant {
        self.armed
    }

    /// Grid spacing.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Instant the grid is anchored to.
    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Completed firings.
    pub fn cycles(&self) -> u64 {
        self.fired
    }

    /// Grid instants passed over because a cycle overran them.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Record a completed firing and arm the next future grid instant.
    pub fn arm_next(&mut self, now: Instant) {
        self.fired += 1;
        self.armed += self.period;
        while self.armed <= now {
            self.armed += self.period;
            self.skipped += 1;
        }
    }
}

/// Owns the sensors, the sample bank, and the per-period pipeline.
pub struct Scheduler {
    sensors: Vec<Box<dyn SensorDriver>>,
    bank: SampleBank,
    fusion: Box<dyn FusionStage>,
    status: StatusSubsystem,
    port: Box<dyn ControlPort>,
    period: Duration,
    progress_every: u64,
    stream_enabled: bool,
    subcycle: u32,
    cadence: Cadence,
}

impl Scheduler {
    /// Assemble a scheduler from settings and the pluggable stages.
    pub fn new(
        settings: &Settings,
        fusion: Box<dyn FusionStage>,
        indicator: Box<dyn StatusIndicator>,
        port: Box<dyn ControlPort>,
    ) -> Self {
        let period = settings.sampling.period();
        Self {
            sensors: Vec::new(),
            bank: SampleBank::new(settings.buffers.accel, settings.buffers.mag),
            fusion,
            status: StatusSubsystem::new(indicator),
            port,
            period,
            progress_every: u64::from(settings.sampling.fusion_hz.max(1)),
            stream_enabled: settings.telemetry.stream,
            subcycle: 0,
            cadence: Cadence::starting_at(Instant::now(), period),
        }
    }

    /// Add a sensor to the acquisition set.
    pub fn install(&mut self, sensor: Box<dyn SensorDriver>) {
        debug!(sensor = sensor.name(), "sensor installed");
        self.sensors.push(sensor);
    }

    /// Bring every installed sensor up, stopping at the first failure.
    pub async fn initialize_all(&mut self) -> SensorResult<()> {
        self.status.set(SystemStatus::Initializing);
        for sensor in &mut self.sensors {
            if let Err(err) = sensor.initialize().await {
                warn!(sensor = sensor.name(), error = %err, "initialization failed");
                self.status.set(SystemStatus::HardFault);
                return Err(err);
            }
            info!(sensor = sensor.name(), "sensor initialized");
        }
        self.status.set(SystemStatus::Normal);
        Ok(())
    }

    /// Return every sensor to standby, continuing past failures.
    pub async fn standby_all(&mut self) {
        for sensor in &mut self.sensors {
            if let Err(err) = sensor.standby().await {
                warn!(sensor = sensor.name(), error = %err, "standby failed");
            }
        }
        self.status.set(SystemStatus::Off);
    }

    /// Run the acquisition loop until the surrounding task is cancelled.
    ///
    /// The deadline grid is anchored here, not at construction, so the
    /// first cycle fires one period after the call.
    pub async fn run(&mut self) -> SensorResult<()> {
        self.cadence = Cadence::starting_at(Instant::now(), self.period);
        info!(
            period_us = self.period.as_micros() as u64,
            sensors = self.sensors.len(),
            "acquisition loop started"
        );
        loop {
            tokio::time::sleep_until(self.cadence.deadline()).await;
            self.cycle().await?;
            self.cadence.arm_next(Instant::now());
            if self.cadence.cycles() % self.progress_every == 0 {
                info!(
                    cycles = self.cadence.cycles(),
                    skipped = self.cadence.skipped(),
                    accel_samples = self.bank.accel.total_written(),
                    mag_samples = self.bank.mag.total_written(),
                    temperature_c = ?self.bank.temperature_c(),
                    "acquisition progress"
                );
            }
        }
    }

    async fn cycle(&mut self) -> SensorResult<()> {
        for sensor in &mut self.sensors {
            match sensor.acquire(&mut self.bank).await {
                Ok(()) => {}
                Err(err) if err.is_no_data() => {
                    debug!(sensor = sensor.name(), "no samples ready");
                }
                Err(err) => {
                    warn!(sensor = sensor.name(), error = %err, "acquisition failed");
                    self.status.set(SystemStatus::SoftFault);
                }
            }
        }

        self.fusion.condition(&mut self.bank);

        // Snapshot before fusion consumes the rings.
        let frame = TelemetryFrame::capture(
            &self.bank,
            self.cadence.cycles() + 1,
            self.cadence.skipped(),
            self.status.current(),
        );

        self.fusion.fuse(&mut self.bank);

        self.subcycle += 1;
        if self.subcycle >= STATUS_UPDATE_PERIOD {
            self.subcycle = 0;
            self.status.publish();
        }
        // Assume the next window is healthy; a fault during it replaces this.
        self.status.queue(SystemStatus::Normal);

        let connected = self.port.poll_client().await;
        let mut force_send = false;
        let commands = self.port.poll_commands().await?;
        if !commands.is_empty() {
            self.status.queue(SystemStatus::Receiving);
        }
        for command in commands {
            match command {
                ControlCommand::StreamOn => {
                    info!("telemetry streaming enabled");
                    self.stream_enabled = true;
                }
                ControlCommand::StreamOff => {
                    info!("telemetry streaming disabled");
                    self.stream_enabled = false;
                }
                ControlCommand::Status => force_send = true,
            }
        }
        if connected && (self.stream_enabled || force_send) {
            self.port.stream(&frame).await?;
        }
        Ok(())
    }

    /// Shared sample storage.
    pub fn bank(&self) -> &SampleBank {
        &self.bank
    }

    /// Deadline grid state.
    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    /// Last published system status.
    pub fn status_current(&self) -> SystemStatus {
        self.status.current()
    }

    /// Whether per-period frames are being sent to a connected client.
    pub fn stream_enabled(&self) -> bool {
        self.stream_enabled
    }
}
