//! FXOS8700 hybrid accelerometer/magnetometer driver.
//!
//! One [`Fxos8700`] owns the bus handle for one device and tracks its
//! enable state. The part is configured all-on or all-off: `initialize`
//! verifies identity and brings accelerometer, magnetometer, and
//! thermometer up together; `idle` takes them all down with a single
//! masked standby write. Per-channel reads check the shared state and
//! refuse to touch a device that is not active.
//!
//! The accelerometer is FIFO-buffered. `read_accelerometer` drains
//! everything the device has accumulated, splitting the drain into bursts
//! of at most [`MAX_BURST_PACKETS`] packets per bus transaction while
//! preserving the 6-byte packet framing.

use async_trait::async_trait;
use tracing::debug;

use crate::bus::RegisterBus;
use crate::error::{SensorError, SensorResult};
use crate::registers::{
    self, initialization_sequence, OutputDataRate, CELSIUS_PER_LSB, FULL_IDLE, PACKET_BYTES,
    WHO_AM_I_PROD_VALUE,
};
use crate::sample::{Sample, SampleBank, SampleRing, SensorChannel};

/// Largest FIFO drain per bus transaction, in packets. Transactions beyond
/// 126 bytes fail on the target bus, so bursts stop at 90 bytes.
pub const MAX_BURST_PACKETS: usize = 15;

/// Enable state of the hybrid device.
///
/// The state is shared by all three channels; there is no per-channel
/// teardown on this part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// Power-on state; nothing verified or configured.
    #[default]
    Uninitialized,
    /// Identity verified, configuration writes in flight.
    Configuring,
    /// Hybrid mode running; every channel enabled.
    Active,
    /// Standby entered through [`Fxos8700::idle`]; configuration retained,
    /// every channel disabled.
    Idle,
}

/// Driver for one FXOS8700 attached through a [`RegisterBus`].
pub struct Fxos8700<B> {
    bus: B,
    address: u8,
    rate: OutputDataRate,
    state: DeviceState,
    whoami: Option<u8>,
}

impl<B: RegisterBus> Fxos8700<B> {
    /// Build a driver for the device at `address`, to be configured for
    /// `rate` when initialized.
    pub fn new(bus: B, address: u8, rate: OutputDataRate) -> Self {
        Self {
            bus,
            address,
            rate,
            state: DeviceState::Uninitialized,
            whoami: None,
        }
    }

    /// Current enable state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Bus address this driver was built for.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Configured hybrid output rate.
    pub fn rate(&self) -> OutputDataRate {
        self.rate
    }

    /// Identity byte captured by the last `initialize` attempt. Retained
    /// even when it mismatched.
    pub fn whoami(&self) -> Option<u8> {
        self.whoami
    }

    fn require_enabled(&self, channel: SensorChannel) -> SensorResult<()> {
        if self.state == DeviceState::Active {
            Ok(())
        } else {
            Err(SensorError::NotInitialized(channel))
        }
    }

    /// Verify identity and place the device in hybrid operating mode.
    ///
    /// The identity byte is recorded before it is checked, so a mismatch
    /// still leaves the observed value available through [`whoami`].
    /// Re-initializing an already active device is safe; the sequence
    /// passes through standby and back. A failure while the configuration
    /// writes are in flight leaves the device `Uninitialized`.
    ///
    /// [`whoami`]: Fxos8700::whoami
    pub async fn initialize(&mut self) -> SensorResult<()> {
        let id = self.bus.read_registers(registers::WHO_AM_I, 1).await?;
        let found = id.first().copied().ok_or(SensorError::Framing {
            expected: 1,
            actual: 0,
        })?;
        self.whoami = Some(found);
        if found != WHO_AM_I_PROD_VALUE {
            return Err(SensorError::IdentityMismatch {
                expected: WHO_AM_I_PROD_VALUE,
                found,
            });
        }

        self.state = DeviceState::Configuring;
        let sequence = initialization_sequence(self.rate);
        if let Err(err) = self.bus.apply(&sequence).await {
            self.state = DeviceState::Uninitialized;
            return Err(err);
        }
        self.state = DeviceState::Active;
        debug!(
            address = format_args!("{:#04x}", self.address),
            rate_hz = self.rate.hertz(),
            "fxos8700 configured for hybrid acquisition"
        );
        Ok(())
    }

    /// Put the device in standby.
    ///
    /// Only valid while fully active; the part does not support taking one
    /// channel down on its own. A second `idle` after a successful one is
    /// rejected the same way.
    pub async fn idle(&mut self) -> SensorResult<()> {
        if self.state != DeviceState::Active {
            // All-or-nothing: not active means no channel is enabled.
            return Err(SensorError::NotInitialized(SensorChannel::Accelerometer));
        }
        self.bus.apply(&FULL_IDLE).await?;
        self.state = DeviceState::Idle;
        debug!(
            address = format_args!("{:#04x}", self.address),
            "fxos8700 placed in standby"
        );
        Ok(())
    }

    /// Drain every packet buffered in the accelerometer FIFO into `ring`.
    ///
    /// Returns the number of samples appended. An empty FIFO yields
    /// [`SensorError::NoDataYet`] with the ring untouched; that outcome is
    /// expected whenever the caller polls faster than the configured rate.
    pub async fn read_accelerometer(&mut self, ring: &mut SampleRing) -> SensorResult<usize> {
        self.require_enabled(SensorChannel::Accelerometer)?;

        let status = self.bus.read_registers(registers::STATUS, 1).await?;
        let count = status.first().copied().ok_or(SensorError::Framing {
            expected: 1,
            actual: 0,
        })?;
        let mut remaining = usize::from(count & registers::F_STATUS_COUNT_MASK);
        if remaining == 0 {
            return Err(SensorError::NoDataYet);
        }

        let mut appended = 0;
        while remaining > 0 {
            let burst = remaining.min(MAX_BURST_PACKETS);
            let want = burst * PACKET_BYTES;
            let bytes = self.bus.read_registers(registers::OUT_X_MSB, want).await?;
            if bytes.len() != want {
                return Err(SensorError::Framing {
                    expected: want,
                    actual: bytes.len(),
                });
            }
            for packet in bytes.chunks_exact(PACKET_BYTES) {
                ring.push(Sample::from_be_packet(packet).conditioned());
            }
            appended += burst;
            remaining -= burst;
        }
        Ok(appended)
    }

    /// Read the latest magnetometer sample into `ring`.
    pub async fn read_magnetometer(&mut self, ring: &mut SampleRing) -> SensorResult<()> {
        self.require_enabled(SensorChannel::Magnetometer)?;

        let bytes = self
            .bus
            .read_registers(registers::M_OUT_X_MSB, PACKET_BYTES)
            .await?;
        if bytes.len() != PACKET_BYTES {
            return Err(SensorError::Framing {
                expected: PACKET_BYTES,
                actual: bytes.len(),
            });
        }
        ring.push(Sample::from_be_packet(&bytes).conditioned());
        Ok(())
    }

    /// Read the die temperature in Celsius.
    pub async fn read_thermometer(&mut self) -> SensorResult<f32> {
        self.require_enabled(SensorChannel::Thermometer)?;

        let bytes = self.bus.read_registers(registers::TEMP, 1).await?;
        let raw = bytes.first().copied().ok_or(SensorError::Framing {
            expected: 1,
            actual: 0,
        })? as i8;
        Ok(f32::from(raw) * CELSIUS_PER_LSB)
    }

    /// Composite read: accelerometer FIFO, then magnetometer, then
    /// thermometer, in device order.
    ///
    /// Every channel is attempted even after a failure; the result carries
    /// the first hard failure only. An empty accelerometer FIFO is not a
    /// failure. Callers needing to know which channel failed use the
    /// per-channel reads directly.
    pub async fn read_all(&mut self, bank: &mut SampleBank) -> SensorResult<()> {
        let mut first_failure = None;

        match self.read_accelerometer(&mut bank.accel).await {
            Ok(_) | Err(SensorError::NoDataYet) => {}
            Err(err) => first_failure = Some(err),
        }

        if let Err(err) = self.read_magnetometer(&mut bank.mag).await {
            first_failure.get_or_insert(err);
        }

        match self.read_thermometer().await {
            Ok(celsius) => bank.set_temperature(celsius),
            Err(err) => {
                first_failure.get_or_insert(err);
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// One installable sensor the scheduler drives each period.
#[async_trait]
pub trait SensorDriver: Send {
    /// Stable name used in logs and telemetry.
    fn name(&self) -> &str;

    /// Verify identity and bring the device into its operating mode.
    async fn initialize(&mut self) -> SensorResult<()>;

    /// One composite per-period read into the shared bank.
    async fn acquire(&mut self, bank: &mut SampleBank) -> SensorResult<()>;

    /// Return the device to standby.
    async fn standby(&mut self) -> SensorResult<()>;
}

#[async_trait]
impl<B: RegisterBus + Send> SensorDriver for Fxos8700<B> {
    fn name(&self) -> &str {
        "fxos8700"
    }

    async fn initialize(&mut self) -> SensorResult<()> {
        Fxos8700::initialize(self).await
    }

    async fn acquire(&mut self, bank: &mut SampleBank) -> SensorResult<()> {
        self.read_all(bank).await
    }

    async fn standby(&mut self) -> SensorResult<()> {
        self.idle().await
    }
}
