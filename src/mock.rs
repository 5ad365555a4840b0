//! Simulated register bus.
//!
//! Stands in for real bus hardware in tests and in simulated runs of the
//! binary. The mock keeps a plain register map plus a hardware-shaped
//! FIFO: 32 packets deep, circular, counted through the status register.
//! With synthesis enabled it accrues packets against the clock at the
//! configured rate, which under a paused test clock makes FIFO contents
//! exactly predictable. Fault injectors cover the failure paths a real
//! bus produces.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

use async_trait::async_trait;

use crate::bus::RegisterBus;
use crate::error::{SensorError, SensorResult};
use crate::registers::{self, OutputDataRate, CTRL_REG1_ACTIVE, PACKET_BYTES};

/// Hardware FIFO depth in packets.
const FIFO_DEPTH: usize = 32;

/// Transactions retained in the operation log. Older entries fall off, so
/// the log stays bounded however long the bus runs.
const OPERATION_LOG_DEPTH: usize = 64;

/// One bus transaction, as recorded by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Burst read of `len` bytes starting at `address`.
    Read {
        /// First register of the burst.
        address: u8,
        /// Bytes requested.
        len: usize,
    },
    /// Single register write.
    Write {
        /// Target register.
        address: u8,
        /// Byte written.
        value: u8,
    },
}

struct Synth {
    per_packet_nanos: u64,
    credit_nanos: u64,
    last: Instant,
    rng: StdRng,
    z: i16,
}

impl Synth {
    fn at_rate(rate: OutputDataRate) -> Self {
        Self {
            per_packet_nanos: (1_000_000_000.0 / rate.hertz()) as u64,
            credit_nanos: 0,
            last: Instant::now(),
            rng: StdRng::seed_from_u64(0x5EED),
            z: 8192,
        }
    }

    fn next_packet(&mut self) -> [u8; PACKET_BYTES] {
        let x: i16 = self.rng.gen_range(-128..=128);
        let y: i16 = self.rng.gen_range(-128..=128);
        let step: i16 = self.rng.gen_range(-16..=16);
        self.z = (self.z + step).clamp(7936, 8448);
        let mut packet = [0u8; PACKET_BYTES];
        packet[0..2].copy_from_slice(&x.to_be_bytes());
        packet[2..4].copy_from_slice(&y.to_be_bytes());
        packet[4..6].copy_from_slice(&self.z.to_be_bytes());
        packet
    }
}

struct MockState {
    registers: HashMap<u8, u8>,
    fifo: VecDeque<[u8; PACKET_BYTES]>,
    operations: VecDeque<Operation>,
    fail_next_read: bool,
    fail_next_write: bool,
    fail_read_at: Option<u8>,
    short_read: Option<usize>,
    synth: Option<Synth>,
}

impl MockState {
    fn active(&self) -> bool {
        self.registers
            .get(&registers::CTRL_REG1)
            .is_some_and(|v| v & CTRL_REG1_ACTIVE != 0)
    }

    fn push_packet(&mut self, packet: [u8; PACKET_BYTES]) {
        // Circular mode: a full FIFO drops the oldest packet.
        if self.fifo.len() == FIFO_DEPTH {
            self.fifo.pop_front();
        }
        self.fifo.push_back(packet);
    }

    fn record(&mut self, operation: Operation) {
        if self.operations.len() == OPERATION_LOG_DEPTH {
            self.operations.pop_front();
        }
        self.operations.push_back(operation);
    }

    fn refresh_synth(&mut self) {
        let Some(mut synth) = self.synth.take() else {
            return;
        };
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(synth.last);
        synth.last = now;
        if self.active() {
            synth.credit_nanos += elapsed.as_nanos() as u64;
            while synth.credit_nanos >= synth.per_packet_nanos {
                synth.credit_nanos -= synth.per_packet_nanos;
                let packet = synth.next_packet();
                self.push_packet(packet);
            }
        } else {
            synth.credit_nanos = 0;
        }
        self.synth = Some(synth);
    }
}

/// Cloneable handle to one simulated device.
#[derive(Clone)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    /// Device with the production identity byte and an empty FIFO.
    pub fn new() -> Self {
        let mut registers = HashMap::new();
        registers.insert(registers::WHO_AM_I, registers::WHO_AM_I_PROD_VALUE);
        Self {
            state: Arc::new(Mutex::new(MockState {
                registers,
                fifo: VecDeque::new(),
                operations: VecDeque::new(),
                fail_next_read: false,
                fail_next_write: false,
                fail_read_at: None,
                short_read: None,
                synth: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Accrue FIFO packets against the clock at `rate` while the device
    /// is active.
    pub fn synthesize_at(&self, rate: OutputDataRate) {
        self.lock().synth = Some(Synth::at_rate(rate));
    }

    /// Queue one accelerometer packet directly.
    pub fn queue_accel_packet(&self, x: i16, y: i16, z: i16) {
        let mut packet = [0u8; PACKET_BYTES];
        packet[0..2].copy_from_slice(&x.to_be_bytes());
        packet[2..4].copy_from_slice(&y.to_be_bytes());
        packet[4..6].copy_from_slice(&z.to_be_bytes());
        self.lock().push_packet(packet);
    }

    /// Set the magnetometer output registers.
    pub fn set_mag_sample(&self, x: i16, y: i16, z: i16) {
        let mut state = self.lock();
        for (offset, byte) in x
            .to_be_bytes()
            .into_iter()
            .chain(y.to_be_bytes())
            .chain(z.to_be_bytes())
            .enumerate()
        {
            state
                .registers
                .insert(registers::M_OUT_X_MSB + offset as u8, byte);
        }
    }

    /// Set the raw temperature register.
    pub fn set_temperature_raw(&self, raw: i8) {
        self.lock().registers.insert(registers::TEMP, raw as u8);
    }

    /// Override the identity byte.
    pub fn set_whoami(&self, value: u8) {
        self.lock().registers.insert(registers::WHO_AM_I, value);
    }

    /// Fail the next read with a transport error.
    pub fn fail_next_read(&self) {
        self.lock().fail_next_read = true;
    }

    /// Fail the next write with a transport error.
    pub fn fail_next_write(&self) {
        self.lock().fail_next_write = true;
    }

    /// Fail the next read that starts at `address`.
    pub fn fail_read_at(&self, address: u8) {
        self.lock().fail_read_at = Some(address);
    }

    /// Truncate the next read to `len` bytes.
    pub fn force_short_read(&self, len: usize) {
        self.lock().short_read = Some(len);
    }

    /// Most recent transactions, oldest first. The log holds the last 64
    /// entries; anything older has been dropped.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.iter().copied().collect()
    }

    /// Current value of one register, if ever written or seeded.
    pub fn register(&self, address: u8) -> Option<u8> {
        self.lock().registers.get(&address).copied()
    }

    /// Packets currently buffered.
    pub fn fifo_len(&self) -> usize {
        self.lock().fifo.len()
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegisterBus for MockBus {
    async fn read_registers(&mut self, address: u8, len: usize) -> SensorResult<Vec<u8>> {
        let mut state = self.lock();
        state.record(Operation::Read { address, len });

        if state.fail_next_read {
            state.fail_next_read = false;
            return Err(SensorError::Transport("injected read failure".into()));
        }
        if state.fail_read_at == Some(address) {
            state.fail_read_at = None;
            return Err(SensorError::Transport(format!(
                "injected read failure at {address:#04x}"
            )));
        }

        let mut bytes = match address {
            registers::STATUS => {
                state.refresh_synth();
                let count = state.fifo.len().min(0x3F) as u8;
                let mut out = vec![0u8; len];
                if let Some(first) = out.first_mut() {
                    *first = count;
                }
                out
            }
            registers::OUT_X_MSB => {
                state.refresh_synth();
                let mut out = Vec::with_capacity(len);
                for _ in 0..len / PACKET_BYTES {
                    let packet = state.fifo.pop_front().unwrap_or([0; PACKET_BYTES]);
                    out.extend_from_slice(&packet);
                }
                out
            }
            _ => (0..len)
                .map(|i| {
                    state
                        .registers
                        .get(&(address.wrapping_add(i as u8)))
                        .copied()
                        .unwrap_or(0)
                })
                .collect(),
        };

        if let Some(short) = state.short_read.take() {
            bytes.truncate(short);
        }
        Ok(bytes)
    }

    async fn write_register(&mut self, address: u8, value: u8) -> SensorResult<()> {
        let mut state = self.lock();
        state.record(Operation::Write { address, value });

        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(SensorError::Transport("injected write failure".into()));
        }
        state.registers.insert(address, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_counts_queued_packets() {
        let mut bus = MockBus::new();
        bus.queue_accel_packet(1, 2, 3);
        bus.queue_accel_packet(4, 5, 6);

        let status = bus.read_registers(registers::STATUS, 1).await.expect("status");
        assert_eq!(status, vec![2]);

        let bytes = bus
            .read_registers(registers::OUT_X_MSB, 2 * PACKET_BYTES)
            .await
            .expect("fifo");
        assert_eq!(bytes, vec![0, 1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6]);
        assert_eq!(bus.fifo_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_tracks_the_paused_clock() {
        let mut bus = MockBus::new();
        bus.synthesize_at(OutputDataRate::Hz200);
        bus.write_register(registers::CTRL_REG1, OutputDataRate::Hz200.ctrl_reg1())
            .await
            .expect("activate");

        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        let status = bus.read_registers(registers::STATUS, 1).await.expect("status");
        assert_eq!(status, vec![5]);

        // Inactive devices accrue nothing.
        bus.write_register(registers::CTRL_REG1, 0x00).await.expect("standby");
        bus.read_registers(registers::OUT_X_MSB, 5 * PACKET_BYTES)
            .await
            .expect("drain");
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        let status = bus.read_registers(registers::STATUS, 1).await.expect("status");
        assert_eq!(status, vec![0]);
    }

    #[tokio::test]
    async fn operation_log_stays_bounded() {
        let mut bus = MockBus::new();
        for _ in 0..200 {
            bus.read_registers(registers::STATUS, 1).await.expect("status");
        }
        bus.write_register(registers::CTRL_REG1, 0x05)
            .await
            .expect("write");

        // 201 transactions, but only the newest 64 are retained.
        let ops = bus.operations();
        assert_eq!(ops.len(), OPERATION_LOG_DEPTH);
        assert_eq!(
            ops.last(),
            Some(&Operation::Write {
                address: registers::CTRL_REG1,
                value: 0x05
            })
        );
        assert_eq!(
            ops.first(),
            Some(&Operation::Read {
                address: registers::STATUS,
                len: 1
            })
        );
    }

    #[tokio::test]
    async fn full_fifo_drops_oldest() {
        let bus = MockBus::new();
        for i in 0..40i16 {
            bus.queue_accel_packet(i, 0, 0);
        }
        assert_eq!(bus.fifo_len(), FIFO_DEPTH);

        let mut bus = bus;
        let bytes = bus
            .read_registers(registers::OUT_X_MSB, PACKET_BYTES)
            .await
            .expect("oldest");
        // Packets 0..8 were overwritten.
        assert_eq!(bytes[0..2], 8i16.to_be_bytes());
    }
}
