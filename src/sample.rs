//! Samples, conditioning, and the per-channel circular buffers.
//!
//! The device emits fixed 6-byte packets: three big-endian signed 16-bit
//! axis values. Conditioning clamps each axis to [`AXIS_FLOOR`] so the
//! two's-complement minimum never reaches downstream consumers, which
//! reserve it as a sentinel. Conditioned samples land in a [`SampleRing`]
//! per channel; the rings are written by the acquisition path and read by
//! the fusion stage, both from the scheduler task in a fixed order, so no
//! locking is involved.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

/// Lowest axis value allowed out of conditioning. Raw -32768 is clamped
/// here before a sample is stored.
pub const AXIS_FLOOR: i16 = -32767;

/// The three logical channels of the hybrid device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorChannel {
    /// 3-axis accelerometer, FIFO-buffered.
    Accelerometer,
    /// 3-axis magnetometer, latest-value only.
    Magnetometer,
    /// Die thermometer, latest-value only.
    Thermometer,
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorChannel::Accelerometer => "accelerometer",
            SensorChannel::Magnetometer => "magnetometer",
            SensorChannel::Thermometer => "thermometer",
        };
        f.write_str(name)
    }
}

/// One 3-axis reading in raw device counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Sample {
    /// X axis, raw counts.
    pub x: i16,
    /// Y axis, raw counts.
    pub y: i16,
    /// Z axis, raw counts.
    pub z: i16,
}

impl Sample {
    /// Decode one packet: big-endian X, Y, Z pairs. Callers guarantee
    /// `packet` holds at least six bytes.
    pub fn from_be_packet(packet: &[u8]) -> Sample {
        Sample {
            x: i16::from_be_bytes([packet[0], packet[1]]),
            y: i16::from_be_bytes([packet[2], packet[3]]),
            z: i16::from_be_bytes([packet[4], packet[5]]),
        }
    }

    /// Clamp each axis to [`AXIS_FLOOR`].
    pub fn conditioned(self) -> Sample {
        Sample {
            x: self.x.max(AXIS_FLOOR),
            y: self.y.max(AXIS_FLOOR),
            z: self.z.max(AXIS_FLOOR),
        }
    }
}

/// Fixed-capacity ring of samples with a running write count.
///
/// When full, a push overwrites the oldest sample (circular behavior).
/// Single writer, single reader, both on the scheduler task.
#[derive(Debug, Clone)]
pub struct SampleRing {
    buf: VecDeque<Sample>,
    capacity: usize,
    total: u64,
}

impl SampleRing {
    /// Create a ring holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        // A zero capacity would never evict; treat it as one.
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: Sample) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
        self.total += 1;
    }

    /// Samples currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Maximum number of buffered samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples ever written, including evicted ones.
    pub fn total_written(&self) -> u64 {
        self.total
    }

    /// Most recently pushed sample, if any.
    pub fn latest(&self) -> Option<Sample> {
        self.buf.back().copied()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.buf.iter()
    }

    /// Remove and return everything buffered, oldest first.
    pub fn drain(&mut self) -> Vec<Sample> {
        self.buf.drain(..).collect()
    }

    /// Drop everything buffered. The running write count is kept.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// The shared buffers between acquisition and fusion: one ring per 3-axis
/// channel plus the latest thermometer reading.
#[derive(Debug)]
pub struct SampleBank {
    /// Accelerometer ring, fed by FIFO bursts.
    pub accel: SampleRing,
    /// Magnetometer ring, fed one sample per cycle.
    pub mag: SampleRing,
    temperature_c: Option<f32>,
}

impl SampleBank {
    /// Create a bank with the given per-channel capacities.
    pub fn new(accel_capacity: usize, mag_capacity: usize) -> Self {
        Self {
            accel: SampleRing::new(accel_capacity),
            mag: SampleRing::new(mag_capacity),
            temperature_c: None,
        }
    }

    /// Record the latest die temperature.
    pub fn set_temperature(&mut self, celsius: f32) {
        self.temperature_c = Some(celsius);
    }

    /// Latest die temperature, if one was ever read.
    pub fn temperature_c(&self) -> Option<f32> {
        self.temperature_c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_big_endian_axes() {
        let packet = [0x20, 0x00, 0xFF, 0xFE, 0x00, 0x2A];
        let sample = Sample::from_be_packet(&packet);
        assert_eq!(sample, Sample { x: 8192, y: -2, z: 42 });
    }

    #[test]
    fn conditioning_clamps_the_minimum() {
        let raw = Sample { x: i16::MIN, y: -32767, z: 5 };
        let cooked = raw.conditioned();
        assert_eq!(cooked, Sample { x: AXIS_FLOOR, y: AXIS_FLOOR, z: 5 });
    }

    #[test]
    fn ring_overwrites_oldest_when_full() {
        let mut ring = SampleRing::new(3);
        for v in 0..5i16 {
            ring.push(Sample { x: v, y: 0, z: 0 });
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.total_written(), 5);
        let xs: Vec<i16> = ring.iter().map(|s| s.x).collect();
        assert_eq!(xs, vec![2, 3, 4]);
        assert_eq!(ring.latest().map(|s| s.x), Some(4));
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut ring = SampleRing::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push(Sample { x: 1, y: 0, z: 0 });
        ring.push(Sample { x: 2, y: 0, z: 0 });
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.latest().map(|s| s.x), Some(2));
    }

    #[test]
    fn clear_keeps_the_write_count() {
        let mut ring = SampleRing::new(4);
        for v in 0..3i16 {
            ring.push(Sample { x: v, y: 0, z: 0 });
        }
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.latest(), None);
        assert_eq!(ring.total_written(), 3);
        assert_eq!(ring.capacity(), 4);
    }

    #[test]
    fn drain_empties_in_order() {
        let mut ring = SampleRing::new(8);
        for v in 0..4i16 {
            ring.push(Sample { x: v, y: v, z: v });
        }
        let drained = ring.drain();
        assert_eq!(drained.len(), 4);
        assert_eq!(drained[0].x, 0);
        assert_eq!(drained[3].x, 3);
        assert!(ring.is_empty());
        assert_eq!(ring.total_written(), 4);
    }

    #[test]
    fn bank_tracks_temperature() {
        let mut bank = SampleBank::new(4, 4);
        assert_eq!(bank.temperature_c(), None);
        bank.set_temperature(24.96);
        assert_eq!(bank.temperature_c(), Some(24.96));
    }
}
