//! FXOS8700 register map and configuration tables.
//!
//! Addresses and values follow the FXOS8700CQ data sheet. The
//! initialization sequence configures hybrid operation: accelerometer FIFO
//! in continuous mode, magnetometer at maximum oversampling, ±4 g full
//! scale, high-resolution oversampling, then the output data rate together
//! with the ACTIVE bit as the final write. Sequences are immutable
//! [`RegisterWrite`] tables; the rate-dependent last entry is selected at
//! configuration time through [`OutputDataRate`].

use crate::bus::RegisterWrite;

/// STATUS / F_STATUS register; FIFO packet count in the low six bits.
pub const STATUS: u8 = 0x00;
/// First accelerometer output register. FIFO bursts start here and the
/// register pointer wraps back after the Z LSB.
pub const OUT_X_MSB: u8 = 0x01;
/// FIFO setup register.
pub const F_SETUP: u8 = 0x09;
/// Device identity register.
pub const WHO_AM_I: u8 = 0x0D;
/// Accelerometer full-scale and filter configuration.
pub const XYZ_DATA_CFG: u8 = 0x0E;
/// System control register 1: data rate, LNOISE, ACTIVE.
pub const CTRL_REG1: u8 = 0x2A;
/// System control register 2: oversampling mode.
pub const CTRL_REG2: u8 = 0x2B;
/// First magnetometer output register.
pub const M_OUT_X_MSB: u8 = 0x33;
/// Die temperature register, signed, 0.96 °C per LSB.
pub const TEMP: u8 = 0x51;
/// Magnetometer control register 1: hybrid mode and oversampling.
pub const M_CTRL_REG1: u8 = 0x5B;
/// Magnetometer control register 2: register pointer wraparound.
pub const M_CTRL_REG2: u8 = 0x5C;

/// Identity byte a genuine FXOS8700 reports from [`WHO_AM_I`].
pub const WHO_AM_I_PROD_VALUE: u8 = 0xC7;
/// Mask isolating the FIFO packet count inside [`STATUS`].
pub const F_STATUS_COUNT_MASK: u8 = 0x3F;
/// ACTIVE bit of [`CTRL_REG1`].
pub const CTRL_REG1_ACTIVE: u8 = 0x01;

/// Accelerometer sensitivity in ±4 g mode, counts per g, for the 16-bit
/// left-justified representation the FIFO emits.
pub const COUNTS_PER_G: f32 = 8192.0;
/// Magnetometer sensitivity, counts per microtesla.
pub const COUNTS_PER_UT: f32 = 10.0;
/// Thermometer scale, data sheet section 14.3.
pub const CELSIUS_PER_LSB: f32 = 0.96;

/// Bytes in one FIFO packet: three big-endian 16-bit axes.
pub const PACKET_BYTES: usize = 6;

/// Configuration sequence placing the device in hybrid operating mode at
/// the given rate.
///
/// Per-entry intent:
/// - CTRL_REG1 = 0x00: standby while reconfiguring.
/// - F_SETUP = 0x40: FIFO continuous (circular) mode, no watermark.
/// - M_CTRL_REG1 = 0x1F: hybrid mode, 8x magnetic oversampling.
/// - M_CTRL_REG2 = 0x00: register pointer wraps to 0x00, so one burst
///   drains the accelerometer FIFO.
/// - XYZ_DATA_CFG = 0x01: ±4 g full scale.
/// - CTRL_REG2 = 0x02: high-resolution oversampling.
/// - CTRL_REG1 = rate byte: data rate, LNOISE, and ACTIVE, applied last.
pub fn initialization_sequence(rate: OutputDataRate) -> [RegisterWrite; 7] {
    [
        RegisterWrite { address: CTRL_REG1, value: 0x00, mask: 0 },
        RegisterWrite { address: F_SETUP, value: 0x40, mask: 0 },
        RegisterWrite { address: M_CTRL_REG1, value: 0x1F, mask: 0 },
        RegisterWrite { address: M_CTRL_REG2, value: 0x00, mask: 0 },
        RegisterWrite { address: XYZ_DATA_CFG, value: 0x01, mask: 0 },
        RegisterWrite { address: CTRL_REG2, value: 0x02, mask: 0 },
        RegisterWrite { address: CTRL_REG1, value: rate.ctrl_reg1(), mask: 0 },
    ]
}

/// Single masked write returning the device to standby. Only the ACTIVE
/// bit changes; rate and mode bits survive for a later re-activation.
pub const FULL_IDLE: [RegisterWrite; 1] = [RegisterWrite {
    address: CTRL_REG1,
    value: 0x00,
    mask: CTRL_REG1_ACTIVE,
}];

/// Realized hybrid output data rates.
///
/// The accelerometer and magnetometer share one converter, so running both
/// halves the single-channel step: the CTRL_REG1 encoding documented as
/// 400 Hz delivers 200 Hz of hybrid output. Variants are named for the rate
/// actually delivered in hybrid mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDataRate {
    /// 0.78125 Hz hybrid output.
    Hz0_78,
    /// 3.125 Hz hybrid output.
    Hz3_125,
    /// 6.25 Hz hybrid output.
    Hz6_25,
    /// 25 Hz hybrid output.
    Hz25,
    /// 50 Hz hybrid output.
    Hz50,
    /// 100 Hz hybrid output.
    Hz100,
    /// 200 Hz hybrid output.
    Hz200,
    /// 400 Hz hybrid output.
    Hz400,
}

impl OutputDataRate {
    /// Every discrete setting, slowest first.
    pub const ALL: [OutputDataRate; 8] = [
        OutputDataRate::Hz0_78,
        OutputDataRate::Hz3_125,
        OutputDataRate::Hz6_25,
        OutputDataRate::Hz25,
        OutputDataRate::Hz50,
        OutputDataRate::Hz100,
        OutputDataRate::Hz200,
        OutputDataRate::Hz400,
    ];

    /// CTRL_REG1 byte selecting this rate with LNOISE and ACTIVE set.
    pub const fn ctrl_reg1(self) -> u8 {
        match self {
            OutputDataRate::Hz0_78 => 0x3D,
            OutputDataRate::Hz3_125 => 0x35,
            OutputDataRate::Hz6_25 => 0x2D,
            OutputDataRate::Hz25 => 0x25,
            OutputDataRate::Hz50 => 0x1D,
            OutputDataRate::Hz100 => 0x15,
            OutputDataRate::Hz200 => 0x0D,
            OutputDataRate::Hz400 => 0x05,
        }
    }

    /// Hybrid output rate in hertz.
    pub const fn hertz(self) -> f64 {
        match self {
            OutputDataRate::Hz0_78 => 0.78125,
            OutputDataRate::Hz3_125 => 3.125,
            OutputDataRate::Hz6_25 => 6.25,
            OutputDataRate::Hz25 => 25.0,
            OutputDataRate::Hz50 => 50.0,
            OutputDataRate::Hz100 => 100.0,
            OutputDataRate::Hz200 => 200.0,
            OutputDataRate::Hz400 => 400.0,
        }
    }

    /// Map a requested rate onto a discrete setting, using the threshold
    /// chain the device family documents.
    pub fn for_target_hz(hz: f64) -> Self {
        if hz <= 1.0 {
            OutputDataRate::Hz0_78
        } else if hz <= 3.0 {
            OutputDataRate::Hz3_125
        } else if hz <= 6.0 {
            OutputDataRate::Hz6_25
        } else if hz <= 30.0 {
            OutputDataRate::Hz25
        } else if hz <= 50.0 {
            OutputDataRate::Hz50
        } else if hz <= 100.0 {
            OutputDataRate::Hz100
        } else if hz <= 200.0 {
            OutputDataRate::Hz200
        } else {
            OutputDataRate::Hz400
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_table_is_distinct_and_active() {
        let mut seen = Vec::new();
        for rate in OutputDataRate::ALL {
            let byte = rate.ctrl_reg1();
            assert!(!seen.contains(&byte), "duplicate CTRL_REG1 {byte:#04x}");
            seen.push(byte);
            // Every setting must leave the part ACTIVE.
            assert_eq!(byte & CTRL_REG1_ACTIVE, CTRL_REG1_ACTIVE);
        }
    }

    #[test]
    fn target_rate_thresholds() {
        assert_eq!(OutputDataRate::for_target_hz(0.5), OutputDataRate::Hz0_78);
        assert_eq!(OutputDataRate::for_target_hz(1.0), OutputDataRate::Hz0_78);
        assert_eq!(OutputDataRate::for_target_hz(6.0), OutputDataRate::Hz6_25);
        assert_eq!(OutputDataRate::for_target_hz(30.0), OutputDataRate::Hz25);
        assert_eq!(OutputDataRate::for_target_hz(40.0), OutputDataRate::Hz50);
        assert_eq!(OutputDataRate::for_target_hz(200.0), OutputDataRate::Hz200);
        assert_eq!(OutputDataRate::for_target_hz(250.0), OutputDataRate::Hz400);
    }

    #[test]
    fn initialization_enters_standby_before_activating() {
        let seq = initialization_sequence(OutputDataRate::Hz200);
        assert_eq!(seq[0].address, CTRL_REG1);
        assert_eq!(seq[0].value, 0x00);
        let last = seq[seq.len() - 1];
        assert_eq!(last.address, CTRL_REG1);
        assert_eq!(last.value, 0x0D);
        // All initialization writes are full overwrites.
        assert!(seq.iter().all(|w| w.mask == 0));
    }

    #[test]
    fn idle_write_is_masked_to_the_active_bit() {
        assert_eq!(FULL_IDLE[0].address, CTRL_REG1);
        assert_eq!(FULL_IDLE[0].value, 0x00);
        assert_eq!(FULL_IDLE[0].mask, CTRL_REG1_ACTIVE);
    }
}
