//! Register-oriented bus port.
//!
//! Device drivers reach hardware through [`RegisterBus`], a narrow async
//! trait with the two transactions the FXOS8700 family needs: read N bytes
//! starting at a register address, and write one byte to one register.
//! Configuration sequences are expressed as slices of [`RegisterWrite`]
//! triples and applied in order by [`RegisterBus::apply`], which honors the
//! per-entry bitmask. Real adapters (I2C, SPI) implement the two required
//! methods; the crate ships a simulated implementation in [`crate::mock`].

use async_trait::async_trait;

use crate::error::{SensorError, SensorResult};

/// One entry of a register write sequence.
///
/// `mask` selects which bits the write may touch. A mask of zero overwrites
/// the whole byte. A nonzero mask reads the register first and rewrites only
/// the masked bits, leaving the others as found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    /// Target register address.
    pub address: u8,
    /// Value to write (masked bits only, when a mask is set).
    pub value: u8,
    /// Bits the write is allowed to change; zero means all of them.
    pub mask: u8,
}

/// Transport for register transactions against one device.
#[async_trait]
pub trait RegisterBus: Send {
    /// Read `len` bytes starting at `address`. The device auto-increments
    /// and, for FIFO reads, wraps its register pointer.
    async fn read_registers(&mut self, address: u8, len: usize) -> SensorResult<Vec<u8>>;

    /// Write one byte to `address`, replacing the whole register.
    async fn write_register(&mut self, address: u8, value: u8) -> SensorResult<()>;

    /// Apply a write sequence in order, honoring each entry's mask.
    async fn apply(&mut self, list: &[RegisterWrite]) -> SensorResult<()> {
        for entry in list {
            if entry.mask == 0 {
                self.write_register(entry.address, entry.value).await?;
            } else {
                let current = self.read_registers(entry.address, 1).await?;
                let old = current.first().copied().ok_or(SensorError::Framing {
                    expected: 1,
                    actual: 0,
                })?;
                let merged = (old & !entry.mask) | (entry.value & entry.mask);
                self.write_register(entry.address, merged).await?;
            }
        }
        Ok(())
    }
}
