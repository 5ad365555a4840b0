//! Conditioning and fusion stage.
//!
//! The scheduler hands the shared [`SampleBank`] to one [`FusionStage`]
//! every period. Conditioning runs right after acquisition while samples
//! are still raw; fusion runs once per period and owns the decision of how
//! much buffered history to consume. The stage trait is synchronous since
//! both steps are pure computation over memory the scheduler already
//! holds.

use crate::sample::SampleBank;

/// Per-period processing hook driven by the scheduler.
pub trait FusionStage: Send {
    /// Post-acquisition cleanup of freshly appended samples. The default
    /// does nothing; range clamping already happened on the way into the
    /// bank.
    fn condition(&mut self, _bank: &mut SampleBank) {}

    /// Consume buffered samples and advance the orientation estimate.
    fn fuse(&mut self, bank: &mut SampleBank);
}

/// Stage that consumes samples without estimating anything.
///
/// Stands in for a real orientation filter: it drains both rings the way a
/// filter would and keeps counters the tests and progress logs read.
#[derive(Debug, Default)]
pub struct PassthroughFusion {
    runs: u64,
    samples_seen: u64,
}

impl PassthroughFusion {
    /// New stage with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed `fuse` calls.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Total samples consumed across both rings.
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }
}

impl FusionStage for PassthroughFusion {
    fn fuse(&mut self, bank: &mut SampleBank) {
        let consumed = bank.accel.drain().len() + bank.mag.drain().len();
        self.samples_seen += consumed as u64;
        self.runs += 1;
    }
}
