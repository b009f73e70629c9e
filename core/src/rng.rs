//! Deterministic random number generation.
//!
//! RULE: Nothing in an analysis run may call any platform RNG.
//! All randomness flows through StageRng instances derived from the
//! single master seed stored on the run record.
//!
//! Each stage gets its own stream, seeded from (master_seed XOR slot index),
//! so adding a stage never shifts the streams of existing ones.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single stage.
pub struct StageRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StageRng {
    /// The slot index must never change once assigned.
    pub fn new(master_seed: u64, slot_index: u64) -> Self {
        let derived_seed = master_seed ^ (slot_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Uniform float in [lo, hi).
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Standard normal draw.
    pub fn normal(&mut self) -> f64 {
        self.inner.sample(StandardNormal)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.inner);
    }
}

/// All stage RNGs for a single run, indexed by stable slot.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 { self.master_seed }

    pub fn for_stage(&self, slot: StageSlot) -> StageRng {
        StageRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }
}

/// Stable stage slot assignments.
/// NEVER reorder or remove entries, only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StageSlot {
    Fetch = 0,
    Load = 1,
    Clean = 2,
    Returns = 3,
    Correlation = 4,
    Stationarity = 5,
    Var = 6,
    Granger = 7,
    Forecast = 8,
    Normalize = 9,
    Lstm = 10,
}

impl StageSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Load => "load",
            Self::Clean => "clean",
            Self::Returns => "returns",
            Self::Correlation => "correlation",
            Self::Stationarity => "stationarity",
            Self::Var => "var",
            Self::Granger => "granger",
            Self::Forecast => "forecast",
            Self::Normalize => "normalize",
            Self::Lstm => "lstm",
        }
    }
}
