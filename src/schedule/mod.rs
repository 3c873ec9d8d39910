//! Schedule resolution: override merging and block/TTL computation

pub mod block_ttl;
pub mod overrides;

pub use block_ttl::{BlockTtlCalculator, CalculatorSettings, TtlResolution};
pub use overrides::{OverrideService, OverrideSettings};
