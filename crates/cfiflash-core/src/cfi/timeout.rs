//! Status-poll bounds

use super::types::{saturating_shl, TimedOperation, TimeoutExponents};

/// Poll iterations per `2^typical` unit of a CFI timeout entry
const ITERATIONS_PER_UNIT: u32 = 1000;

/// Poll bound for lock-bit operations
pub const LOCK_POLL_ITERATIONS: u32 = 100;

/// Caller overrides for status-poll bounds
///
/// By default every bound is derived from the device's timing table:
/// `1000 * 2^typical` poll iterations, shifted further by the maximum
/// exponent when `worst_case` is set. Each iteration sleeps
/// `poll_interval_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimeoutConfig {
    /// Fixed bound for word programming
    pub word_write: Option<u32>,
    /// Fixed bound for buffer programming
    pub buffer_write: Option<u32>,
    /// Fixed bound for a block erase
    pub block_erase: Option<u32>,
    /// Fixed bound for a chip erase
    pub chip_erase: Option<u32>,
    /// Use the maximum rather than the typical timing entries
    pub worst_case: bool,
    /// Sleep between two status reads
    pub poll_interval_us: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            word_write: None,
            buffer_write: None,
            block_erase: None,
            chip_erase: None,
            worst_case: false,
            poll_interval_us: 1000,
        }
    }
}

impl TimeoutConfig {
    /// Poll iterations allowed for `op`
    pub fn iterations(&self, op: TimedOperation, exponents: &TimeoutExponents) -> u32 {
        let fixed = match op {
            TimedOperation::WordWrite => self.word_write,
            TimedOperation::BufferWrite => self.buffer_write,
            TimedOperation::BlockErase => self.block_erase,
            TimedOperation::ChipErase => self.chip_erase,
        };
        if let Some(n) = fixed {
            return n;
        }
        let typical = saturating_shl(ITERATIONS_PER_UNIT, exponents.typical(op));
        if self.worst_case {
            saturating_shl(typical, exponents.maximum(op))
        } else {
            typical
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_bounds() {
        let exps = TimeoutExponents {
            typical: [4, 5, 10, 0],
            maximum: [4, 3, 4, 0],
        };
        let config = TimeoutConfig::default();
        assert_eq!(config.iterations(TimedOperation::WordWrite, &exps), 16_000);
        assert_eq!(config.iterations(TimedOperation::BlockErase, &exps), 1_024_000);
        assert_eq!(config.iterations(TimedOperation::ChipErase, &exps), 1000);

        let worst = TimeoutConfig {
            worst_case: true,
            ..Default::default()
        };
        assert_eq!(worst.iterations(TimedOperation::WordWrite, &exps), 256_000);
        assert_eq!(worst.iterations(TimedOperation::BufferWrite, &exps), 256_000);
    }

    #[test]
    fn test_override_wins() {
        let exps = TimeoutExponents::default();
        let config = TimeoutConfig {
            block_erase: Some(7),
            worst_case: true,
            ..Default::default()
        };
        assert_eq!(config.iterations(TimedOperation::BlockErase, &exps), 7);
        assert_eq!(config.iterations(TimedOperation::WordWrite, &exps), 1000);
    }
}
