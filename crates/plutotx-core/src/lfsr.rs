//! PRBS Generator — maximal-length sequence source
//!
//! Generates pseudo-random binary sequences using a Fibonacci linear
//! feedback shift register with known maximal-length tap sets. A PRBS of
//! order `n` repeats after exactly 2^n - 1 bits and is balanced (2^(n-1)
//! ones), which makes it a convenient broadband test pattern for TX
//! linearity and spectral-flatness measurements.
//!
//! ## Example
//!
//! ```rust
//! use plutotx_core::lfsr::PrbsGenerator;
//!
//! // PRBS7: x^7 + x^6 + 1, period 127
//! let mut prbs = PrbsGenerator::new(7, 1).unwrap();
//! let bits = prbs.generate_bits(127);
//! assert_eq!(bits.iter().filter(|&&b| b == 1).count(), 64);
//! ```

use crate::types::{WaveformError, WaveformResult};

/// Fibonacci LFSR producing maximal-length (m-)sequences.
#[derive(Debug, Clone)]
pub struct PrbsGenerator {
    /// Current register state (never zero).
    state: u32,
    /// Tap mask; feedback is the parity of `state & taps`.
    taps: u32,
    /// Register length in bits.
    order: u32,
}

impl PrbsGenerator {
    /// Create a PRBS generator of the given polynomial order.
    ///
    /// `seed` initializes the shift register; any value with at least one
    /// bit inside the register width yields the same sequence at a
    /// different phase. A zero seed (after masking) is replaced by 1, since
    /// the all-zeros state is a fixed point of the recurrence.
    pub fn new(order: u32, seed: u64) -> WaveformResult<Self> {
        let taps = tap_mask(order).ok_or_else(|| {
            WaveformError::InvalidParameter(format!(
                "unsupported PRBS order {} (supported: 2-25, 28, 31)",
                order
            ))
        })?;
        let mask = register_mask(order);
        Ok(Self {
            state: ((seed as u32) & mask).max(1),
            taps,
            order,
        })
    }

    /// Sequence period: 2^order - 1.
    pub fn period(&self) -> u64 {
        (1u64 << self.order) - 1
    }

    /// Polynomial order.
    pub fn order(&self) -> u32 {
        self.order
    }

    /// Generate the next output bit (0 or 1).
    #[inline]
    pub fn next_bit(&mut self) -> u8 {
        let out = (self.state & 1) as u8;
        let feedback = (self.state & self.taps).count_ones() & 1;
        self.state = (self.state >> 1) | (feedback << (self.order - 1));
        out
    }

    /// Generate `n` bits.
    pub fn generate_bits(&mut self, n: usize) -> Vec<u8> {
        (0..n).map(|_| self.next_bit()).collect()
    }

    /// Generate `n` bipolar symbols (+1.0 / -1.0).
    pub fn generate_bipolar(&mut self, n: usize) -> Vec<f64> {
        (0..n)
            .map(|_| if self.next_bit() != 0 { 1.0 } else { -1.0 })
            .collect()
    }
}

fn register_mask(order: u32) -> u32 {
    if order >= 32 {
        u32::MAX
    } else {
        (1u32 << order) - 1
    }
}

/// Maximal-length tap sets, expressed as a mask over register bits.
///
/// Tap positions follow the usual x^n + x^k + ... + 1 polynomial tables.
/// The register shifts right and outputs bit 0, so the x^p term maps to
/// bit `order - p`: feedback is taken at the output end (the reciprocal
/// polynomial, which is primitive whenever the tabled one is) and the
/// out-shifting bit always participates in the recurrence.
fn tap_mask(order: u32) -> Option<u32> {
    let positions: &[u32] = match order {
        2 => &[2, 1],
        3 => &[3, 2],
        4 => &[4, 3],
        5 => &[5, 3],
        6 => &[6, 5],
        7 => &[7, 6],
        8 => &[8, 6, 5, 4],
        9 => &[9, 5],
        10 => &[10, 7],
        11 => &[11, 9],
        12 => &[12, 11, 10, 4],
        13 => &[13, 12, 11, 8],
        14 => &[14, 13, 12, 2],
        15 => &[15, 14],
        16 => &[16, 15, 13, 4],
        17 => &[17, 14],
        18 => &[18, 11],
        19 => &[19, 18, 17, 14],
        20 => &[20, 17],
        21 => &[21, 19],
        22 => &[22, 21],
        23 => &[23, 18],
        24 => &[24, 23, 22, 17],
        25 => &[25, 22],
        28 => &[28, 25],
        31 => &[31, 28],
        _ => return None,
    };
    Some(positions.iter().fold(0u32, |m, &p| m | (1 << (order - p))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prbs7_period_and_balance() {
        let mut prbs = PrbsGenerator::new(7, 1).unwrap();
        assert_eq!(prbs.period(), 127);
        let bits = prbs.generate_bits(254);
        // One full period then an exact repeat.
        assert_eq!(&bits[..127], &bits[127..254]);
        // M-sequences carry 2^(n-1) ones per period.
        assert_eq!(bits[..127].iter().filter(|&&b| b == 1).count(), 64);
    }

    #[test]
    fn test_prbs7_visits_every_nonzero_window() {
        // An m-sequence contains every nonzero 7-bit pattern exactly once
        // per period; in particular the register never locks at all-zeros.
        let mut prbs = PrbsGenerator::new(7, 1).unwrap();
        let bits = prbs.generate_bits(127 + 6);
        let mut seen = std::collections::HashSet::new();
        for window in bits.windows(7).take(127) {
            let word = window.iter().fold(0u32, |acc, &b| (acc << 1) | b as u32);
            assert_ne!(word, 0);
            seen.insert(word);
        }
        assert_eq!(seen.len(), 127);
    }

    #[test]
    fn test_prbs9_period() {
        let mut prbs = PrbsGenerator::new(9, 0x1FF).unwrap();
        let bits = prbs.generate_bits(1022);
        assert_eq!(&bits[..511], &bits[511..1022]);
        assert_eq!(bits[..511].iter().filter(|&&b| b == 1).count(), 256);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let a: Vec<u8> = PrbsGenerator::new(11, 42).unwrap().generate_bits(100);
        let b: Vec<u8> = PrbsGenerator::new(11, 42).unwrap().generate_bits(100);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_seed_recovers() {
        // All-zero state would lock the register; the constructor bumps it.
        let mut prbs = PrbsGenerator::new(7, 0).unwrap();
        let bits = prbs.generate_bits(254);
        assert_eq!(&bits[..127], &bits[127..254]);
    }

    #[test]
    fn test_unsupported_order() {
        assert!(PrbsGenerator::new(1, 1).is_err());
        assert!(PrbsGenerator::new(27, 1).is_err());
    }

    #[test]
    fn test_bipolar_mapping() {
        let mut prbs = PrbsGenerator::new(5, 1).unwrap();
        let symbols = prbs.generate_bipolar(31);
        assert!(symbols.iter().all(|&s| s == 1.0 || s == -1.0));
    }
}
