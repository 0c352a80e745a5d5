//! OFDM Symbol Generation
//!
//! Maps data onto orthogonal subcarriers via an inverse FFT and prepends a
//! cyclic prefix. This is the TX half only; the engine uses it to build
//! multi-carrier test waveforms, not to carry user payloads, so the
//! subcarrier data is a seeded QPSK pattern rather than encoded bits.
//!
//! ## Example
//!
//! ```rust
//! use plutotx_core::ofdm::{OfdmParams, OfdmModulator};
//! use num_complex::Complex64;
//!
//! let params = OfdmParams { subcarriers: 64, cp_len: 16 };
//! let ofdm = OfdmModulator::new(params).unwrap();
//! let carriers = vec![Complex64::new(1.0, 0.0); 64];
//! let symbol = ofdm.modulate_symbol(&carriers).unwrap();
//! assert_eq!(symbol.len(), 64 + 16); // IFFT output plus cyclic prefix
//! ```

use std::sync::Arc;

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::{Fft, FftPlanner};

use crate::types::{IQBuffer, WaveformError, WaveformResult};

/// OFDM shaping parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfdmParams {
    /// Number of subcarriers (IFFT size).
    pub subcarriers: usize,
    /// Cyclic prefix length in samples.
    pub cp_len: usize,
}

/// OFDM modulator: subcarrier vector → time-domain symbol with cyclic prefix.
pub struct OfdmModulator {
    params: OfdmParams,
    ifft: Arc<dyn Fft<f64>>,
}

impl OfdmModulator {
    /// Create a modulator for the given parameters.
    pub fn new(params: OfdmParams) -> WaveformResult<Self> {
        if params.subcarriers < 2 {
            return Err(WaveformError::InvalidParameter(format!(
                "OFDM requires at least 2 subcarriers, got {}",
                params.subcarriers
            )));
        }
        if params.cp_len >= params.subcarriers {
            return Err(WaveformError::InvalidParameter(format!(
                "cyclic prefix length {} must be shorter than the {}-point symbol",
                params.cp_len, params.subcarriers
            )));
        }
        let ifft = FftPlanner::new().plan_fft_inverse(params.subcarriers);
        Ok(Self { params, ifft })
    }

    /// Shaping parameters.
    pub fn params(&self) -> OfdmParams {
        self.params
    }

    /// Samples per OFDM symbol including the cyclic prefix.
    pub fn symbol_len(&self) -> usize {
        self.params.subcarriers + self.params.cp_len
    }

    /// Transform one subcarrier vector into a time-domain symbol.
    ///
    /// The last `cp_len` IFFT output samples are copied to the front, so
    /// the symbol is circularly continuous across the prefix boundary.
    pub fn modulate_symbol(&self, carriers: &[Complex64]) -> WaveformResult<IQBuffer> {
        let n = self.params.subcarriers;
        if carriers.len() != n {
            return Err(WaveformError::InvalidParameter(format!(
                "expected {} subcarrier values, got {}",
                n,
                carriers.len()
            )));
        }
        let mut freq: Vec<Complex64> = carriers.to_vec();
        self.ifft.process(&mut freq);
        // rustfft leaves the inverse transform unnormalized.
        let scale = 1.0 / n as f64;
        for s in freq.iter_mut() {
            *s *= scale;
        }

        let mut symbol = Vec::with_capacity(self.symbol_len());
        symbol.extend_from_slice(&freq[n - self.params.cp_len..]);
        symbol.extend_from_slice(&freq);
        Ok(symbol)
    }

    /// Generate a stream of `num_samples` by tiling seeded random-QPSK
    /// symbols. The DC bin is left empty; the peak is scaled to `amplitude`.
    pub fn generate(&self, num_samples: usize, amplitude: f64, seed: u64) -> WaveformResult<IQBuffer> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = self.params.subcarriers;
        let v = std::f64::consts::FRAC_1_SQRT_2;
        let mut carriers = vec![Complex64::new(0.0, 0.0); n];
        for (bin, c) in carriers.iter_mut().enumerate() {
            if bin == 0 {
                continue; // DC stays empty
            }
            let re = if rng.gen::<bool>() { v } else { -v };
            let im = if rng.gen::<bool>() { v } else { -v };
            *c = Complex64::new(re, im);
        }
        let symbol = self.modulate_symbol(&carriers)?;

        let mut out = Vec::with_capacity(num_samples);
        while out.len() < num_samples {
            let take = (num_samples - out.len()).min(symbol.len());
            out.extend_from_slice(&symbol[..take]);
        }

        let peak = crate::types::peak_magnitude(&out);
        if peak > 0.0 {
            let scale = amplitude / peak;
            for s in out.iter_mut() {
                *s *= scale;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_symbol_length() {
        let ofdm = OfdmModulator::new(OfdmParams {
            subcarriers: 64,
            cp_len: 16,
        })
        .unwrap();
        let carriers = vec![Complex64::new(1.0, 0.0); 64];
        let symbol = ofdm.modulate_symbol(&carriers).unwrap();
        assert_eq!(symbol.len(), 80);
    }

    #[test]
    fn test_cyclic_prefix_is_tail_copy() {
        let ofdm = OfdmModulator::new(OfdmParams {
            subcarriers: 32,
            cp_len: 8,
        })
        .unwrap();
        let carriers: Vec<Complex64> = (0..32)
            .map(|i| Complex64::new((i as f64 * 0.3).cos(), (i as f64 * 0.7).sin()))
            .collect();
        let symbol = ofdm.modulate_symbol(&carriers).unwrap();
        // Prefix equals the last cp_len samples of the body.
        for i in 0..8 {
            assert_relative_eq!(symbol[i].re, symbol[32 + i].re, epsilon = 1e-12);
            assert_relative_eq!(symbol[i].im, symbol[32 + i].im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_single_carrier_is_tone() {
        // One active subcarrier must come out as a complex exponential of
        // constant magnitude.
        let ofdm = OfdmModulator::new(OfdmParams {
            subcarriers: 64,
            cp_len: 0,
        })
        .unwrap();
        let mut carriers = vec![Complex64::new(0.0, 0.0); 64];
        carriers[3] = Complex64::new(64.0, 0.0);
        let symbol = ofdm.modulate_symbol(&carriers).unwrap();
        for s in &symbol {
            assert_relative_eq!(s.norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_generate_deterministic() {
        let ofdm = OfdmModulator::new(OfdmParams {
            subcarriers: 64,
            cp_len: 16,
        })
        .unwrap();
        let a = ofdm.generate(1000, 0.8, 7).unwrap();
        let b = ofdm.generate(1000, 0.8, 7).unwrap();
        assert_eq!(a.len(), 1000);
        assert_eq!(a, b);
        let peak = crate::types::peak_magnitude(&a);
        assert_relative_eq!(peak, 0.8, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_bad_params() {
        assert!(OfdmModulator::new(OfdmParams {
            subcarriers: 1,
            cp_len: 0
        })
        .is_err());
        assert!(OfdmModulator::new(OfdmParams {
            subcarriers: 16,
            cp_len: 16
        })
        .is_err());
    }
}
