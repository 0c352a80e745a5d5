//! Arbitrary-Ratio Resampler
//!
//! Converts imported IQ recordings to the DAC sample rate using cubic
//! (Hermite) interpolation over a 4-sample neighborhood. Handles any
//! ratio, rational or not, so a 44.1 kS/s capture can feed a 30.72 MS/s
//! transmit chain without computing an exact up/down fraction.

use num_complex::Complex64;

use crate::types::{IQBuffer, IQSample, WaveformError, WaveformResult};

/// Resample `input` from `input_rate` to `output_rate`.
///
/// The output length is `floor(len * output_rate / input_rate)`. Identical
/// rates return a copy. Edge samples are clamped, so the first and last
/// few outputs interpolate against repeated boundary values instead of
/// zeros.
pub fn resample(input: &[IQSample], input_rate: f64, output_rate: f64) -> WaveformResult<IQBuffer> {
    if input_rate <= 0.0 || output_rate <= 0.0 {
        return Err(WaveformError::InvalidParameter(format!(
            "resample rates must be positive (input {} Hz, output {} Hz)",
            input_rate, output_rate
        )));
    }
    if input.is_empty() {
        return Err(WaveformError::EmptyBuffer);
    }
    if (input_rate - output_rate).abs() < f64::EPSILON {
        return Ok(input.to_vec());
    }

    let step = input_rate / output_rate;
    let out_len = ((input.len() as f64) * output_rate / input_rate).floor() as usize;
    let mut output = Vec::with_capacity(out_len);

    let at = |idx: isize| -> Complex64 {
        let clamped = idx.clamp(0, input.len() as isize - 1) as usize;
        input[clamped]
    };

    for k in 0..out_len {
        let pos = k as f64 * step;
        let base = pos.floor() as isize;
        let mu = pos - base as f64;
        let window = [at(base - 1), at(base), at(base + 1), at(base + 2)];
        output.push(hermite(&window, mu));
    }
    Ok(output)
}

/// 4-point, 3rd-order Hermite interpolation at fractional offset `mu`
/// between `w[1]` and `w[2]`.
fn hermite(w: &[Complex64; 4], mu: f64) -> Complex64 {
    let c0 = w[1];
    let c1 = (w[2] - w[0]) * 0.5;
    let c2 = w[0] - w[1] * 2.5 + w[2] * 2.0 - w[3] * 0.5;
    let c3 = (w[3] - w[0]) * 0.5 + (w[1] - w[2]) * 1.5;
    ((c3 * mu + c2) * mu + c1) * mu + c0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tone(n: usize, freq: f64, rate: f64) -> IQBuffer {
        (0..n)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * freq * i as f64 / rate;
                Complex64::new(phase.cos(), phase.sin())
            })
            .collect()
    }

    #[test]
    fn test_identity_rate() {
        let input = tone(64, 1000.0, 48_000.0);
        let output = resample(&input, 48_000.0, 48_000.0).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_output_length_scales() {
        let input = tone(1000, 1000.0, 48_000.0);
        let up = resample(&input, 48_000.0, 96_000.0).unwrap();
        assert_eq!(up.len(), 2000);
        let down = resample(&input, 48_000.0, 24_000.0).unwrap();
        assert_eq!(down.len(), 500);
    }

    #[test]
    fn test_constant_signal_preserved() {
        let input = vec![Complex64::new(0.5, -0.25); 100];
        let output = resample(&input, 10_000.0, 13_700.0).unwrap();
        for s in &output {
            assert_relative_eq!(s.re, 0.5, epsilon = 1e-9);
            assert_relative_eq!(s.im, -0.25, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_upsampled_tone_tracks_original() {
        // Interior samples of a smooth tone should interpolate accurately.
        let rate = 48_000.0;
        let input = tone(480, 1000.0, rate);
        let output = resample(&input, rate, 2.0 * rate).unwrap();
        for (k, s) in output.iter().enumerate().skip(4).take(900) {
            let t = k as f64 / (2.0 * rate);
            let expected = 2.0 * std::f64::consts::PI * 1000.0 * t;
            assert_relative_eq!(s.re, expected.cos(), epsilon = 1e-3);
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(resample(&[], 1.0, 2.0).is_err());
        let input = vec![Complex64::new(1.0, 0.0)];
        assert!(resample(&input, 0.0, 2.0).is_err());
        assert!(resample(&input, 1.0, -2.0).is_err());
    }
}
