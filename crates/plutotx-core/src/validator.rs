//! Waveform Validator
//!
//! Measures a synthesized buffer before it may enter a staging queue:
//! crest factor (peak/RMS in dB), Nyquist margin against the descriptor's
//! highest frequency component, and an optional amplitude normalization to
//! a safe fraction of DAC full scale.
//!
//! Verdicts:
//! - `Fail` when the Nyquist margin is non-positive; the buffer is never staged.
//! - `Warn` when the crest factor exceeds the configured limit; the caller
//!   must explicitly acknowledge the warning to stage the buffer.
//! - `Pass` otherwise.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{linear_to_db, peak_magnitude, rms_magnitude};
use crate::wavegen::{SampleBuffer, SAFE_AMPLITUDE};

/// Validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// All checks passed.
    Pass,
    /// Stageable only with explicit caller acknowledgement.
    Warn,
    /// Hard rejection; the buffer must not be staged.
    Fail,
}

/// Measurement report attached to a validated buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Crest factor in dB: 20·log10(peak / RMS).
    pub crest_factor_db: f64,
    /// Peak sample magnitude after any normalization.
    pub peak: f64,
    /// RMS sample magnitude after any normalization.
    pub rms: f64,
    /// Headroom between Nyquist and the highest signal component, in Hz.
    pub nyquist_margin_hz: f64,
    /// Overall verdict.
    pub verdict: Verdict,
    /// Human-readable reasons for a warn or fail verdict.
    pub reasons: Vec<String>,
    /// Whether amplitude normalization was applied by this validation pass.
    pub normalized: bool,
}

/// Validator configuration.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    /// Crest factor warning threshold in dB.
    pub crest_limit_db: f64,
    /// Apply amplitude normalization before measuring.
    pub normalize: bool,
    /// Normalization peak target as a fraction of full scale.
    pub normalize_target: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            crest_limit_db: 6.0,
            normalize: true,
            normalize_target: SAFE_AMPLITUDE,
        }
    }
}

impl Validator {
    /// Validate a buffer, optionally normalizing it, and attach the report.
    ///
    /// Normalization scales the peak to exactly `normalize_target`, so
    /// re-running validation on an already-normalized buffer is a no-op
    /// and yields an identical report.
    pub fn validate(&self, buffer: &mut SampleBuffer) -> ValidationReport {
        let mut reasons = Vec::new();
        let mut normalized = false;

        if buffer.is_empty() {
            let report = ValidationReport {
                crest_factor_db: 0.0,
                peak: 0.0,
                rms: 0.0,
                nyquist_margin_hz: 0.0,
                verdict: Verdict::Fail,
                reasons: vec!["buffer contains no samples".into()],
                normalized: false,
            };
            buffer.attach_report(report.clone());
            return report;
        }

        if self.normalize {
            let peak = peak_magnitude(buffer.samples());
            if peak > 0.0 && (peak - self.normalize_target).abs() > 1e-12 {
                let scale = self.normalize_target / peak;
                for s in buffer.samples_mut().iter_mut() {
                    *s *= scale;
                }
                normalized = true;
            }
        }

        let peak = peak_magnitude(buffer.samples());
        let rms = rms_magnitude(buffer.samples());
        let crest_factor_db = linear_to_db(peak / rms.max(1e-12));

        let descriptor = buffer.descriptor();
        let nyquist_margin_hz = descriptor.nyquist_hz() - descriptor.max_frequency_component();

        let verdict = if nyquist_margin_hz <= 0.0 {
            reasons.push(format!(
                "aliasing: highest component {:.0} Hz leaves no margin below Nyquist {:.0} Hz",
                descriptor.max_frequency_component(),
                descriptor.nyquist_hz()
            ));
            Verdict::Fail
        } else if crest_factor_db > self.crest_limit_db {
            reasons.push(format!(
                "crest factor {:.2} dB exceeds limit {:.2} dB",
                crest_factor_db, self.crest_limit_db
            ));
            Verdict::Warn
        } else {
            Verdict::Pass
        };

        if buffer.amplitude_clipped() {
            reasons.push(format!(
                "requested amplitude was clamped to the {:.2} full-scale safety limit",
                SAFE_AMPLITUDE
            ));
        }

        debug!(
            waveform = %descriptor.name,
            crest_db = crest_factor_db,
            margin_hz = nyquist_margin_hz,
            verdict = ?verdict,
            "validated waveform"
        );

        let report = ValidationReport {
            crest_factor_db,
            peak,
            rms,
            nyquist_margin_hz,
            verdict,
            reasons,
            normalized,
        };
        buffer.attach_report(report.clone());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxChannel;
    use crate::wavegen::{synthesize, SampleBuffer, WaveformDescriptor, WaveformKind};
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    fn sine(frequency_hz: f64, sample_rate: f64) -> WaveformDescriptor {
        WaveformDescriptor::tone("v", TxChannel::Tx1, frequency_hz, sample_rate, 0.005, 0.8)
    }

    #[test]
    fn test_clean_tone_passes() {
        // Scenario: 2 MHz tone at 30.72 MS/s leaves 13.36 MHz of margin.
        let mut buffer = synthesize(sine(2.0e6, 30.72e6)).unwrap();
        let report = Validator::default().validate(&mut buffer);
        assert_eq!(report.verdict, Verdict::Pass);
        assert_relative_eq!(report.nyquist_margin_hz, 13.36e6, epsilon = 1.0);
        // Constant-envelope tone: crest factor ~0 dB.
        assert!(report.crest_factor_db.abs() < 0.1);
    }

    #[test]
    fn test_nyquist_violation_fails() {
        // Build the buffer directly; the synthesizer itself rejects this
        // descriptor before generation.
        let desc = sine(16.0e6, 30.72e6);
        let samples = vec![Complex64::new(0.5, 0.0); 1024];
        let mut buffer = SampleBuffer::new(desc, samples);
        let report = Validator::default().validate(&mut buffer);
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.nyquist_margin_hz <= 0.0);
        assert!(!report.reasons.is_empty());
    }

    #[test]
    fn test_high_crest_warns() {
        // A near-impulse buffer has an extreme peak/RMS ratio.
        let desc = sine(1.0e6, 30.72e6);
        let mut samples = vec![Complex64::new(0.01, 0.0); 4096];
        samples[0] = Complex64::new(0.8, 0.0);
        let mut buffer = SampleBuffer::new(desc, samples);
        let report = Validator::default().validate(&mut buffer);
        assert_eq!(report.verdict, Verdict::Warn);
        assert!(report.crest_factor_db > 6.0);
    }

    #[test]
    fn test_normalization_idempotent() {
        let mut buffer = synthesize(sine(2.0e6, 30.72e6)).unwrap();
        let validator = Validator::default();
        let first = validator.validate(&mut buffer);
        let second = validator.validate(&mut buffer);
        assert_relative_eq!(
            first.crest_factor_db,
            second.crest_factor_db,
            epsilon = 1e-9
        );
        assert_relative_eq!(first.peak, second.peak, epsilon = 1e-12);
        // The second pass found nothing to rescale.
        assert!(!second.normalized);
    }

    #[test]
    fn test_normalization_targets_safe_peak() {
        let desc = sine(1.0e6, 30.72e6);
        let samples = vec![Complex64::new(0.1, 0.0); 1024];
        let mut buffer = SampleBuffer::new(desc, samples);
        let report = Validator::default().validate(&mut buffer);
        assert!(report.normalized);
        assert_relative_eq!(report.peak, SAFE_AMPLITUDE, epsilon = 1e-12);
    }

    #[test]
    fn test_report_attached_to_buffer() {
        let mut buffer = synthesize(sine(2.0e6, 30.72e6)).unwrap();
        assert!(buffer.report().is_none());
        Validator::default().validate(&mut buffer);
        assert_eq!(buffer.report().unwrap().verdict, Verdict::Pass);
    }

    #[test]
    fn test_empty_buffer_fails() {
        let mut buffer = SampleBuffer::new(sine(1.0e6, 30.72e6), Vec::new());
        let report = Validator::default().validate(&mut buffer);
        assert_eq!(report.verdict, Verdict::Fail);
    }
}
