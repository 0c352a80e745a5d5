//! Waveform Synthesizer
//!
//! Turns a declarative [`WaveformDescriptor`] into a [`SampleBuffer`] of
//! complex baseband samples, sample-accurate and deterministic for a given
//! descriptor and seed. Kind dispatch is a closed enum with exhaustive
//! matching, so adding a waveform kind is a compile-time-checked extension
//! rather than a registry lookup that can silently miss.
//!
//! ## Example
//!
//! ```rust
//! use plutotx_core::wavegen::{synthesize, WaveformDescriptor, WaveformKind};
//! use plutotx_core::types::TxChannel;
//!
//! let desc = WaveformDescriptor::tone("carrier-check", TxChannel::Tx1, 2.0e6, 30.72e6, 0.05, 0.8);
//! let buffer = synthesize(desc).unwrap();
//! assert_eq!(buffer.len(), 1_536_000); // 50 ms at 30.72 MS/s
//! ```

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::lfsr::PrbsGenerator;
use crate::ofdm::{OfdmModulator, OfdmParams};
use crate::resampler::resample;
use crate::types::{Complex, IQBuffer, TxChannel, WaveformError, WaveformResult};
use crate::validator::ValidationReport;

/// Largest amplitude accepted without clamping, as a fraction of DAC full
/// scale. Matches the validator's normalization target.
pub const SAFE_AMPLITUDE: f64 = 0.8;

/// Supported waveform kinds with their kind-specific parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveformKind {
    /// Complex exponential at `frequency_hz`.
    Sine,
    /// Bipolar square wave at `frequency_hz` (I channel only).
    Square,
    /// Symmetric triangle wave at `frequency_hz` (I channel only).
    Triangle,
    /// Maximal-length PRBS of the given polynomial order, mapped to ±amplitude.
    Prbs { order: u32 },
    /// Superposition of independently phased tones (Hz).
    Multitone { tones: Vec<f64> },
    /// Linear frequency sweep from `start_hz` to `stop_hz` over the duration.
    Chirp { start_hz: f64, stop_hz: f64 },
    /// Random-QPSK OFDM with cyclic prefix.
    Ofdm { subcarriers: usize, cp_len: usize },
    /// Externally supplied IQ, resampled to the target rate and normalized.
    /// `bandwidth_hz` is the declared occupied bandwidth of the recording,
    /// used for the Nyquist-margin check when known.
    Arbitrary {
        samples: IQBuffer,
        source_rate: f64,
        bandwidth_hz: Option<f64>,
    },
}

impl WaveformKind {
    /// Short kind name for logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            WaveformKind::Sine => "sine",
            WaveformKind::Square => "square",
            WaveformKind::Triangle => "triangle",
            WaveformKind::Prbs { .. } => "prbs",
            WaveformKind::Multitone { .. } => "multitone",
            WaveformKind::Chirp { .. } => "chirp",
            WaveformKind::Ofdm { .. } => "ofdm",
            WaveformKind::Arbitrary { .. } => "arbitrary",
        }
    }

    /// Kinds whose sample content depends on a PRNG and therefore require
    /// an explicit seed for reproducibility.
    pub fn requires_seed(&self) -> bool {
        matches!(self, WaveformKind::Prbs { .. } | WaveformKind::Ofdm { .. })
    }
}

/// Declarative waveform description. Immutable once submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformDescriptor {
    /// Operator-facing waveform name.
    pub name: String,
    /// Waveform kind and its parameters.
    pub kind: WaveformKind,
    /// Target TX channel.
    pub channel: TxChannel,
    /// Fundamental frequency in Hz (tonal kinds).
    pub frequency_hz: f64,
    /// DAC sample rate in samples per second.
    pub sample_rate: f64,
    /// Duration in seconds (ignored for arbitrary imports, whose length is
    /// fixed by the resampled recording).
    pub duration_s: f64,
    /// Peak amplitude as a fraction of full scale.
    pub amplitude: f64,
    /// PRNG seed; required when `kind.requires_seed()`.
    pub seed: Option<u64>,
}

impl WaveformDescriptor {
    /// Convenience constructor for a single complex tone.
    pub fn tone(
        name: impl Into<String>,
        channel: TxChannel,
        frequency_hz: f64,
        sample_rate: f64,
        duration_s: f64,
        amplitude: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind: WaveformKind::Sine,
            channel,
            frequency_hz,
            sample_rate,
            duration_s,
            amplitude,
            seed: None,
        }
    }

    /// Buffer length implied by duration and rate.
    pub fn num_samples(&self) -> usize {
        (self.sample_rate * self.duration_s).round() as usize
    }

    /// Nyquist limit implied by the sample rate.
    pub fn nyquist_hz(&self) -> f64 {
        self.sample_rate / 2.0
    }

    /// Highest frequency component the descriptor will produce.
    ///
    /// Tonal kinds report the fundamental, multitone the highest tone,
    /// chirp the sweep extreme. PRBS reports half the chip rate (the first
    /// spectral null sits at the chip rate); OFDM the outermost occupied
    /// subcarrier of the IFFT grid. Arbitrary imports report the declared
    /// recording bandwidth when provided, otherwise zero.
    pub fn max_frequency_component(&self) -> f64 {
        match &self.kind {
            WaveformKind::Sine | WaveformKind::Square | WaveformKind::Triangle => self.frequency_hz,
            WaveformKind::Prbs { .. } => self.sample_rate / 4.0,
            WaveformKind::Multitone { tones } => tones.iter().cloned().fold(0.0_f64, f64::max),
            WaveformKind::Chirp { start_hz, stop_hz } => start_hz.max(*stop_hz),
            WaveformKind::Ofdm { subcarriers, .. } => {
                let n = *subcarriers as f64;
                self.nyquist_hz() * (n - 1.0) / n
            }
            WaveformKind::Arbitrary { bandwidth_hz, .. } => bandwidth_hz.unwrap_or(0.0),
        }
    }

    fn check_parameters(&self) -> WaveformResult<()> {
        if self.sample_rate <= 0.0 {
            return Err(WaveformError::InvalidParameter(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.amplitude <= 0.0 {
            return Err(WaveformError::InvalidParameter(format!(
                "amplitude must be positive, got {}",
                self.amplitude
            )));
        }
        if self.kind.requires_seed() && self.seed.is_none() {
            return Err(WaveformError::SeedRequired(self.kind.name()));
        }

        match &self.kind {
            WaveformKind::Sine | WaveformKind::Square | WaveformKind::Triangle => {
                self.check_duration()?;
                self.check_tone(self.frequency_hz)
            }
            WaveformKind::Multitone { tones } => {
                self.check_duration()?;
                if tones.is_empty() {
                    return Err(WaveformError::InvalidParameter(
                        "multitone requires at least one tone".into(),
                    ));
                }
                for &tone in tones {
                    self.check_tone(tone)?;
                }
                Ok(())
            }
            WaveformKind::Chirp { start_hz, stop_hz } => {
                self.check_duration()?;
                if *start_hz < 0.0 || *stop_hz < 0.0 {
                    return Err(WaveformError::InvalidParameter(
                        "chirp endpoints must be non-negative".into(),
                    ));
                }
                if start_hz.max(*stop_hz) >= self.nyquist_hz() {
                    return Err(WaveformError::NyquistViolation {
                        frequency_hz: start_hz.max(*stop_hz),
                        nyquist_hz: self.nyquist_hz(),
                    });
                }
                Ok(())
            }
            WaveformKind::Prbs { .. } | WaveformKind::Ofdm { .. } => self.check_duration(),
            WaveformKind::Arbitrary {
                samples,
                source_rate,
                ..
            } => {
                if samples.is_empty() {
                    return Err(WaveformError::EmptyBuffer);
                }
                if *source_rate <= 0.0 {
                    return Err(WaveformError::InvalidParameter(format!(
                        "arbitrary import source rate must be positive, got {}",
                        source_rate
                    )));
                }
                Ok(())
            }
        }
    }

    fn check_duration(&self) -> WaveformResult<()> {
        if self.duration_s <= 0.0 {
            return Err(WaveformError::InvalidParameter(format!(
                "duration must be positive, got {}",
                self.duration_s
            )));
        }
        Ok(())
    }

    fn check_tone(&self, frequency_hz: f64) -> WaveformResult<()> {
        if frequency_hz <= 0.0 {
            return Err(WaveformError::InvalidParameter(format!(
                "tone frequency must be positive, got {}",
                frequency_hz
            )));
        }
        if frequency_hz >= self.nyquist_hz() {
            return Err(WaveformError::NyquistViolation {
                frequency_hz,
                nyquist_hz: self.nyquist_hz(),
            });
        }
        Ok(())
    }
}

/// A synthesized sample buffer together with its originating descriptor.
///
/// The buffer is owned exclusively by whoever holds it; handing it to a
/// channel pipeline moves ownership, so there is never concurrent mutation
/// of in-flight samples.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: IQBuffer,
    descriptor: WaveformDescriptor,
    report: Option<ValidationReport>,
    amplitude_clipped: bool,
}

impl SampleBuffer {
    /// Wrap raw samples with their descriptor. Normally produced by
    /// [`synthesize`]; exposed for importing pre-generated data.
    pub fn new(descriptor: WaveformDescriptor, samples: IQBuffer) -> Self {
        Self {
            samples,
            descriptor,
            report: None,
            amplitude_clipped: false,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The IQ samples.
    pub fn samples(&self) -> &[Complex] {
        &self.samples
    }

    /// Originating descriptor.
    pub fn descriptor(&self) -> &WaveformDescriptor {
        &self.descriptor
    }

    /// Attached validation report, if the buffer has been validated.
    pub fn report(&self) -> Option<&ValidationReport> {
        self.report.as_ref()
    }

    /// Whether the requested amplitude was clamped to the safe limit.
    pub fn amplitude_clipped(&self) -> bool {
        self.amplitude_clipped
    }

    pub(crate) fn samples_mut(&mut self) -> &mut [Complex] {
        &mut self.samples
    }

    pub(crate) fn attach_report(&mut self, report: ValidationReport) {
        self.report = Some(report);
    }
}

/// Synthesize a sample buffer from a descriptor.
///
/// Deterministic for a given descriptor and seed. Fails with
/// [`WaveformError::InvalidParameter`] for non-positive duration, rate, or
/// frequency parameters and with [`WaveformError::NyquistViolation`] when a
/// requested tone sits at or above half the sample rate.
pub fn synthesize(mut descriptor: WaveformDescriptor) -> WaveformResult<SampleBuffer> {
    descriptor.check_parameters()?;

    let mut clipped = false;
    if descriptor.amplitude > SAFE_AMPLITUDE {
        warn!(
            waveform = %descriptor.name,
            requested = descriptor.amplitude,
            limit = SAFE_AMPLITUDE,
            "amplitude exceeds safe limit, clamping"
        );
        descriptor.amplitude = SAFE_AMPLITUDE;
        clipped = true;
    }

    let n = descriptor.num_samples();
    let amplitude = descriptor.amplitude;
    let rate = descriptor.sample_rate;

    let samples = match &descriptor.kind {
        WaveformKind::Sine => {
            let phase_inc = 2.0 * PI * descriptor.frequency_hz / rate;
            let mut phase = 0.0_f64;
            let mut out = Vec::with_capacity(n);
            for _ in 0..n {
                out.push(Complex::new(amplitude * phase.cos(), amplitude * phase.sin()));
                phase += phase_inc;
                if phase > 2.0 * PI {
                    phase -= 2.0 * PI;
                }
            }
            out
        }
        WaveformKind::Square => {
            let cycles_per_sample = descriptor.frequency_hz / rate;
            (0..n)
                .map(|i| {
                    let p = (i as f64 * cycles_per_sample).fract();
                    let level = if p < 0.5 { amplitude } else { -amplitude };
                    Complex::new(level, 0.0)
                })
                .collect()
        }
        WaveformKind::Triangle => {
            let cycles_per_sample = descriptor.frequency_hz / rate;
            (0..n)
                .map(|i| {
                    let p = (i as f64 * cycles_per_sample).fract();
                    // Rises -1 → +1 over the first half cycle, falls back over the second.
                    let level = if p < 0.5 { 4.0 * p - 1.0 } else { 3.0 - 4.0 * p };
                    Complex::new(amplitude * level, 0.0)
                })
                .collect()
        }
        WaveformKind::Prbs { order } => {
            // Seed presence was checked in check_parameters.
            let seed = descriptor.seed.unwrap_or(1);
            let mut prbs = PrbsGenerator::new(*order, seed)?;
            prbs.generate_bipolar(n)
                .into_iter()
                .map(|chip| Complex::new(amplitude * chip, 0.0))
                .collect()
        }
        WaveformKind::Multitone { tones } => {
            let mut rng = StdRng::seed_from_u64(descriptor.seed.unwrap_or(0));
            let phases: Vec<f64> = tones.iter().map(|_| rng.gen::<f64>() * 2.0 * PI).collect();
            // 1/N scaling keeps the coherent worst-case peak within full scale.
            let per_tone = amplitude / tones.len() as f64;
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                let t = i as f64 / rate;
                let mut acc = Complex::new(0.0, 0.0);
                for (tone, phi) in tones.iter().zip(&phases) {
                    let phase = 2.0 * PI * tone * t + phi;
                    acc += Complex::new(per_tone * phase.cos(), per_tone * phase.sin());
                }
                out.push(acc);
            }
            out
        }
        WaveformKind::Chirp { start_hz, stop_hz } => {
            let duration = descriptor.duration_s;
            let sweep = stop_hz - start_hz;
            (0..n)
                .map(|i| {
                    let t = i as f64 / rate;
                    // Phase is the integral of the instantaneous frequency.
                    let phase = 2.0 * PI * (start_hz * t + 0.5 * sweep * t * t / duration);
                    Complex::new(amplitude * phase.cos(), amplitude * phase.sin())
                })
                .collect()
        }
        WaveformKind::Ofdm {
            subcarriers,
            cp_len,
        } => {
            let modulator = OfdmModulator::new(OfdmParams {
                subcarriers: *subcarriers,
                cp_len: *cp_len,
            })?;
            modulator.generate(n, amplitude, descriptor.seed.unwrap_or(1))?
        }
        WaveformKind::Arbitrary {
            samples,
            source_rate,
            ..
        } => {
            let mut out = resample(samples, *source_rate, rate)?;
            let peak = crate::types::peak_magnitude(&out);
            if peak > 0.0 {
                let scale = amplitude / peak;
                for s in out.iter_mut() {
                    *s *= scale;
                }
            }
            out
        }
    };

    info!(
        waveform = %descriptor.name,
        kind = descriptor.kind.name(),
        channel = %descriptor.channel,
        samples = samples.len(),
        "synthesized waveform"
    );

    Ok(SampleBuffer {
        samples,
        descriptor,
        report: None,
        amplitude_clipped: clipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    fn base(kind: WaveformKind) -> WaveformDescriptor {
        WaveformDescriptor {
            name: "test".into(),
            kind,
            channel: TxChannel::Tx1,
            frequency_hz: 1.0e6,
            sample_rate: 30.72e6,
            duration_s: 0.001,
            amplitude: 0.8,
            seed: Some(1),
        }
    }

    #[test]
    fn test_sine_length_matches_duration() {
        // 50 ms at 30.72 MS/s.
        let mut desc = base(WaveformKind::Sine);
        desc.frequency_hz = 2.0e6;
        desc.duration_s = 0.05;
        let buffer = synthesize(desc).unwrap();
        assert_eq!(buffer.len(), 1_536_000);
    }

    #[test]
    fn test_sine_constant_envelope() {
        let buffer = synthesize(base(WaveformKind::Sine)).unwrap();
        for s in buffer.samples().iter().step_by(1000) {
            assert_relative_eq!(s.norm(), 0.8, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_sine_deterministic() {
        let a = synthesize(base(WaveformKind::Sine)).unwrap();
        let b = synthesize(base(WaveformKind::Sine)).unwrap();
        assert_eq!(a.samples(), b.samples());
    }

    #[test]
    fn test_tone_at_nyquist_rejected() {
        let mut desc = base(WaveformKind::Sine);
        desc.frequency_hz = 16.0e6; // >= 30.72e6 / 2
        assert!(matches!(
            synthesize(desc),
            Err(WaveformError::NyquistViolation { .. })
        ));
    }

    #[test]
    fn test_non_positive_duration_rejected() {
        let mut desc = base(WaveformKind::Sine);
        desc.duration_s = 0.0;
        assert!(matches!(
            synthesize(desc),
            Err(WaveformError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_square_levels() {
        let mut desc = base(WaveformKind::Square);
        desc.frequency_hz = 30.72e6 / 32.0;
        let buffer = synthesize(desc).unwrap();
        for s in buffer.samples() {
            assert!(s.re.abs() > 0.79 && s.re.abs() < 0.81);
            assert_eq!(s.im, 0.0);
        }
        // First half of the first period is high.
        assert!(buffer.samples()[0].re > 0.0);
        assert!(buffer.samples()[16].re < 0.0);
    }

    #[test]
    fn test_triangle_stays_in_range() {
        let mut desc = base(WaveformKind::Triangle);
        desc.frequency_hz = 1.0e5;
        let buffer = synthesize(desc).unwrap();
        for s in buffer.samples() {
            assert!(s.re.abs() <= 0.8 + 1e-12);
        }
    }

    #[test]
    fn test_multitone_peak_bounded() {
        let desc = base(WaveformKind::Multitone {
            tones: vec![1.0e6, 1.5e6, 2.5e6],
        });
        let buffer = synthesize(desc).unwrap();
        assert!(crate::types::peak_magnitude(buffer.samples()) <= 0.8 + 1e-9);
    }

    #[test]
    fn test_prbs_requires_seed() {
        let mut desc = base(WaveformKind::Prbs { order: 9 });
        desc.seed = None;
        assert!(matches!(
            synthesize(desc),
            Err(WaveformError::SeedRequired("prbs"))
        ));
    }

    #[test]
    fn test_prbs_bipolar_output() {
        let buffer = synthesize(base(WaveformKind::Prbs { order: 9 })).unwrap();
        for s in buffer.samples() {
            assert!((s.re - 0.8).abs() < 1e-12 || (s.re + 0.8).abs() < 1e-12);
        }
    }

    #[test]
    fn test_chirp_envelope_and_length() {
        let desc = base(WaveformKind::Chirp {
            start_hz: 1.0e6,
            stop_hz: 10.0e6,
        });
        let buffer = synthesize(desc).unwrap();
        assert_eq!(buffer.len(), 30_720);
        for s in buffer.samples().iter().step_by(500) {
            assert_relative_eq!(s.norm(), 0.8, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_chirp_above_nyquist_rejected() {
        let desc = base(WaveformKind::Chirp {
            start_hz: 1.0e6,
            stop_hz: 16.0e6,
        });
        assert!(matches!(
            synthesize(desc),
            Err(WaveformError::NyquistViolation { .. })
        ));
    }

    #[test]
    fn test_ofdm_deterministic_for_seed() {
        let a = synthesize(base(WaveformKind::Ofdm {
            subcarriers: 64,
            cp_len: 16,
        }))
        .unwrap();
        let b = synthesize(base(WaveformKind::Ofdm {
            subcarriers: 64,
            cp_len: 16,
        }))
        .unwrap();
        assert_eq!(a.samples(), b.samples());
    }

    #[test]
    fn test_arbitrary_import_resamples_and_normalizes() {
        let source: Vec<Complex64> = (0..1000)
            .map(|i| Complex64::new(0.1 * (i as f64 * 0.01).cos(), 0.0))
            .collect();
        let mut desc = base(WaveformKind::Arbitrary {
            samples: source,
            source_rate: 15.36e6,
            bandwidth_hz: Some(1.0e6),
        });
        desc.amplitude = 0.5;
        let buffer = synthesize(desc).unwrap();
        assert_eq!(buffer.len(), 2000);
        assert_relative_eq!(
            crate::types::peak_magnitude(buffer.samples()),
            0.5,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_amplitude_clamped_to_safe_limit() {
        let mut desc = base(WaveformKind::Sine);
        desc.amplitude = 1.5;
        let buffer = synthesize(desc).unwrap();
        assert!(buffer.amplitude_clipped());
        assert_relative_eq!(
            crate::types::peak_magnitude(buffer.samples()),
            SAFE_AMPLITUDE,
            epsilon = 1e-9
        );
    }
}
