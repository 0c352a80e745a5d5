//! IQ Import/Export — raw sample file codecs
//!
//! Deterministic encode/decode of complex sample arrays for the arbitrary
//! waveform import path and for capture hand-off to analysis tools.
//! Binary formats are little-endian interleaved (I then Q per sample);
//! CSV is one `re,im` pair per line.
//!
//! ## Example
//!
//! ```rust
//! use plutotx_core::iqio::{save_iq, load_iq, IqFormat};
//! use num_complex::Complex64;
//!
//! let samples = vec![Complex64::new(0.5, -0.5); 16];
//! let path = std::env::temp_dir().join("plutotx_doc_example.cf32");
//! save_iq(&path, &samples, IqFormat::Cf32).unwrap();
//! let restored = load_iq(&path, IqFormat::Cf32).unwrap();
//! assert_eq!(restored.len(), 16);
//! std::fs::remove_file(&path).ok();
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use num_complex::Complex64;

use crate::types::{IQBuffer, WaveformError, WaveformResult};

/// On-disk IQ sample layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqFormat {
    /// Interleaved little-endian f32 pairs (8 bytes/sample).
    Cf32,
    /// Interleaved little-endian f64 pairs (16 bytes/sample).
    Cf64,
    /// Interleaved i8 pairs scaled by ±127 (2 bytes/sample).
    Ci8,
    /// Text, one `re,im` pair per line.
    Csv,
}

impl IqFormat {
    /// Detect format from a file extension.
    pub fn from_extension(path: &Path) -> WaveformResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "cf32" | "fc32" | "iq" => Ok(Self::Cf32),
            "cf64" | "fc64" => Ok(Self::Cf64),
            "ci8" | "cs8" | "c8" => Ok(Self::Ci8),
            "csv" => Ok(Self::Csv),
            other => Err(WaveformError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Bytes per complex sample for the binary layouts.
    pub fn bytes_per_sample(&self) -> Option<usize> {
        match self {
            Self::Cf32 => Some(8),
            Self::Cf64 => Some(16),
            Self::Ci8 => Some(2),
            Self::Csv => None,
        }
    }
}

/// Write samples to `path` in the given format.
pub fn save_iq(path: &Path, samples: &[Complex64], format: IqFormat) -> WaveformResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        IqFormat::Cf32 => {
            for s in samples {
                writer.write_all(&(s.re as f32).to_le_bytes())?;
                writer.write_all(&(s.im as f32).to_le_bytes())?;
            }
        }
        IqFormat::Cf64 => {
            for s in samples {
                writer.write_all(&s.re.to_le_bytes())?;
                writer.write_all(&s.im.to_le_bytes())?;
            }
        }
        IqFormat::Ci8 => {
            for s in samples {
                let i = (s.re.clamp(-1.0, 1.0) * 127.0).round() as i8;
                let q = (s.im.clamp(-1.0, 1.0) * 127.0).round() as i8;
                writer.write_all(&[i as u8, q as u8])?;
            }
        }
        IqFormat::Csv => {
            for s in samples {
                writeln!(writer, "{:.6},{:.6}", s.re, s.im)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write samples, picking the format from the file extension.
pub fn save_iq_auto(path: &Path, samples: &[Complex64]) -> WaveformResult<()> {
    save_iq(path, samples, IqFormat::from_extension(path)?)
}

/// Read all samples from `path` in the given format.
pub fn load_iq(path: &Path, format: IqFormat) -> WaveformResult<IQBuffer> {
    match format {
        IqFormat::Csv => load_csv(path),
        binary => load_binary(path, binary),
    }
}

/// Read all samples, picking the format from the file extension.
pub fn load_iq_auto(path: &Path) -> WaveformResult<IQBuffer> {
    load_iq(path, IqFormat::from_extension(path)?)
}

fn load_binary(path: &Path, format: IqFormat) -> WaveformResult<IQBuffer> {
    let stride = format
        .bytes_per_sample()
        .expect("binary formats have a fixed stride");
    let mut raw = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut raw)?;
    if raw.len() % stride != 0 {
        return Err(WaveformError::Io(format!(
            "{}: truncated file, {} bytes is not a multiple of the {}-byte sample stride",
            path.display(),
            raw.len(),
            stride
        )));
    }

    let mut samples = Vec::with_capacity(raw.len() / stride);
    for chunk in raw.chunks_exact(stride) {
        let sample = match format {
            IqFormat::Cf32 => {
                let re = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let im = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
                Complex64::new(re as f64, im as f64)
            }
            IqFormat::Cf64 => {
                let mut re = [0u8; 8];
                let mut im = [0u8; 8];
                re.copy_from_slice(&chunk[..8]);
                im.copy_from_slice(&chunk[8..]);
                Complex64::new(f64::from_le_bytes(re), f64::from_le_bytes(im))
            }
            IqFormat::Ci8 => Complex64::new(
                chunk[0] as i8 as f64 / 127.0,
                chunk[1] as i8 as f64 / 127.0,
            ),
            IqFormat::Csv => unreachable!("csv handled separately"),
        };
        samples.push(sample);
    }
    Ok(samples)
}

fn load_csv(path: &Path) -> WaveformResult<IQBuffer> {
    let reader = BufReader::new(File::open(path)?);
    let mut samples = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.splitn(2, ',');
        let parse = |field: Option<&str>| -> WaveformResult<f64> {
            field
                .map(str::trim)
                .and_then(|f| f.parse::<f64>().ok())
                .ok_or_else(|| {
                    WaveformError::Io(format!(
                        "{}: malformed CSV at line {}",
                        path.display(),
                        line_no + 1
                    ))
                })
        };
        let re = parse(parts.next())?;
        let im = parse(parts.next())?;
        samples.push(Complex64::new(re, im));
    }
    Ok(samples)
}
