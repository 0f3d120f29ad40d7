//! WAV exchange with external implementations.

use std::path::Path;

use crate::core::types::{Sample, SampleBuffer};
use crate::error::{OracleError, Result};

/// Reads a WAV file into a [`SampleBuffer`].
///
/// Integer PCM is scaled by `1 / 2^(bits - 1)`, so full-scale values map to
/// [-1, 1). Float WAVs are read as-is.
///
/// # Errors
/// `InvalidInput` for malformed or unsupported files (including non-finite
/// float samples), `Io` for filesystem errors.
pub fn read_wav(path: &Path) -> Result<SampleBuffer> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let data: Vec<Sample> = match spec.sample_format {
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(OracleError::InvalidInput(format!(
                    "unsupported PCM bit depth {}",
                    spec.bits_per_sample
                )));
            }
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v as f64 * scale) as Sample))
                .collect::<std::result::Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };
    log::debug!(
        "read {} ({} ch, {} Hz, {} bit {:?}, {} samples)",
        path.display(),
        spec.channels,
        spec.sample_rate,
        spec.bits_per_sample,
        spec.sample_format,
        data.len()
    );
    SampleBuffer::new(data, spec.channels, spec.sample_rate)
}

/// Writes `buffer` as a 32-bit float WAV. Samples are written unclamped.
pub fn write_wav(path: &Path, buffer: &SampleBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in buffer.data() {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}
