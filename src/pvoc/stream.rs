//! The analysis stream: spectral frames plus the transform metadata that
//! produced them, and its persisted forms.
//!
//! Two persisted forms are supported. The binary form (`PVAS`) stores every
//! value as its raw little-endian IEEE-754 bit pattern. The JSON form goes
//! through serde and relies on serde_json's round-trip float parsing. Both
//! reproduce the in-memory stream bit for bit.

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::fft::num_bins;
use crate::core::window::WindowType;
use crate::error::{OracleError, Result};

/// Magic bytes at the start of a binary analysis stream.
const STREAM_MAGIC: &[u8; 4] = b"PVAS";
/// Current binary format version.
const STREAM_VERSION: u16 = 1;
/// Fixed header size in bytes (magic through frame count).
const HEADER_LEN: usize = 4 + 2 + 8 + 8 + 1 + 4 + 4 + 2 + 8 + 8;

/// Immutable transform metadata carried by every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// FFT size in samples.
    pub fft_size: usize,
    /// Analysis hop size in samples.
    pub hop_size: usize,
    /// Analysis window type.
    pub window_type: WindowType,
    /// Sample rate of the analysed buffer in Hz.
    pub sample_rate: u32,
    /// Channel count of the analysed buffer.
    pub channel_count: u16,
    /// Samples per channel of the analysed buffer.
    pub sample_count: usize,
}

impl StreamMetadata {
    /// Number of bins per frame.
    #[inline]
    pub fn num_bins(&self) -> usize {
        num_bins(self.fft_size)
    }

    /// Checks that every field needed for resynthesis is present and sane.
    pub fn validate(&self) -> Result<()> {
        if self.fft_size == 0 {
            return Err(OracleError::InvalidInput("stream has no fft size".to_string()));
        }
        if self.hop_size == 0 || self.hop_size > self.fft_size {
            return Err(OracleError::InvalidInput(format!(
                "stream hop size {} invalid for fft size {}",
                self.hop_size, self.fft_size
            )));
        }
        if self.sample_rate == 0 {
            return Err(OracleError::InvalidInput("stream has no sample rate".to_string()));
        }
        if self.channel_count == 0 {
            return Err(OracleError::InvalidInput(
                "stream has no channel count".to_string(),
            ));
        }
        Ok(())
    }
}

/// Number of analysis frames for a signal of `sample_count` samples.
///
/// Zero samples give zero frames. A non-empty signal shorter than one window
/// gives a single zero-padded frame. Otherwise
/// `ceil((sample_count - fft_size) / hop_size) + 1`.
pub fn expected_frame_count(sample_count: usize, fft_size: usize, hop_size: usize) -> usize {
    if sample_count == 0 || hop_size == 0 {
        return 0;
    }
    if sample_count <= fft_size {
        return 1;
    }
    (sample_count - fft_size).div_ceil(hop_size) + 1
}

/// Most samples per channel that `frame_count` frames can cover:
/// `(frame_count - 1) * hop_size + fft_size`, or 0 with no frames.
/// `None` when the span overflows.
pub fn max_sample_count(frame_count: usize, fft_size: usize, hop_size: usize) -> Option<usize> {
    if frame_count == 0 {
        return Some(0);
    }
    (frame_count - 1).checked_mul(hop_size)?.checked_add(fft_size)
}

/// One analysis frame of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralFrame {
    /// Position in the frame sequence, starting at 0.
    pub frame_index: usize,
    /// `frame_index * hop_size / sample_rate`, in seconds.
    pub center_time: f64,
    /// Non-negative bin magnitudes.
    pub magnitudes: Vec<f64>,
    /// Accumulated (unwrapped) bin phases in radians.
    pub phases: Vec<f64>,
    /// Instantaneous bin frequencies in Hz.
    pub frequencies: Vec<f64>,
}

impl SpectralFrame {
    /// Builds a frame, deriving `center_time` from the index and hop.
    pub fn new(
        frame_index: usize,
        hop_size: usize,
        sample_rate: u32,
        magnitudes: Vec<f64>,
        phases: Vec<f64>,
        frequencies: Vec<f64>,
    ) -> Self {
        Self {
            frame_index,
            center_time: frame_index as f64 * hop_size as f64 / sample_rate as f64,
            magnitudes,
            phases,
            frequencies,
        }
    }

    /// Number of bins.
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.magnitudes.len()
    }

    fn validate(&self, expected_index: usize, bins: usize) -> Result<()> {
        if self.frame_index != expected_index {
            return Err(OracleError::InvalidInput(format!(
                "frame index {} out of order, expected {}",
                self.frame_index, expected_index
            )));
        }
        if self.magnitudes.len() != bins
            || self.phases.len() != bins
            || self.frequencies.len() != bins
        {
            return Err(OracleError::InvalidInput(format!(
                "frame {} has wrong bin count, expected {}",
                self.frame_index, bins
            )));
        }
        if self.magnitudes.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(OracleError::InvalidInput(format!(
                "frame {} has a negative or non-finite magnitude",
                self.frame_index
            )));
        }
        if !self.center_time.is_finite()
            || self
                .phases
                .iter()
                .chain(self.frequencies.iter())
                .any(|v| !v.is_finite())
        {
            return Err(OracleError::InvalidInput(format!(
                "frame {} has a non-finite value",
                self.frame_index
            )));
        }
        Ok(())
    }
}

/// Time-ordered spectral frames, one sequence per channel, plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StreamRepr")]
pub struct AnalysisStream {
    metadata: StreamMetadata,
    channels: Vec<Vec<SpectralFrame>>,
}

#[derive(Deserialize)]
struct StreamRepr {
    metadata: StreamMetadata,
    channels: Vec<Vec<SpectralFrame>>,
}

impl TryFrom<StreamRepr> for AnalysisStream {
    type Error = OracleError;

    fn try_from(repr: StreamRepr) -> Result<Self> {
        AnalysisStream::new(repr.metadata, repr.channels)
    }
}

impl AnalysisStream {
    /// Assembles a stream, checking it is internally consistent.
    ///
    /// # Errors
    /// `InvalidInput` if the metadata is incomplete, the channel count does
    /// not match, channels hold different frame counts, frames are out of
    /// order, any frame has the wrong bin count or invalid values, or
    /// `sample_count` exceeds what the frames cover.
    pub fn new(metadata: StreamMetadata, channels: Vec<Vec<SpectralFrame>>) -> Result<Self> {
        metadata.validate()?;
        if channels.len() != metadata.channel_count as usize {
            return Err(OracleError::InvalidInput(format!(
                "stream declares {} channels but holds {}",
                metadata.channel_count,
                channels.len()
            )));
        }
        let frame_count = channels[0].len();
        let bins = metadata.num_bins();
        for frames in &channels {
            if frames.len() != frame_count {
                return Err(OracleError::InvalidInput(
                    "all channels must hold the same number of frames".to_string(),
                ));
            }
            for (idx, frame) in frames.iter().enumerate() {
                frame.validate(idx, bins)?;
            }
        }
        let covered = max_sample_count(frame_count, metadata.fft_size, metadata.hop_size)
            .ok_or_else(|| OracleError::InvalidInput("frame span overflows".to_string()))?;
        if metadata.sample_count > covered {
            return Err(OracleError::InvalidInput(format!(
                "sample count {} exceeds the {} samples covered by {} frames",
                metadata.sample_count, covered, frame_count
            )));
        }
        Ok(Self { metadata, channels })
    }

    /// Transform metadata.
    #[inline]
    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    /// Number of frames per channel.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// True when the stream holds no frames.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Frames of one channel, or `None` if out of range.
    pub fn channel(&self, channel: usize) -> Option<&[SpectralFrame]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    /// Frames of every channel.
    #[inline]
    pub fn channels(&self) -> &[Vec<SpectralFrame>] {
        &self.channels
    }

    /// Consumes the stream, returning metadata and frames.
    pub fn into_parts(self) -> (StreamMetadata, Vec<Vec<SpectralFrame>>) {
        (self.metadata, self.channels)
    }

    /// Serializes to the binary `PVAS` format.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let m = &self.metadata;
        let (window_tag, window_param) = m.window_type.tag();
        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(STREAM_MAGIC);
        header.extend_from_slice(&STREAM_VERSION.to_le_bytes());
        header.extend_from_slice(&(m.fft_size as u64).to_le_bytes());
        header.extend_from_slice(&(m.hop_size as u64).to_le_bytes());
        header.push(window_tag);
        header.extend_from_slice(&window_param.to_le_bytes());
        header.extend_from_slice(&m.sample_rate.to_le_bytes());
        header.extend_from_slice(&m.channel_count.to_le_bytes());
        header.extend_from_slice(&(m.sample_count as u64).to_le_bytes());
        header.extend_from_slice(&(self.frame_count() as u64).to_le_bytes());
        writer.write_all(&header)?;

        let mut frame_bytes = Vec::with_capacity(frame_record_len(m.num_bins()));
        for frames in &self.channels {
            for frame in frames {
                frame_bytes.clear();
                frame_bytes.extend_from_slice(&(frame.frame_index as u64).to_le_bytes());
                frame_bytes.extend_from_slice(&frame.center_time.to_bits().to_le_bytes());
                for values in [&frame.magnitudes, &frame.phases, &frame.frequencies] {
                    for v in values.iter() {
                        frame_bytes.extend_from_slice(&v.to_bits().to_le_bytes());
                    }
                }
                writer.write_all(&frame_bytes)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads a binary `PVAS` stream.
    ///
    /// # Errors
    /// `SerializationError` for bad magic, unknown version, truncation,
    /// trailing bytes, or content that fails stream validation.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }

    /// Binary `PVAS` encoding as a byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Decodes a binary `PVAS` byte slice.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        if cursor.take(4)? != STREAM_MAGIC {
            return Err(OracleError::SerializationError(
                "missing PVAS header".to_string(),
            ));
        }
        let version = cursor.read_u16()?;
        if version != STREAM_VERSION {
            return Err(OracleError::SerializationError(format!(
                "unsupported stream version {}",
                version
            )));
        }
        let fft_size = cursor.read_usize()?;
        let hop_size = cursor.read_usize()?;
        let window_tag = cursor.read_u8()?;
        let window_param = cursor.read_u32()?;
        let window_type = WindowType::from_tag(window_tag, window_param)
            .map_err(|e| OracleError::SerializationError(e.to_string()))?;
        let metadata = StreamMetadata {
            fft_size,
            hop_size,
            window_type,
            sample_rate: cursor.read_u32()?,
            channel_count: cursor.read_u16()?,
            sample_count: cursor.read_usize()?,
        };
        let frame_count = cursor.read_usize()?;
        metadata.validate().map_err(corrupt)?;

        let bins = metadata.num_bins();
        let expected_len = frame_record_len(bins)
            .checked_mul(frame_count)
            .and_then(|n| n.checked_mul(metadata.channel_count as usize))
            .ok_or_else(|| OracleError::SerializationError("frame count overflow".to_string()))?;
        if cursor.remaining() != expected_len {
            return Err(OracleError::SerializationError(format!(
                "expected {} bytes of frame data, found {}",
                expected_len,
                cursor.remaining()
            )));
        }

        let mut channels = Vec::with_capacity(metadata.channel_count as usize);
        for _ in 0..metadata.channel_count {
            let mut frames = Vec::with_capacity(frame_count);
            for _ in 0..frame_count {
                let frame_index = cursor.read_usize()?;
                let center_time = cursor.read_f64()?;
                let magnitudes = cursor.read_f64_vec(bins)?;
                let phases = cursor.read_f64_vec(bins)?;
                let frequencies = cursor.read_f64_vec(bins)?;
                frames.push(SpectralFrame {
                    frame_index,
                    center_time,
                    magnitudes,
                    phases,
                    frequencies,
                });
            }
            channels.push(frames);
        }
        AnalysisStream::new(metadata, channels).map_err(corrupt)
    }

    /// Writes the binary form to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
        self.write_to(&mut writer)
    }

    /// Loads the binary form from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// JSON form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses the JSON form. Inconsistent content is a `SerializationError`.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Size of one serialized frame record with `bins` bins.
#[inline]
fn frame_record_len(bins: usize) -> usize {
    8 + 8 + 3 * 8 * bins
}

fn corrupt(err: OracleError) -> OracleError {
    OracleError::SerializationError(format!("corrupt analysis stream: {}", err))
}

/// Little-endian reader over a byte slice that reports truncation.
struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(OracleError::SerializationError(format!(
                "truncated analysis stream at byte {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_usize(&mut self) -> Result<usize> {
        let v = u64::from_le_bytes(self.read_array()?);
        usize::try_from(v).map_err(|_| {
            OracleError::SerializationError(format!("value {} does not fit in usize", v))
        })
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_le_bytes(self.read_array()?)))
    }

    fn read_f64_vec(&mut self, len: usize) -> Result<Vec<f64>> {
        (0..len).map(|_| self.read_f64()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_metadata(channel_count: u16) -> StreamMetadata {
        StreamMetadata {
            fft_size: 4,
            hop_size: 1,
            window_type: WindowType::Hann,
            sample_rate: 8000,
            channel_count,
            sample_count: 5,
        }
    }

    fn tiny_frame(index: usize) -> SpectralFrame {
        SpectralFrame::new(
            index,
            1,
            8000,
            vec![1.0, 0.5, 0.25],
            vec![0.1 * index as f64, 1.0 / 3.0, -2.5],
            vec![0.0, 2000.0, 4000.0],
        )
    }

    fn tiny_stream() -> AnalysisStream {
        AnalysisStream::new(tiny_metadata(1), vec![vec![tiny_frame(0), tiny_frame(1)]]).unwrap()
    }

    #[test]
    fn test_expected_frame_count() {
        assert_eq!(expected_frame_count(0, 1024, 256), 0);
        assert_eq!(expected_frame_count(1, 1024, 256), 1);
        assert_eq!(expected_frame_count(1024, 1024, 256), 1);
        assert_eq!(expected_frame_count(1025, 1024, 256), 2);
        assert_eq!(expected_frame_count(1280, 1024, 256), 2);
        assert_eq!(expected_frame_count(1281, 1024, 256), 3);
        assert_eq!(expected_frame_count(44100, 1024, 256), 170);
    }

    #[test]
    fn test_center_time() {
        let frame = SpectralFrame::new(4, 256, 44100, vec![], vec![], vec![]);
        assert!((frame.center_time - 4.0 * 256.0 / 44100.0).abs() < 1e-15);
    }

    #[test]
    fn test_stream_validation() {
        // Channel count mismatch
        assert!(AnalysisStream::new(tiny_metadata(2), vec![vec![tiny_frame(0)]]).is_err());
        // Out-of-order frames
        assert!(
            AnalysisStream::new(tiny_metadata(1), vec![vec![tiny_frame(1), tiny_frame(0)]])
                .is_err()
        );
        // Negative magnitude
        let mut bad = tiny_frame(1);
        bad.magnitudes[1] = -1.0;
        assert!(AnalysisStream::new(tiny_metadata(1), vec![vec![tiny_frame(0), bad]]).is_err());
        // Missing metadata
        let mut meta = tiny_metadata(1);
        meta.sample_rate = 0;
        assert!(AnalysisStream::new(meta, vec![vec![tiny_frame(0), tiny_frame(1)]]).is_err());
    }

    #[test]
    fn test_sample_count_bounded_by_frames() {
        // Two frames of 4 at hop 1 cover 5 samples
        assert_eq!(max_sample_count(2, 4, 1), Some(5));
        assert_eq!(max_sample_count(0, 4, 1), Some(0));
        assert_eq!(max_sample_count(usize::MAX, 4, 2), None);

        let mut meta = tiny_metadata(1);
        meta.sample_count = 6;
        let err = AnalysisStream::new(meta, vec![vec![tiny_frame(0), tiny_frame(1)]]).unwrap_err();
        assert!(matches!(err, OracleError::InvalidInput(_)));

        meta.sample_count = 1;
        assert!(AnalysisStream::new(meta, vec![vec![]]).is_err());
        meta.sample_count = 0;
        assert!(AnalysisStream::new(meta, vec![vec![]]).is_ok());
    }

    #[test]
    fn test_corrupt_sample_count_rejected_on_load() {
        let mut bytes = tiny_stream().to_bytes().unwrap();
        // sample_count sits just before the trailing frame count in the header
        let at = HEADER_LEN - 16;
        bytes[at..at + 8].copy_from_slice(&(1u64 << 62).to_le_bytes());
        assert!(matches!(
            AnalysisStream::from_bytes(&bytes),
            Err(OracleError::SerializationError(_))
        ));

        let json = tiny_stream().to_json().unwrap();
        let broken = json.replace("\"sample_count\":5", "\"sample_count\":4611686018427387904");
        assert_ne!(broken, json);
        assert!(matches!(
            AnalysisStream::from_json(&broken),
            Err(OracleError::SerializationError(_))
        ));
    }

    #[test]
    fn test_binary_round_trip_is_exact() {
        let stream = tiny_stream();
        let bytes = stream.to_bytes().unwrap();
        let loaded = AnalysisStream::from_bytes(&bytes).unwrap();
        assert_eq!(loaded, stream);
        assert_eq!(
            loaded.channel(0).unwrap()[1].phases[1].to_bits(),
            (1.0f64 / 3.0).to_bits()
        );
    }

    #[test]
    fn test_truncated_stream_rejected() {
        let bytes = tiny_stream().to_bytes().unwrap();
        for cut in [0, 3, HEADER_LEN - 1, HEADER_LEN + 5, bytes.len() - 1] {
            let err = AnalysisStream::from_bytes(&bytes[..cut]).unwrap_err();
            assert!(
                matches!(err, OracleError::SerializationError(_)),
                "cut at {} gave {:?}",
                cut,
                err
            );
        }
    }

    #[test]
    fn test_corrupt_stream_rejected() {
        let mut bytes = tiny_stream().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            AnalysisStream::from_bytes(&bytes),
            Err(OracleError::SerializationError(_))
        ));

        let mut bytes = tiny_stream().to_bytes().unwrap();
        bytes.push(0);
        assert!(matches!(
            AnalysisStream::from_bytes(&bytes),
            Err(OracleError::SerializationError(_))
        ));
    }

    #[test]
    fn test_json_round_trip_is_exact() {
        let stream = tiny_stream();
        let json = stream.to_json().unwrap();
        let loaded = AnalysisStream::from_json(&json).unwrap();
        assert_eq!(loaded, stream);
    }

    #[test]
    fn test_json_rejects_inconsistent_stream() {
        let json = tiny_stream().to_json().unwrap();
        let broken = json.replace("\"channel_count\":1", "\"channel_count\":3");
        let err = AnalysisStream::from_json(&broken).unwrap_err();
        assert!(matches!(err, OracleError::SerializationError(_)));
    }
}
