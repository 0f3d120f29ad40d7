use crate::error::{OracleError, Result};

/// A single audio sample (32-bit float, nominal range -1.0 to 1.0).
pub type Sample = f32;

/// Immutable PCM container holding interleaved samples.
///
/// For mono audio, samples are stored sequentially: `[s0, s1, s2, ...]`
/// For multi-channel audio, samples are interleaved: `[L0, R0, L1, R1, ...]`
///
/// Every channel holds the same number of samples and every sample is finite.
/// Fields are private so a constructed buffer cannot be mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    data: Vec<Sample>,
    channels: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Create a new buffer from interleaved samples.
    ///
    /// # Errors
    /// Returns `OracleError::InvalidInput` if `channels` or `sample_rate` is 0,
    /// if the data length is not a multiple of `channels`, or if any sample
    /// is NaN or infinite.
    pub fn new(data: Vec<Sample>, channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(OracleError::InvalidInput(
                "channel count must be at least 1".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(OracleError::InvalidInput(
                "sample rate must be greater than 0".to_string(),
            ));
        }
        if data.len() % channels as usize != 0 {
            return Err(OracleError::InvalidInput(format!(
                "{} samples cannot be split evenly across {} channels",
                data.len(),
                channels
            )));
        }
        if let Some(pos) = data.iter().position(|s| !s.is_finite()) {
            return Err(OracleError::InvalidInput(format!(
                "non-finite sample at index {}",
                pos
            )));
        }
        Ok(Self {
            data,
            channels,
            sample_rate,
        })
    }

    /// Create a mono buffer.
    pub fn mono(data: Vec<Sample>, sample_rate: u32) -> Result<Self> {
        Self::new(data, 1, sample_rate)
    }

    /// Create a buffer from separate channel vectors.
    ///
    /// # Errors
    /// Returns error if no channels are given or channels have different lengths.
    pub fn from_channels(channels_data: &[Vec<Sample>], sample_rate: u32) -> Result<Self> {
        if channels_data.is_empty() || channels_data.len() > u16::MAX as usize {
            return Err(OracleError::InvalidInput(format!(
                "unsupported channel count {}",
                channels_data.len()
            )));
        }
        let num_frames = channels_data[0].len();
        if channels_data.iter().any(|ch| ch.len() != num_frames) {
            return Err(OracleError::InvalidInput(
                "all channels must have the same number of samples".to_string(),
            ));
        }
        let mut data = Vec::with_capacity(num_frames * channels_data.len());
        for i in 0..num_frames {
            for ch in channels_data {
                data.push(ch[i]);
            }
        }
        Self::new(data, channels_data.len() as u16, sample_rate)
    }

    /// Raw interleaved sample data.
    #[inline]
    pub fn data(&self) -> &[Sample] {
        &self.data
    }

    /// Number of channels.
    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples per channel.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.data.len() / self.channels as usize
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate as f64
    }

    /// Returns true if the buffer contains no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a single channel's data as a new vector.
    pub fn channel_data(&self, channel: u16) -> Vec<Sample> {
        if channel >= self.channels {
            return Vec::new();
        }
        self.data
            .iter()
            .skip(channel as usize)
            .step_by(self.channels as usize)
            .copied()
            .collect()
    }

    /// All channels, deinterleaved.
    pub fn to_channels(&self) -> Vec<Vec<Sample>> {
        (0..self.channels).map(|ch| self.channel_data(ch)).collect()
    }

    /// Returns a copy holding at most `frames` samples per channel.
    pub fn truncated(&self, frames: usize) -> SampleBuffer {
        let keep = frames.min(self.num_frames()) * self.channels as usize;
        SampleBuffer {
            data: self.data[..keep].to_vec(),
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Consumes the buffer and returns the interleaved data.
    pub fn into_data(self) -> Vec<Sample> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_mono() {
        let buf = SampleBuffer::new(vec![0.1, 0.2, 0.3], 1, 44100).unwrap();
        assert_eq!(buf.num_frames(), 3);
        assert!((buf.duration_secs() - 3.0 / 44100.0).abs() < 1e-10);
    }

    #[test]
    fn test_sample_buffer_multichannel() {
        let buf = SampleBuffer::new(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3, 48000).unwrap();
        assert_eq!(buf.num_frames(), 2);
        assert_eq!(buf.channel_data(2), vec![0.3, 0.6]);
    }

    #[test]
    fn test_sample_buffer_invalid_shape() {
        assert!(SampleBuffer::new(vec![0.1], 0, 44100).is_err());
        assert!(SampleBuffer::new(vec![0.1], 1, 0).is_err());
        assert!(SampleBuffer::new(vec![0.1, 0.2, 0.3], 2, 44100).is_err());
    }

    #[test]
    fn test_sample_buffer_rejects_non_finite() {
        let err = SampleBuffer::new(vec![0.0, f32::NAN], 1, 44100).unwrap_err();
        assert!(matches!(err, OracleError::InvalidInput(_)));
        assert!(SampleBuffer::new(vec![f32::INFINITY], 1, 44100).is_err());
    }

    #[test]
    fn test_channel_data_out_of_range() {
        let buf = SampleBuffer::new(vec![0.1, 0.2], 1, 44100).unwrap();
        assert!(buf.channel_data(1).is_empty());
    }

    #[test]
    fn test_from_channels_interleaves() {
        let left = vec![0.1, 0.3, 0.5];
        let right = vec![0.2, 0.4, 0.6];
        let buf = SampleBuffer::from_channels(&[left.clone(), right.clone()], 44100).unwrap();
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.data(), &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert_eq!(buf.to_channels(), vec![left, right]);
    }

    #[test]
    fn test_from_channels_mismatched() {
        let left = vec![0.1, 0.3];
        let right = vec![0.2, 0.4, 0.6];
        assert!(SampleBuffer::from_channels(&[left, right], 44100).is_err());
        assert!(SampleBuffer::from_channels(&[], 44100).is_err());
    }

    #[test]
    fn test_truncated() {
        let buf = SampleBuffer::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 44100).unwrap();
        let short = buf.truncated(2);
        assert_eq!(short.data(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buf.truncated(10), buf);
    }

    #[test]
    fn test_empty_buffer() {
        let buf = SampleBuffer::new(vec![], 2, 44100).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.num_frames(), 0);
    }
}
