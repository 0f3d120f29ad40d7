#![allow(dead_code)]

use std::f64::consts::PI;

use pvoc_oracle::SampleBuffer;

pub fn gen_sine<F>(freq_hz: f64, sr: u32, n: usize, amp_fn: F) -> Vec<f32>
where
    F: Fn(usize) -> f64,
{
    (0..n)
        .map(|i| {
            let phase = 2.0 * PI * freq_hz * i as f64 / sr as f64;
            (amp_fn(i) * phase.sin()) as f32
        })
        .collect()
}

pub fn gen_two_tone(
    freq_a: f64,
    amp_a: f64,
    freq_b: f64,
    amp_b: f64,
    sr: u32,
    n: usize,
) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let t = i as f64 / sr as f64;
            (amp_a * (2.0 * PI * freq_a * t).sin() + amp_b * (2.0 * PI * freq_b * t).sin()) as f32
        })
        .collect()
}

pub fn gen_impulse_train(period: usize, n: usize, amp: f32) -> Vec<f32> {
    let mut out = vec![0.0f32; n];
    if period == 0 {
        return out;
    }
    for i in (0..n).step_by(period) {
        out[i] = amp;
    }
    out
}

pub fn mono(data: Vec<f32>, sr: u32) -> SampleBuffer {
    SampleBuffer::mono(data, sr).unwrap()
}

pub fn sine_buffer(freq_hz: f64, sr: u32, n: usize, amp: f64) -> SampleBuffer {
    mono(gen_sine(freq_hz, sr, n, |_| amp), sr)
}

pub fn rms_diff(a: &[f32], b: &[f32]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let sum_sq: f64 = a[..len]
        .iter()
        .zip(&b[..len])
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    (sum_sq / len as f64).sqrt()
}

pub fn windowed_rms(signal: &[f32], start: usize, len: usize) -> f64 {
    if signal.is_empty() || len == 0 {
        return 0.0;
    }
    let start = start.min(signal.len());
    let end = (start + len).min(signal.len());
    if end <= start {
        return 0.0;
    }
    let sum_sq: f64 = signal[start..end]
        .iter()
        .map(|&s| {
            let v = s as f64;
            v * v
        })
        .sum();
    (sum_sq / (end - start) as f64).sqrt()
}

/// Frequency estimate from the zero-crossing rate over `signal[start..end]`.
pub fn zero_crossing_freq(signal: &[f32], sr: u32, start: usize, end: usize) -> f64 {
    let end = end.min(signal.len());
    if end <= start + 1 {
        return 0.0;
    }
    let crossings = signal[start..end]
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f64 / 2.0 / ((end - start) as f64 / sr as f64)
}
