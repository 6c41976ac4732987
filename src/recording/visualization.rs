//! Live waveform and level metering.
//!
//! The waveform is a polyline over a fixed-size window of the most recent
//! samples: sample index maps to x, normalized amplitude maps to y.

use std::collections::VecDeque;

/// Rolling window of the newest mono samples.
#[derive(Debug, Clone)]
pub struct MonitorWindow {
    samples: VecDeque<i16>,
    capacity: usize,
}

impl MonitorWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends samples, dropping the oldest beyond capacity.
    pub fn extend(&mut self, data: &[i16]) {
        let skip = data.len().saturating_sub(self.capacity);
        for &sample in &data[skip..] {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }

    pub fn samples(&self) -> Vec<i16> {
        self.samples.iter().copied().collect()
    }
}

/// Returns exactly `size` amplitudes in [-1, 1] from the newest samples,
/// zero-padded at the front when fewer are available.
pub fn amplitude_window(samples: &[i16], size: usize) -> Vec<f64> {
    let available = samples.len().min(size);
    let recent = &samples[samples.len() - available..];

    let mut window = vec![0.0; size - available];
    window.extend(recent.iter().map(|&s| s as f64 / 32768.0));
    window
}

/// Maps a window of amplitudes to drawing coordinates.
///
/// Uses screen orientation (y grows downwards) on a `width` x `height`
/// surface. The last point returns to the centre line at the right edge.
pub fn trace_points(window: &[f64], width: f64, height: f64, padding_y: f64) -> Vec<(f64, f64)> {
    let mid = height / 2.0;
    let slice_width = if window.is_empty() {
        0.0
    } else {
        width / window.len() as f64
    };

    let mut points: Vec<(f64, f64)> = window
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64 * slice_width, -v * (mid - padding_y) + mid))
        .collect();
    points.push((width, mid));
    points
}

/// Thins a polyline down to at most `max_points`, always keeping both ends.
pub fn decimate(points: &[(f64, f64)], max_points: usize) -> Vec<(f64, f64)> {
    if points.len() <= max_points || max_points < 2 {
        return points.to_vec();
    }

    let step = (points.len() - 1) as f64 / (max_points - 1) as f64;
    (0..max_points)
        .map(|i| points[((i as f64 * step).round() as usize).min(points.len() - 1)])
        .collect()
}

/// Volume and 3-second peak hold for the footer meter.
#[derive(Debug)]
pub struct LevelMeter {
    reference_level_db: i8,
    last_volume: u8,
    peak_hold: u8,
    peak_hold_time: std::time::Instant,
}

impl LevelMeter {
    pub fn new(reference_level_db: i8) -> Self {
        Self {
            reference_level_db,
            last_volume: 0,
            peak_hold: 0,
            peak_hold_time: std::time::Instant::now(),
        }
    }

    /// Measures the last 50 ms and updates the peak hold.
    pub fn update(&mut self, samples: &[i16], sample_rate: u32) -> u8 {
        let volume = volume_percent(samples, sample_rate, self.reference_level_db);
        self.last_volume = volume;

        if volume > self.peak_hold || self.peak_hold_time.elapsed().as_secs() >= 3 {
            self.peak_hold = volume;
            self.peak_hold_time = std::time::Instant::now();
        }
        volume
    }

    pub fn volume(&self) -> u8 {
        self.last_volume
    }

    pub fn peak(&self) -> u8 {
        self.peak_hold
    }
}

/// RMS level of the last 50 ms as a percentage of the reference level.
///
/// The scale spans 40 dB below the reference and is clamped to 4..=100, so
/// silence still shows a sliver. Returns 0 for no samples.
pub fn volume_percent(samples: &[i16], sample_rate: u32, reference_level_db: i8) -> u8 {
    if samples.is_empty() {
        return 0;
    }

    let count = ((sample_rate / 20) as usize).clamp(1, samples.len());
    let recent = &samples[samples.len() - count..];

    let sum_of_squares: i64 = recent.iter().map(|&x| (x as i64).pow(2)).sum();
    let rms = ((sum_of_squares / recent.len() as i64) as f32).sqrt();

    let db_fs = if rms > 0.0 {
        20.0 * (rms / 32767.0).log10()
    } else {
        -160.0
    };

    let min_db = reference_level_db as f32 - 40.0;
    ((db_fs - min_db) / 40.0 * 100.0).clamp(4.0, 100.0) as u8
}
