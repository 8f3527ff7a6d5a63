use std::collections::VecDeque;

use super::constants::{
    DEFAULT_HISTORY, DELTA_START_INDEX, DELTA_STOP_INDEX, ROTOR_HALF_TURN_DEG,
};

/// Peak-to-peak value of a round, signed by orientation.
///
/// Positive when the minimum comes before the maximum, negative otherwise. NaN entries are
/// ignored; a row with nothing but NaN gives NaN.
pub fn ptp_orient(row: &[f64]) -> f64 {
    let mut min: Option<(usize, f64)> = None;
    let mut max: Option<(usize, f64)> = None;
    for (idx, value) in row.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        if min.map_or(true, |(_, m)| *value < m) {
            min = Some((idx, *value));
        }
        if max.map_or(true, |(_, m)| *value > m) {
            max = Some((idx, *value));
        }
    }
    match (min, max) {
        (Some((min_idx, min_val)), Some((max_idx, max_val))) => {
            if min_idx < max_idx {
                max_val - min_val
            } else {
                min_val - max_val
            }
        }
        _ => f64::NAN,
    }
}

/// Index of the first maximum, skipping NaN
pub fn argmax(row: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, value) in row.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| *value > b) {
            best = Some((idx, *value));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Discrete convolution trimmed to the centre, `max(N, M)` samples long.
///
/// Matches numpy's `convolve(a, v, mode="same")`, including which side gets the extra
/// sample when the kernel length is even.
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let m = kernel.len();
    if n == 0 || m == 0 {
        return Vec::new();
    }
    let full_len = n + m - 1;
    let out_len = n.max(m);
    let start = (n.min(m) - 1) / 2;

    let mut full = vec![0.0; full_len];
    for (i, s) in signal.iter().enumerate() {
        for (j, k) in kernel.iter().enumerate() {
            full[i + j] += s * k;
        }
    }
    full[start..start + out_len].to_vec()
}

/// Box-filter smoothing with `window` taps of weight `1/window`
pub fn moving_average(signal: &[f64], window: usize) -> Vec<f64> {
    if window == 0 {
        return signal.to_vec();
    }
    let kernel = vec![1.0 / window as f64; window];
    convolve_same(signal, &kernel)
}

/// Indices `i` where the next sample drops by more than `threshold` (a negative number)
pub fn steep_drops(series: &[f64], threshold: f64) -> Vec<usize> {
    series
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1] - pair[0] < threshold)
        .map(|(idx, _)| idx)
        .collect()
}

/// `count` evenly spaced points from `start` to `stop`, both ends included
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

/// How the live plot presents a round
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiveUnits {
    /// Sample index against the value as received
    Raw,
    /// Rotor phase in degrees against the electric field in kV/m
    Calibrated { midpoint: f64, kv_per_m: f64 },
}

impl LiveUnits {
    /// Horizontal position of sample `index` in a round of `len` samples. A round spans
    /// half a rotor turn.
    pub fn x(&self, index: usize, len: usize) -> f64 {
        match self {
            Self::Raw => index as f64,
            Self::Calibrated { .. } if len <= 1 => 0.0,
            Self::Calibrated { .. } => index as f64 * ROTOR_HALF_TURN_DEG / (len - 1) as f64,
        }
    }

    pub fn y(&self, value: f64) -> f64 {
        match self {
            Self::Raw => value,
            Self::Calibrated { midpoint, kv_per_m } => (value - midpoint) * kv_per_m,
        }
    }

    /// Plot points for a whole round
    pub fn points(&self, round: &[f64]) -> Vec<[f64; 2]> {
        round
            .iter()
            .enumerate()
            .map(|(idx, value)| [self.x(idx, round.len()), self.y(*value)])
            .collect()
    }
}

/// Rolling window of the most recent rounds, for the live plot.
///
/// Rounds may have different lengths; the average is taken over the common prefix.
#[derive(Debug, Clone)]
pub struct RoundHistory {
    capacity: usize,
    rounds: VecDeque<Vec<f64>>,
    delta_start: usize,
    delta_stop: usize,
}

impl Default for RoundHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl RoundHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rounds: VecDeque::new(),
            delta_start: DELTA_START_INDEX,
            delta_stop: DELTA_STOP_INDEX,
        }
    }

    pub fn with_markers(mut self, start: usize, stop: usize) -> Self {
        self.delta_start = start;
        self.delta_stop = stop;
        self
    }

    pub fn push(&mut self, values: &[i64]) {
        if self.rounds.len() == self.capacity {
            self.rounds.pop_front();
        }
        self.rounds
            .push_back(values.iter().map(|v| *v as f64).collect());
    }

    /// Every stored round except the latest, oldest first
    pub fn earlier(&self) -> impl Iterator<Item = &Vec<f64>> {
        self.rounds.iter().take(self.rounds.len().saturating_sub(1))
    }

    pub fn latest(&self) -> Option<&Vec<f64>> {
        self.rounds.back()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Change the window size, dropping the oldest rounds if it shrank
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.rounds.len() > self.capacity {
            self.rounds.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.rounds.clear();
    }

    pub fn markers(&self) -> (usize, usize) {
        (self.delta_start, self.delta_stop)
    }

    /// Element-wise mean over the stored rounds, truncated to the shortest one
    pub fn average(&self) -> Option<Vec<f64>> {
        let shortest = self.rounds.iter().map(|r| r.len()).min()?;
        let count = self.rounds.len() as f64;
        let mut sum = vec![0.0; shortest];
        for round in self.rounds.iter() {
            for (acc, value) in sum.iter_mut().zip(round.iter()) {
                *acc += value;
            }
        }
        Some(sum.into_iter().map(|s| s / count).collect())
    }

    /// Rounded difference between the two marker samples of a round, if it reaches them
    pub fn delta(&self, round: &[f64]) -> Option<i64> {
        let stop = round.get(self.delta_stop)?;
        let start = round.get(self.delta_start)?;
        Some((stop - start).round() as i64)
    }
}
