// src/analysis/loudness.rs
//! Per-channel loudness readings for the VU and peak meters.

/// Full-scale reference for 16-bit samples.
pub const REFERENCE: f64 = 32768.0;
/// Loudest reading `linear_pct` maps to 100%.
pub const MAX_DB: f64 = 0.0;

/// Quietest non-zero reading a 16-bit sample can express, about -90.3 dB.
pub fn min_db() -> f64 {
    20.0 * (1.0 / REFERENCE).log10()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Loudness {
    /// Mean of the squared top eight bits of each sample.
    pub accumulated_power: i64,
    pub dbfs: f64,
    pub db: f64,
    pub linear_pct: u8,
}

impl Loudness {
    pub fn silent(floor_db: f64) -> Self {
        Self {
            accumulated_power: 0,
            dbfs: floor_db,
            db: floor_db,
            linear_pct: 0,
        }
    }
}

/// Measure one channel (0 = left, 1 = right) of interleaved stereo samples.
pub fn measure(samples: &[i16], channel: usize, floor_db: f64) -> Loudness {
    let mut count = 0u64;
    let mut sum_sq_coarse = 0i64;
    let mut sum_sq = 0f64;
    let mut sum_abs = 0u64;

    for &sample in samples.iter().skip(channel).step_by(2) {
        let coarse = i64::from(sample >> 8);
        sum_sq_coarse += coarse * coarse;
        sum_sq += f64::from(sample) * f64::from(sample);
        sum_abs += u64::from(sample.unsigned_abs());
        count += 1;
    }
    if count == 0 {
        return Loudness::silent(floor_db);
    }

    let rms = (sum_sq / count as f64).sqrt();
    let mean_abs = sum_abs as f64 / count as f64;
    let dbfs = to_db(rms).max(floor_db);
    let db = to_db(mean_abs).max(floor_db);

    let min = min_db();
    let linear = ((db - min) / (MAX_DB - min) * 100.0).clamp(0.0, 100.0);

    Loudness {
        accumulated_power: sum_sq_coarse / count as i64,
        dbfs,
        db,
        linear_pct: linear.round() as u8,
    }
}

fn to_db(level: f64) -> f64 {
    if level <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * (level / REFERENCE).log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_sits_on_the_floor() {
        let samples = vec![0i16; 4096];
        for ch in 0..2 {
            let l = measure(&samples, ch, -96.0);
            assert_eq!(l.accumulated_power, 0);
            assert_eq!(l.dbfs, -96.0);
            assert_eq!(l.db, -96.0);
            assert_eq!(l.linear_pct, 0);
        }
    }

    #[test]
    fn empty_input_is_silent() {
        assert_eq!(measure(&[], 0, -80.0), Loudness::silent(-80.0));
    }

    #[test]
    fn full_scale_square_wave() {
        let samples: Vec<i16> = (0..2048)
            .flat_map(|i| {
                let v = if i % 2 == 0 { i16::MAX } else { i16::MIN };
                [v, 0]
            })
            .collect();
        let left = measure(&samples, 0, -96.0);
        assert!(left.dbfs > -0.01 && left.dbfs <= 0.0);
        assert_eq!(left.linear_pct, 100);
        // (127² + 128²) / 2
        assert_eq!(left.accumulated_power, 16_256);

        let right = measure(&samples, 1, -96.0);
        assert_eq!(right.linear_pct, 0);
    }

    #[test]
    fn channels_are_independent() {
        let samples: Vec<i16> = (0..512).flat_map(|_| [1024i16, -8192]).collect();
        let left = measure(&samples, 0, -96.0);
        let right = measure(&samples, 1, -96.0);
        assert_eq!(left.accumulated_power, 16);
        assert_eq!(right.accumulated_power, 1024);
        assert!(right.dbfs > left.dbfs);
        assert!((right.dbfs - left.dbfs - 20.0 * 8f64.log10()).abs() < 1e-9);
    }

    #[test]
    fn min_db_matches_one_lsb() {
        assert!((min_db() + 90.309).abs() < 1e-3);
    }
}
