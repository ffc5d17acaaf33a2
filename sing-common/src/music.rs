//! Tempo-aware timing conversions and small numeric helpers
//!
//! Score positions are expressed in ticks (`tpqn` ticks per quarter note).
//! A tempo map is a list of [`Tempo`] changes sorted by position; each tempo
//! applies from its position until the next change, and the last tempo
//! extends indefinitely. Positions before the first change use the first
//! tempo.

use crate::models::Tempo;

fn tick_to_second_for_constant_bpm(ticks: f64, bpm: f64, tpqn: u32) -> f64 {
    let quarter_notes_per_second = bpm / 60.0;
    ticks / tpqn as f64 / quarter_notes_per_second
}

fn second_to_tick_for_constant_bpm(seconds: f64, bpm: f64, tpqn: u32) -> f64 {
    let quarter_notes_per_second = bpm / 60.0;
    seconds * quarter_notes_per_second * tpqn as f64
}

/// Convert a tick position to seconds using the tempo map
///
/// An empty tempo map is treated as a constant [`DEFAULT_BPM`].
pub fn tick_to_second(ticks: f64, tempos: &[Tempo], tpqn: u32) -> f64 {
    let Some(last) = tempos.last() else {
        return tick_to_second_for_constant_bpm(ticks, DEFAULT_BPM, tpqn);
    };

    let mut time_of_tempo = 0.0;
    let mut tempo = last;
    for (i, current) in tempos.iter().enumerate() {
        let Some(next) = tempos.get(i + 1) else {
            break;
        };
        if next.position as f64 > ticks {
            tempo = current;
            break;
        }
        time_of_tempo += tick_to_second_for_constant_bpm(
            (next.position - current.position) as f64,
            current.bpm,
            tpqn,
        );
    }

    time_of_tempo
        + tick_to_second_for_constant_bpm(ticks - tempo.position as f64, tempo.bpm, tpqn)
}

/// Convert seconds to a (fractional) tick position using the tempo map
pub fn second_to_tick(seconds: f64, tempos: &[Tempo], tpqn: u32) -> f64 {
    let Some(last) = tempos.last() else {
        return second_to_tick_for_constant_bpm(seconds, DEFAULT_BPM, tpqn);
    };

    let mut time_of_tempo = 0.0;
    let mut tempo = last;
    for (i, current) in tempos.iter().enumerate() {
        let Some(next) = tempos.get(i + 1) else {
            break;
        };
        let time_of_next_tempo = time_of_tempo
            + tick_to_second_for_constant_bpm(
                (next.position - current.position) as f64,
                current.bpm,
                tpqn,
            );
        if time_of_next_tempo > seconds {
            tempo = current;
            break;
        }
        time_of_tempo = time_of_next_tempo;
    }

    tempo.position as f64
        + second_to_tick_for_constant_bpm(seconds - time_of_tempo, tempo.bpm, tpqn)
}

/// Default score resolution (ticks per quarter note)
pub const DEFAULT_TPQN: u32 = 480;

/// Default tempo in beats per minute
pub const DEFAULT_BPM: f64 = 120.0;

/// Length in ticks of a note type (4 = quarter note, 8 = eighth note, ...)
pub fn note_duration(note_type: u32, tpqn: u32) -> f64 {
    (tpqn as f64 * 4.0) / note_type as f64
}

/// Decibels to a linear gain factor
pub fn decibel_to_linear(decibel: f64) -> f64 {
    10f64.powf(decibel / 20.0)
}

/// Value at `x` on the line through `(x1, y1)` and `(x2, y2)`
pub fn linear_interpolation(x1: f64, y1: f64, x2: f64, y2: f64, x: f64) -> f64 {
    if x2 == x1 {
        return y1;
    }
    y1 + ((y2 - y1) * (x - x1)) / (x2 - x1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempo(position: i64, bpm: f64) -> Tempo {
        Tempo { position, bpm }
    }

    #[test]
    fn test_constant_tempo() {
        let tempos = vec![tempo(0, 120.0)];
        // 120 BPM: one quarter note = 0.5s
        assert!((tick_to_second(480.0, &tempos, 480) - 0.5).abs() < 1e-12);
        assert!((second_to_tick(0.5, &tempos, 480) - 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_change() {
        let tempos = vec![tempo(0, 120.0), tempo(960, 60.0)];
        // First two quarters at 120 BPM = 1s, next quarter at 60 BPM = 1s
        assert!((tick_to_second(1440.0, &tempos, 480) - 2.0).abs() < 1e-12);
        assert!((second_to_tick(2.0, &tempos, 480) - 1440.0).abs() < 1e-9);
        // Before the change
        assert!((tick_to_second(480.0, &tempos, 480) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_negative_ticks_extrapolate_first_tempo() {
        let tempos = vec![tempo(0, 120.0)];
        assert!((tick_to_second(-480.0, &tempos, 480) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip_across_changes() {
        let tempos = vec![tempo(0, 150.0), tempo(1000, 90.0), tempo(3000, 200.0)];
        for ticks in [0.0, 500.0, 1000.0, 2500.0, 5000.0] {
            let secs = tick_to_second(ticks, &tempos, 480);
            assert!((second_to_tick(secs, &tempos, 480) - ticks).abs() < 1e-6);
        }
    }

    #[test]
    fn test_decibel_to_linear() {
        assert!((decibel_to_linear(0.0) - 1.0).abs() < 1e-12);
        assert!((decibel_to_linear(20.0) - 10.0).abs() < 1e-12);
        assert!((decibel_to_linear(-6.0) - 0.501187).abs() < 1e-5);
    }

    #[test]
    fn test_linear_interpolation() {
        assert_eq!(linear_interpolation(0.0, 1.0, 4.0, 0.0, 0.0), 1.0);
        assert_eq!(linear_interpolation(0.0, 1.0, 4.0, 0.0, 4.0), 0.0);
        assert_eq!(linear_interpolation(0.0, 1.0, 4.0, 0.0, 2.0), 0.5);
    }

    #[test]
    fn test_note_duration() {
        assert_eq!(note_duration(4, 480), 480.0);
        assert_eq!(note_duration(8, 480), 240.0);
    }
}
