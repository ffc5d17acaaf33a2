//! Overlay of user pitch edits onto a generated query
//!
//! Edits are absolute-frame pitch values (Hz) at the editor frame rate. They
//! are applied in log-f0 space as a difference from the generated curve, and
//! each boundary between edited and unedited frames is ramped over a short
//! transition so the join is not audible as a step. Where possible the
//! transition is pushed onto neighbouring unvoiced frames, which keeps pitch
//! gestures (scoops, falls) on voiced frames intact.

use sing_common::models::{FrameAudioQuery, UNVOICED_PHONEMES, VALUE_INDICATING_NO_DATA};
use sing_common::music::linear_interpolation;

use crate::error::{Error, Result};

/// f0 values below this are treated as unpitched (log would diverge)
const MIN_VALID_F0: f64 = 1e-5;

/// Nominal length of an edit boundary transition
const BASE_TRANSITION_LENGTH_MS: f64 = 60.0;

#[derive(Debug, Clone, Copy)]
struct FrameInfo {
    is_edited: bool,
    is_voiced: bool,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    boundary: usize,
    left: usize,
    right: usize,
}

/// Round half up, matching how frame positions are quantized elsewhere
pub(crate) fn round_frame(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Apply `pitch_edit_data` to `query.f0` in place
///
/// # Arguments
/// * `query` - Query to modify (callers pass a clone of the cached artifact)
/// * `phrase_start_time` - Seconds from score start to the query's frame 0
/// * `pitch_edit_data` - Absolute-frame edit curve, `-1` where unedited
/// * `editor_frame_rate` - Frame rate of the edit curve
pub fn apply_pitch_edit(
    query: &mut FrameAudioQuery,
    phrase_start_time: f64,
    pitch_edit_data: &[f64],
    editor_frame_rate: f64,
) -> Result<()> {
    if query.frame_rate != editor_frame_rate {
        return Err(Error::PitchEdit(format!(
            "query frame rate {} does not match editor frame rate {}",
            query.frame_rate, editor_frame_rate
        )));
    }

    let frame_phonemes: Vec<String> = query
        .frame_phonemes()
        .into_iter()
        .map(str::to_string)
        .collect();
    if query.f0.len() != frame_phonemes.len() {
        return Err(Error::PitchEdit(format!(
            "f0 has {} frames but phonemes cover {}",
            query.f0.len(),
            frame_phonemes.len()
        )));
    }

    let query_start_frame = round_frame(phrase_start_time * query.frame_rate);
    let query_end_frame = query_start_frame + query.f0.len() as i64;

    let base_transition_length =
        round_frame(BASE_TRANSITION_LENGTH_MS / 1000.0 * query.frame_rate).max(0) as usize;

    for (range_start, range_end) in
        valid_pitch_ranges(&query.f0, query_start_frame, query_end_frame)
    {
        let mut frame_infos = Vec::with_capacity((range_end - range_start) as usize);
        let mut log_f0 = Vec::with_capacity(frame_infos.capacity());
        let mut log_f0_diff = Vec::with_capacity(frame_infos.capacity());

        for frame in range_start..range_end {
            let index_in_phrase = (frame - query_start_frame) as usize;
            let is_voiced = !UNVOICED_PHONEMES.contains(&frame_phonemes[index_in_phrase].as_str());

            let edit_value = if is_voiced && (frame as usize) < pitch_edit_data.len() {
                pitch_edit_data[frame as usize]
            } else {
                VALUE_INDICATING_NO_DATA
            };
            let is_edited = edit_value != VALUE_INDICATING_NO_DATA;
            let original_log_f0 = query.f0[index_in_phrase].ln();

            frame_infos.push(FrameInfo {
                is_edited,
                is_voiced,
            });
            log_f0.push(original_log_f0);
            log_f0_diff.push(if is_edited {
                edit_value.ln() - original_log_f0
            } else {
                0.0
            });
        }

        if !frame_infos.iter().any(|info| info.is_edited) {
            continue;
        }

        let transitions = edit_transitions(&frame_infos, base_transition_length);
        smooth_transitions(&mut log_f0_diff, &transitions);

        for (i, (value, diff)) in log_f0.iter().zip(&log_f0_diff).enumerate() {
            let index_in_phrase = (range_start - query_start_frame) as usize + i;
            query.f0[index_in_phrase] = (value + diff).exp();
        }
    }

    Ok(())
}

/// Absolute-frame `[start, end)` runs where f0 is usable, clipped at frame 0
fn valid_pitch_ranges(f0: &[f64], query_start_frame: i64, query_end_frame: i64) -> Vec<(i64, i64)> {
    let mut ranges = Vec::new();
    let mut current_start: Option<i64> = None;

    for frame in query_start_frame.max(0)..query_end_frame {
        let value = f0[(frame - query_start_frame) as usize];
        if value >= MIN_VALID_F0 {
            current_start.get_or_insert(frame);
        } else if let Some(start) = current_start.take() {
            ranges.push((start, frame));
        }
    }
    if let Some(start) = current_start {
        ranges.push((start, query_end_frame));
    }
    ranges
}

/// Boundaries between edited and unedited frames with their ramp extents
fn edit_transitions(frame_infos: &[FrameInfo], base_transition_length: usize) -> Vec<Transition> {
    let mut transitions = Vec::new();

    for i in 1..frame_infos.len() {
        let current = frame_infos[i];
        let prev = frame_infos[i - 1];
        if current.is_edited == prev.is_edited {
            continue;
        }

        let mut left = base_transition_length / 2;
        let mut right = base_transition_length / 2;

        if current.is_edited {
            // Unedited → edited: look back for an unvoiced frame
            let prev_index = i - 1;
            let mut distance = 0;
            while distance < right && distance <= prev_index {
                if !frame_infos[prev_index - distance].is_voiced {
                    left += right - distance;
                    right = distance;
                    break;
                }
                distance += 1;
            }
        } else {
            // Edited → unedited: look ahead for an unvoiced frame
            let mut distance = 0;
            while distance < left && i + distance < frame_infos.len() {
                if !frame_infos[i + distance].is_voiced {
                    right += left - distance;
                    left = distance;
                    break;
                }
                distance += 1;
            }
        }

        if left != 0 || right != 0 {
            transitions.push(Transition {
                boundary: i,
                left,
                right,
            });
        }
    }

    transitions
}

/// Cross-fade the diff curve across each boundary.
///
/// Inside `[boundary - left, boundary + right)` the value blends from the
/// left side's curve (held at its last value past the boundary) to the right
/// side's curve (held at its first value before the boundary).
fn smooth_transitions(diff: &mut [f64], transitions: &[Transition]) {
    let len = diff.len();
    for transition in transitions {
        let start = transition.boundary.saturating_sub(transition.left);
        let end = (transition.boundary + transition.right).min(len);
        if end <= start {
            continue;
        }

        let source = diff.to_vec();
        let left_hold = source[transition.boundary - 1];
        let right_hold = source[transition.boundary.min(len - 1)];
        let span = (end - start) as f64;

        for i in start..end {
            let left_value = if i < transition.boundary { source[i] } else { left_hold };
            let right_value = if i >= transition.boundary { source[i] } else { right_hold };
            let weight = linear_interpolation(0.0, 0.0, span, 1.0, (i - start) as f64 + 0.5);
            diff[i] = left_value * (1.0 - weight) + right_value * weight;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sing_common::models::FramePhoneme;

    fn query(phonemes: &[(&str, i64)], f0: f64) -> FrameAudioQuery {
        let total: i64 = phonemes.iter().map(|(_, n)| n).sum();
        FrameAudioQuery {
            f0: phonemes
                .iter()
                .flat_map(|(p, n)| {
                    let value = if *p == "pau" { 0.0 } else { f0 };
                    std::iter::repeat(value).take(*n as usize)
                })
                .collect(),
            volume: vec![1.0; total as usize],
            phonemes: phonemes
                .iter()
                .map(|(p, n)| FramePhoneme {
                    phoneme: p.to_string(),
                    frame_length: *n,
                    note_id: None,
                })
                .collect(),
            volume_scale: 1.0,
            output_sampling_rate: 24000,
            output_stereo: false,
            frame_rate: 93.75,
        }
    }

    #[test]
    fn test_frame_rate_mismatch_is_error() {
        let mut q = query(&[("pau", 2), ("a", 4)], 220.0);
        let result = apply_pitch_edit(&mut q, 0.0, &[], 100.0);
        assert!(matches!(result, Err(Error::PitchEdit(_))));
    }

    #[test]
    fn test_no_edits_leaves_curve_unchanged() {
        let mut q = query(&[("pau", 2), ("a", 20), ("pau", 2)], 220.0);
        let before = q.f0.clone();
        apply_pitch_edit(&mut q, 0.0, &[VALUE_INDICATING_NO_DATA; 24], 93.75).unwrap();
        for (a, b) in before.iter().zip(&q.f0) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fully_edited_voiced_run_takes_edit_values() {
        let mut q = query(&[("pau", 2), ("a", 20), ("pau", 2)], 220.0);
        let edits = vec![440.0; 24];
        apply_pitch_edit(&mut q, 0.0, &edits, 93.75).unwrap();

        // Unvoiced frames untouched
        assert_eq!(q.f0[0], 0.0);
        assert_eq!(q.f0[23], 0.0);
        for value in &q.f0[2..22] {
            assert!((value - 440.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_edit_is_aligned_by_phrase_start_time() {
        let mut q = query(&[("a", 10)], 220.0);
        // Phrase starts at frame 10 (10 / 93.75 seconds)
        let mut edits = vec![VALUE_INDICATING_NO_DATA; 10];
        edits.extend(vec![330.0; 10]);
        apply_pitch_edit(&mut q, 10.0 / 93.75, &edits, 93.75).unwrap();
        for value in &q.f0 {
            assert!((value - 330.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_partial_edit_is_smoothed_at_boundary() {
        let mut q = query(&[("a", 40)], 200.0);
        let mut edits = vec![VALUE_INDICATING_NO_DATA; 20];
        edits.extend(vec![400.0; 20]);
        apply_pitch_edit(&mut q, 0.0, &edits, 93.75).unwrap();

        // Far from the boundary: original and edited values
        assert!((q.f0[5] - 200.0).abs() < 1e-6);
        assert!((q.f0[35] - 400.0).abs() < 1e-6);
        // Around the boundary: strictly between, and monotonic
        assert!(q.f0[19] > 200.0 && q.f0[19] < 400.0);
        assert!(q.f0[20] > 200.0 && q.f0[20] < 400.0);
        for i in 15..25 {
            assert!(q.f0[i + 1] >= q.f0[i] - 1e-9);
        }
    }

    #[test]
    fn test_transition_moves_onto_unvoiced_frames() {
        let infos: Vec<FrameInfo> = [
            (false, false),
            (false, true),
            (true, true),
            (true, true),
        ]
        .iter()
        .map(|&(is_edited, is_voiced)| FrameInfo { is_edited, is_voiced })
        .collect();
        let transitions = edit_transitions(&infos, 6);
        assert_eq!(transitions.len(), 1);
        // Unvoiced frame at distance 1 behind the boundary: right shrinks to 1
        assert_eq!(transitions[0].boundary, 2);
        assert_eq!(transitions[0].right, 1);
        assert_eq!(transitions[0].left, 5);
    }
}
