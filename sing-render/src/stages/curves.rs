//! Post-processing of f0 and volume curves

use sing_common::models::{FramePhoneme, PAU};
use sing_common::music::{decibel_to_linear, linear_interpolation};

use crate::error::{Error, Result};
use crate::pitch_edit::round_frame;

/// Multiply every f0 value by `2^(pitch_shift / 12)`
pub fn shift_pitch(f0: &mut [f64], pitch_shift: f64) {
    let factor = 2f64.powf(pitch_shift / 12.0);
    for value in f0 {
        *value *= factor;
    }
}

/// Multiply every volume value by the linear gain of `volume_shift` dB
pub fn shift_volume(volume: &mut [f64], volume_shift: f64) {
    let factor = decibel_to_linear(volume_shift);
    for value in volume {
        *value *= factor;
    }
}

/// Silence the trailing `pau` so breath noise does not overlap the next phrase
///
/// The first `round(fade_out_duration_seconds * frame_rate)` frames of the
/// trailing pau (clamped to its length) fade linearly to zero, and the rest
/// of the pau is zeroed. A zero fade mutes immediately.
pub fn mute_last_pau_section(
    volume: &mut [f64],
    phonemes: &[FramePhoneme],
    frame_rate: f64,
    fade_out_duration_seconds: f64,
) -> Result<()> {
    let (last_phoneme, others) = phonemes
        .split_last()
        .filter(|(last, _)| last.phoneme == PAU)
        .ok_or_else(|| Error::Engine("no pau exists at the end of the query".to_string()))?;

    let last_pau_start_frame = others.iter().map(|p| p.frame_length).sum::<i64>().max(0) as usize;
    let last_pau_frame_length = last_phoneme.frame_length.max(0) as usize;
    if last_pau_start_frame + last_pau_frame_length > volume.len() {
        return Err(Error::Engine(format!(
            "phonemes cover {} frames but volume has {}",
            last_pau_start_frame + last_pau_frame_length,
            volume.len()
        )));
    }

    let fade_out_frame_length = round_frame(fade_out_duration_seconds * frame_rate)
        .clamp(0, last_pau_frame_length as i64) as usize;

    let pau = &mut volume[last_pau_start_frame..last_pau_start_frame + last_pau_frame_length];
    if fade_out_frame_length == 1 {
        pau[0] *= 0.5;
    } else {
        for (i, value) in pau[..fade_out_frame_length].iter_mut().enumerate() {
            *value *= linear_interpolation(
                0.0,
                1.0,
                (fade_out_frame_length - 1) as f64,
                0.0,
                i as f64,
            );
        }
    }
    for value in &mut pau[fade_out_frame_length..] {
        *value = 0.0;
    }

    Ok(())
}
