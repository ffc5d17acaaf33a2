//! Conversion of phrase notes into the engine's frame-based note list

use sing_common::models::{EngineNote, Note, Tempo};
use sing_common::music::tick_to_second;

use crate::pitch_edit::round_frame;

fn tick_to_frame(ticks: f64, tempos: &[Tempo], tpqn: u32, frame_rate: f64) -> i64 {
    round_frame(tick_to_second(ticks, tempos, tpqn) * frame_rate)
}

/// Build the engine request notes for a phrase
///
/// The result is a leading rest of `first_rest_duration` ticks, one entry
/// per note, and a trailing rest of `last_rest_duration_seconds`. Frame
/// lengths are taken from rounded absolute frame positions so adjacent
/// phrases quantize identically. Any segment shorter than one frame is
/// padded to one frame, taking the difference from the following segment.
///
/// `notes` must not be empty.
pub fn create_notes_for_request_to_engine(
    first_rest_duration: f64,
    last_rest_duration_seconds: f64,
    notes: &[Note],
    tempos: &[Tempo],
    tpqn: u32,
    frame_rate: f64,
) -> Vec<EngineNote> {
    let mut engine_notes = Vec::with_capacity(notes.len() + 2);

    if let Some(first_note) = notes.first() {
        let first_rest_start_frame = tick_to_frame(
            first_note.position as f64 - first_rest_duration,
            tempos,
            tpqn,
            frame_rate,
        );
        let first_rest_end_frame =
            tick_to_frame(first_note.position as f64, tempos, tpqn, frame_rate);
        engine_notes.push(EngineNote::rest(first_rest_end_frame - first_rest_start_frame));
    }

    for note in notes {
        let note_on_frame = tick_to_frame(note.position as f64, tempos, tpqn, frame_rate);
        let note_off_frame = tick_to_frame(note.end() as f64, tempos, tpqn, frame_rate);
        engine_notes.push(EngineNote {
            id: Some(note.id),
            key: Some(note.note_number),
            frame_length: note_off_frame - note_on_frame,
            lyric: note.lyric.clone(),
        });
    }

    engine_notes.push(EngineNote::rest(round_frame(
        last_rest_duration_seconds * frame_rate,
    )));

    let count = engine_notes.len();
    for i in 0..count {
        let frame_to_shift = (1 - engine_notes[i].frame_length).max(0);
        engine_notes[i].frame_length += frame_to_shift;
        if i + 1 < count {
            engine_notes[i + 1].frame_length -= frame_to_shift;
        }
    }

    engine_notes
}

/// Transpose every keyed note by `key_shift` semitones; rests are untouched
pub fn shift_key_of_notes(notes: &mut [EngineNote], key_shift: i32) {
    for key in notes.iter_mut().filter_map(|note| note.key.as_mut()) {
        *key += key_shift;
    }
}
