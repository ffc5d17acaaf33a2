//! Splitting track notes into phrases
//!
//! Notes that touch end-to-start belong to the same phrase; any gap starts a
//! new one. Overlapping notes are left out entirely. Each phrase gets a
//! leading rest whose length is derived from the gap before it.

use serde::Serialize;
use sing_common::content_hash;
use sing_common::models::{Note, NoteId, PhraseKey, Tempo, TrackId};
use sing_common::music::{note_duration, second_to_tick, tick_to_second};
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::phrase::Phrase;
use crate::snapshot::Snapshot;

/// Fields that identify a phrase
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PhraseSource<'a> {
    first_rest_duration: f64,
    notes: &'a [Note],
    start_time: f64,
    track_id: TrackId,
}

/// Ids of notes that overlap at least one other note
pub fn overlapping_note_ids(notes: &[Note]) -> HashSet<NoteId> {
    let mut sorted: Vec<&Note> = notes.iter().collect();
    sorted.sort_by_key(|note| note.position);

    let mut overlapping = HashSet::new();
    for (i, note) in sorted.iter().enumerate() {
        for other in &sorted[i + 1..] {
            if other.position >= note.end() {
                break;
            }
            overlapping.insert(note.id);
            overlapping.insert(other.id);
        }
    }
    overlapping
}

/// Group notes into runs where each note ends exactly where the next begins
pub fn extract_phrase_notes(track_notes: &[Note]) -> Vec<Vec<Note>> {
    let mut phrase_notes = Vec::new();
    let mut current: Vec<Note> = Vec::new();

    for (i, note) in track_notes.iter().enumerate() {
        current.push(note.clone());

        let continues = track_notes
            .get(i + 1)
            .is_some_and(|next| note.end() == next.position);
        if !continues {
            phrase_notes.push(std::mem::take(&mut current));
        }
    }

    phrase_notes
}

/// Length in ticks of the rest placed before a phrase's first note
pub fn phrase_first_rest_duration(
    prev_phrase_last_note: Option<&Note>,
    phrase_first_note: &Note,
    first_rest_min_duration_seconds: f64,
    tempos: &[Tempo],
    tpqn: u32,
) -> f64 {
    let quarter_note_duration = note_duration(4, tpqn);

    let mut duration = match prev_phrase_last_note {
        None if phrase_first_note.position == 0 => quarter_note_duration,
        None => phrase_first_note.position as f64,
        Some(prev) => (phrase_first_note.position - prev.end()) as f64,
    };
    duration = duration.min(quarter_note_duration);

    let first_note_seconds = tick_to_second(phrase_first_note.position as f64, tempos, tpqn);
    let min_start_ticks = second_to_tick(
        first_note_seconds - first_rest_min_duration_seconds,
        tempos,
        tpqn,
    );
    duration = duration.max(phrase_first_note.position as f64 - min_start_ticks);

    duration.max(1.0)
}

/// Generate every track's phrases from a snapshot, keyed by content hash
pub fn generate_phrases(
    snapshot: &Snapshot,
    first_rest_min_duration_seconds: f64,
) -> Result<HashMap<PhraseKey, Phrase>> {
    let mut phrases = HashMap::new();

    for (track_id, track) in &snapshot.tracks {
        let overlapping = overlapping_note_ids(&track.notes);
        let mut track_notes: Vec<Note> = track
            .notes
            .iter()
            .filter(|note| !overlapping.contains(&note.id))
            .cloned()
            .collect();
        track_notes.sort_by_key(|note| note.position);

        let phrase_notes_list = extract_phrase_notes(&track_notes);
        let mut prev_last_note: Option<&Note> = None;
        for phrase_notes in &phrase_notes_list {
            let Some(first_note) = phrase_notes.first() else {
                continue;
            };
            let first_rest_duration = phrase_first_rest_duration(
                prev_last_note,
                first_note,
                first_rest_min_duration_seconds,
                &snapshot.tempos,
                snapshot.tpqn,
            );
            let start_time = tick_to_second(
                first_note.position as f64 - first_rest_duration,
                &snapshot.tempos,
                snapshot.tpqn,
            );

            let phrase_key = PhraseKey::new(content_hash(&PhraseSource {
                first_rest_duration,
                notes: phrase_notes,
                start_time,
                track_id: *track_id,
            })?);
            phrases.insert(
                phrase_key,
                Phrase::new(*track_id, first_rest_duration, phrase_notes.clone(), start_time),
            );

            prev_last_note = phrase_notes.last();
        }

        tracing::debug!(
            track_id = %track_id,
            phrases = phrase_notes_list.len(),
            excluded_overlapping = overlapping.len(),
            "Extracted phrases"
        );
    }

    Ok(phrases)
}
