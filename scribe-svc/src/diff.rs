//! Sentence diff engine
//!
//! Pure functions turning an edited topic body into the minimal set of
//! per-sentence updates and deletes. Identity is positional (`topicID` +
//! line index), so a reordering edit is indistinguishable from a bulk
//! rewrite followed by truncation; that trade-off is deliberate.

use scribe_common::db::models::Sentence;
use std::collections::BTreeMap;

/// Per-sentence update instructions for one edit cycle.
///
/// `Some(text)` replaces or appends the sentence; `None` is a tombstone.
pub type InstructionSet = BTreeMap<String, Option<String>>;

/// Split edited topic text into a positional sentence map.
///
/// One bullet point per line; each line is trimmed and keyed by
/// `topic_id` + line index. Whitespace-only input yields an empty map.
pub fn split_minutes(text: &str, topic_id: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if text.trim().is_empty() {
        return map;
    }
    for (index, line) in text.split('\n').enumerate() {
        map.insert(format!("{}{}", topic_id, index), line.trim().to_string());
    }
    map
}

/// Build the same positional map from a stored sentence list.
pub fn index_sentences(sentences: &[Sentence]) -> BTreeMap<String, String> {
    sentences
        .iter()
        .map(|s| (s.sentence_id.clone(), s.text.clone()))
        .collect()
}

/// Diff edited text against the stored sentences of the same topic.
///
/// Emits an update for every identity whose text is new or changed, and a
/// tombstone for every stored identity whose positional index falls beyond
/// the new line count. Re-diffing unchanged text yields an empty set.
pub fn diff(new_text: &str, topic_id: &str, existing: &[Sentence]) -> InstructionSet {
    let new_map = split_minutes(new_text, topic_id);
    if new_map.is_empty() {
        return InstructionSet::new();
    }
    let old_map = index_sentences(existing);
    let new_len = new_map.len() as u64;

    let mut instructions = InstructionSet::new();

    for (sentence_id, text) in &new_map {
        match old_map.get(sentence_id) {
            Some(old_text) if old_text == text => {}
            _ => {
                instructions.insert(sentence_id.clone(), Some(text.clone()));
            }
        }
    }

    // Positional truncation: identities at or past the new line count no
    // longer exist.
    for sentence_id in old_map.keys() {
        if let Some(ordinal) = sentence_ordinal(sentence_id, topic_id) {
            if ordinal >= new_len {
                instructions.insert(sentence_id.clone(), None);
            }
        }
    }

    instructions
}

/// Numeric positional index of a sentence identity.
///
/// The only defined ordering over identities: suffix widths vary, so
/// lexicographic comparison is meaningless (`t12` sorts after `t110`).
pub fn sentence_ordinal(sentence_id: &str, topic_id: &str) -> Option<u64> {
    sentence_id.strip_prefix(topic_id)?.parse().ok()
}

/// Sort instruction-set keys by positional index for application order.
pub fn ordered_ids<'a, I>(ids: I, topic_id: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut ids: Vec<String> = ids.into_iter().cloned().collect();
    ids.sort_by_key(|id| sentence_ordinal(id, topic_id).unwrap_or(u64::MAX));
    ids
}
