//! Per-message emotion classification through a chat-completion model.

mod openai;

pub use openai::{OpenAiClassifier, DEFAULT_BASE_URL, DEFAULT_MODEL};

use tracing::warn;

use crate::types::{
    Classification, ClassificationFailure, ClassificationOutcome, SentimentScores, NO_SENTIMENT,
};

/// Maximum concepts kept from one reply.
pub const MAX_CONCEPTS: usize = 3;

/// Fixed instruction sent as the system message. The reply grammar
/// `parse_reply` accepts depends on this text.
pub const SYSTEM_PROMPT: &str = "You rate the emotional content of social media posts. \
Reply in exactly this format, with one integer from 0 to 9 for each emotion \
and one to three short concepts the post is about:
happiness:<0-9>
sadness:<0-9>
anger:<0-9>
fear:<0-9>
surprise:<0-9>
disgust:<0-9>
concepts:<comma,separated,1-3,terms>
If the post carries no sentiment, reply with exactly: NO SENTIMENT";

/// Classifies one message. Implementations never fail: every problem is
/// reported as a `ClassificationOutcome::Failure`.
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
pub trait Classifier {
    async fn classify(&self, text: &str) -> ClassificationOutcome;
}

/// Parse a model reply against the instruction grammar.
///
/// Labels are located anywhere in the reply, in any order, at a word
/// boundary and followed by a colon. A reply missing any score label is
/// malformed and carries the whole reply as its reason.
pub fn parse_reply(reply: &str) -> ClassificationOutcome {
    if reply.trim() == NO_SENTIMENT {
        return ClassificationOutcome::Failure(ClassificationFailure::NoSentiment);
    }

    // ASCII folding keeps byte offsets aligned with `reply`.
    let lower = reply.to_ascii_lowercase();

    let mut values = [0.0; 6];
    for (slot, label) in values.iter_mut().zip(SentimentScores::LABELS) {
        match label_values(&lower, label).find_map(|(_, at)| leading_number(&reply[at..])) {
            Some(v) => *slot = v,
            None => {
                warn!(reply = %reply, label, "classifier reply missing score field");
                return ClassificationOutcome::Failure(ClassificationFailure::Malformed {
                    reply: reply.to_string(),
                });
            }
        }
    }

    ClassificationOutcome::Success(Classification {
        scores: SentimentScores::from_array(values),
        concepts: concepts_value(reply, &lower)
            .map(split_concepts)
            .unwrap_or_default(),
    })
}

/// `(label start, value start)` for each `label:` in `lower`, where the label
/// is a whole word and only spaces or tabs sit before the colon.
fn label_values<'a>(lower: &'a str, label: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
    lower.match_indices(label).filter_map(move |(start, _)| {
        let before = lower[..start].chars().next_back();
        if before.is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return None;
        }
        let value = lower[start + label.len()..]
            .trim_start_matches(|c: char| c == ' ' || c == '\t')
            .strip_prefix(':')?;
        Some((start, lower.len() - value.len()))
    })
}

/// Text after the first `concepts:`, up to the end of its line or the next
/// score label, whichever comes first.
fn concepts_value<'a>(reply: &'a str, lower: &str) -> Option<&'a str> {
    let (_, start) = label_values(lower, "concepts").next()?;
    let mut end = reply[start..]
        .find(|c: char| c == '\n' || c == '\r')
        .map_or(reply.len(), |i| start + i);
    for label in SentimentScores::LABELS {
        if let Some((next, _)) = label_values(lower, label).find(|(pos, _)| *pos >= start) {
            end = end.min(next);
        }
    }
    Some(&reply[start..end])
}

/// Leading signed decimal number of `value`, e.g. `" 7 (high)"` → 7.0.
/// Exponent notation is read whole (`1e1` → 10.0).
fn leading_number(value: &str) -> Option<f64> {
    let value = value.trim_start();
    let bytes = value.as_bytes();
    let digits_from = |mut i: usize, dot: bool| {
        while bytes
            .get(i)
            .is_some_and(|b| b.is_ascii_digit() || (dot && *b == b'.'))
        {
            i += 1;
        }
        i
    };

    let sign = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let mut end = digits_from(sign, true);
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        if bytes.get(exp).is_some_and(u8::is_ascii_digit) {
            end = digits_from(exp, false);
        }
    }
    value[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Trimmed, non-empty concepts, de-duplicated on their lower-cased form.
fn split_concepts(raw: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(MAX_CONCEPTS);
    let mut concepts: Vec<String> = Vec::with_capacity(MAX_CONCEPTS);
    for concept in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if concepts.len() == MAX_CONCEPTS {
            break;
        }
        let key = concept.to_lowercase();
        if !seen.contains(&key) {
            seen.push(key);
            concepts.push(concept.to_string());
        }
    }
    concepts
}
