//! Reasoning-block filtering — strips `<think>…</think>`-style tags from
//! outbound text before it reaches the wire.
//!
//! Some agent backends leak internal chain-of-thought wrapped in tags such as
//! `<think>`, `<thinking>`, `<reasoning>`, or `<redacted_reasoning>`. When
//! enabled, the server strips these before serializing any outbound
//! `Message`, `Artifact`, or `Task` (its `status.message` and `history`).

use std::sync::OnceLock;

use regex::Regex;

use crate::types::{Message, Part, StreamResponse, Task};

fn reasoning_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?is)<think[^>]*>.*?</think>|<redacted_reasoning[^>]*>.*?</redacted_reasoning>|<reasoning[^>]*>.*?</reasoning>|<thinking[^>]*>.*?</thinking>",
        )
        .expect("reasoning filter pattern is a valid regex")
    })
}

/// Strip reasoning blocks from a single string. Non-matching text is
/// returned unchanged (including its allocation, via `Cow`-free passthrough
/// when there is nothing to strip).
pub fn strip_reasoning_blocks(text: &str) -> String {
    reasoning_pattern().replace_all(text, "").into_owned()
}

fn filter_parts(parts: &mut [Part]) {
    for part in parts.iter_mut() {
        if let Part::Text { text, .. } = part {
            *text = strip_reasoning_blocks(text);
        }
    }
}

/// Strip reasoning blocks from every text part of a message, in place.
pub fn filter_message(message: &mut Message) {
    filter_parts(&mut message.parts);
}

/// Strip reasoning blocks from a task's status message, history, and
/// artifact text parts, in place.
pub fn filter_task(task: &mut Task) {
    if let Some(ref mut message) = task.status.message {
        filter_message(message);
    }
    if let Some(ref mut history) = task.history {
        for message in history.iter_mut() {
            filter_message(message);
        }
    }
    if let Some(ref mut artifacts) = task.artifacts {
        for artifact in artifacts.iter_mut() {
            filter_parts(&mut artifact.parts);
        }
    }
}

/// Strip reasoning blocks from a streamed event in place, regardless of
/// which `StreamResponse` variant it carries.
pub fn filter_stream_response(event: &mut StreamResponse) {
    match event {
        StreamResponse::Task(task) => filter_task(task),
        StreamResponse::Message(message) => filter_message(message),
        StreamResponse::StatusUpdate(update) => {
            if let Some(ref mut message) = update.status.message {
                filter_message(message);
            }
        }
        StreamResponse::ArtifactUpdate(update) => {
            filter_parts(&mut update.artifact.parts);
        }
    }
}
