#![forbid(unsafe_code)]

//! JSONL transcripts of recorded stream events.
//!
//! A transcript is one JSON object per line with stable field order, so two
//! runs of a deterministic pipeline can be compared byte for byte.

use std::fmt;

use ripple_core::Completion;
use serde_json::{Value, json};

use crate::probe::ProbeEvent;

/// Render `events` as JSONL, tagging every line with `stream`.
///
/// Values and failures are rendered through `Debug`.
pub fn to_jsonl<T, E>(stream: &str, events: &[ProbeEvent<T, E>]) -> String
where
    T: fmt::Debug,
    E: fmt::Debug,
{
    let mut out = String::new();
    for (seq, event) in events.iter().enumerate() {
        let line = event_json(stream, seq, event);
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}

fn event_json<T: fmt::Debug, E: fmt::Debug>(
    stream: &str,
    seq: usize,
    event: &ProbeEvent<T, E>,
) -> Value {
    match event {
        ProbeEvent::Subscribed => json!({"stream": stream, "seq": seq, "event": "subscribed"}),
        ProbeEvent::Requested(demand) => json!({
            "stream": stream,
            "seq": seq,
            "event": "request",
            "demand": demand.to_string(),
        }),
        ProbeEvent::Value(value) => json!({
            "stream": stream,
            "seq": seq,
            "event": "value",
            "value": format!("{value:?}"),
        }),
        ProbeEvent::Completion(Completion::Finished) => {
            json!({"stream": stream, "seq": seq, "event": "finished"})
        }
        ProbeEvent::Completion(Completion::Failure(error)) => json!({
            "stream": stream,
            "seq": seq,
            "event": "failure",
            "error": format!("{error:?}"),
        }),
        ProbeEvent::Cancelled => json!({"stream": stream, "seq": seq, "event": "cancel"}),
    }
}
