//! Response normalization
//!
//! Turns a provider response envelope into an ordered list of [`Segment`]s.
//! Chat completion envelopes are handled best-effort (a missing `choices`
//! field yields an empty list); the other two layouts fail on the first
//! malformed element.

use crate::models::{Envelope, ResponseShape, Segment};
use crate::{Error, Result};
use base64::Engine as _;
use serde_json::Value;
use tracing::{info, warn};

const PREVIEW_CHARS: usize = 500;

/// Normalize one envelope according to its declared shape.
pub fn normalize(envelope: &Envelope) -> Result<Vec<Segment>> {
    match envelope.shape {
        ResponseShape::ChatCompletion => Ok(from_chat_completion(&envelope.body)),
        ResponseShape::GenerateContent => from_generate_content(&envelope.body),
        ResponseShape::MessageContent => from_message_content(&envelope.body),
    }
}

/// Return the part of a data URI after its first comma.
///
/// Strings without a comma come back unchanged, so applying this to an
/// already-stripped payload is a no-op.
pub fn strip_data_uri(url: &str) -> &str {
    url.split_once(',').map_or(url, |(_, payload)| payload)
}

/// Read an inline image payload: base64 text is kept, raw bytes are encoded.
fn encode_payload(data: &Value) -> Option<String> {
    match data {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let bytes = items
                .iter()
                .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect::<Option<Vec<u8>>>()?;
            Some(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        _ => None,
    }
}

fn preview(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() > PREVIEW_CHARS {
        let head: String = rendered.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        rendered
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn shape_error(message: impl Into<String>, offending: &Value) -> Error {
    let message = message.into();
    warn!("{} (value: {})", message, preview(offending));
    Error::Shape(message)
}

fn from_chat_completion(body: &Value) -> Vec<Segment> {
    let Some(choices) = body.get("choices").and_then(Value::as_array) else {
        warn!("Response is not a chat completion envelope (no `choices` list)");
        warn!(
            "Response: {}",
            serde_json::to_string_pretty(body).unwrap_or_else(|_| preview(body))
        );
        return Vec::new();
    };

    let mut segments = Vec::new();

    for choice in choices {
        let Some(message) = choice.get("message") else {
            continue;
        };

        if let Some(text) = message.get("content").and_then(Value::as_str) {
            if !text.trim().is_empty() {
                segments.push(Segment::Text(text.to_string()));
            }
        }

        let Some(images) = message.get("images").and_then(Value::as_array) else {
            continue;
        };

        for item in images.iter().filter(|item| item.is_object()) {
            if item.get("type").and_then(Value::as_str) == Some("image_url") {
                let url = item
                    .pointer("/image_url/url")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if url.contains(',') {
                    let payload = strip_data_uri(url);
                    info!("Detected image data ({} chars)", payload.len());
                    segments.push(Segment::Image(payload.to_string()));
                }
            } else if let Some(payload) = item.get("base64").and_then(Value::as_str) {
                info!("Detected image data (direct base64, {} chars)", payload.len());
                segments.push(Segment::Image(payload.to_string()));
            }
        }
    }

    if segments.is_empty() {
        warn!("No text or image could be extracted from the response");
    }

    segments
}

fn from_generate_content(body: &Value) -> Result<Vec<Segment>> {
    let candidates = body
        .get("candidates")
        .ok_or_else(|| shape_error("response has no `candidates` field", body))?;

    let candidate = candidates
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| shape_error("`candidates` is empty", candidates))?;

    let content = candidate
        .get("content")
        .ok_or_else(|| shape_error("candidate has no `content` field", candidate))?;

    let parts = content
        .get("parts")
        .ok_or_else(|| shape_error("content has no `parts` field", content))?;

    let parts = parts
        .as_array()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| shape_error("`content.parts` is empty", parts))?;

    parts
        .iter()
        .enumerate()
        .map(|(idx, part)| {
            if let Some(text) = part
                .get("text")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
            {
                return Ok(Segment::Text(text.to_string()));
            }

            let payload = part
                .get("inline_data")
                .or_else(|| part.get("inlineData"))
                .and_then(|inline| inline.get("data"))
                .and_then(encode_payload);

            match payload {
                Some(payload) => {
                    info!("Detected image data ({} chars)", payload.len());
                    Ok(Segment::Image(payload))
                }
                None => Err(shape_error(
                    format!("part[{}] has an unexpected form", idx),
                    part,
                )),
            }
        })
        .collect()
}

fn from_message_content(body: &Value) -> Result<Vec<Segment>> {
    let content = match body {
        Value::Object(map) => map
            .get("content")
            .ok_or_else(|| shape_error("response has no `content` field", body))?,
        other => other,
    };

    let items = content
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| shape_error("response content is empty or not a list", content))?;

    let mut segments = Vec::with_capacity(items.len());

    for (idx, item) in items.iter().enumerate() {
        match item {
            Value::String(text) => {
                if !text.is_empty() {
                    segments.push(Segment::Text(text.clone()));
                }
            }
            Value::Object(map) => {
                let image_url = map
                    .get("image_url")
                    .filter(|v| v.is_object())
                    .ok_or_else(|| {
                        shape_error(format!("content[{}] image_url is not an object", idx), item)
                    })?;

                let url = image_url
                    .get("url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        shape_error(format!("content[{}] url is not a string", idx), item)
                    })?;

                if !url.contains(',') {
                    return Err(shape_error(
                        format!("content[{}] url contains no comma", idx),
                        item,
                    ));
                }

                let payload = strip_data_uri(url);
                info!("Detected image data ({} chars)", payload.len());
                segments.push(Segment::Image(payload.to_string()));
            }
            other => {
                return Err(shape_error(
                    format!("content[{}] has unexpected type {}", idx, json_type(other)),
                    other,
                ));
            }
        }
    }

    Ok(segments)
}
