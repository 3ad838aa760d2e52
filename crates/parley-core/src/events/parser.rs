//! Parser for the native agent event vocabulary.
//!
//! Implements tolerant reader pattern: unknown fields ignored, unknown kinds
//! surface as [`AgentEvent::Unknown`] instead of failing.

use serde_json::Value;

use super::types::{
    AgentEvent, AssistantEvent, ContentBlock, ResultEvent, SystemEvent, ToolResultEvent, Usage,
    UserEvent,
};
use crate::error::{Error, Result};

/// Parse a single NDJSON line in the native vocabulary.
pub fn parse_line(line: &str) -> Result<AgentEvent> {
    let raw: Value = serde_json::from_str(line)?;
    parse_value(&raw)
}

/// Parse a JSON value in the native vocabulary.
pub fn parse_value(raw: &Value) -> Result<AgentEvent> {
    let kind = raw
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::EventParse("Missing 'type' field".into()))?;

    let event = match kind {
        "assistant" => AgentEvent::Assistant(parse_assistant(raw)),
        "user" => AgentEvent::User(parse_user(raw)),
        "thinking" => AgentEvent::Thinking(text_payload(raw)),
        "content" => AgentEvent::Content(text_payload(raw)),
        "content_delta" => AgentEvent::ContentDelta(text_payload(raw)),
        "thinking_delta" => AgentEvent::ThinkingDelta(text_payload(raw)),
        "stream_start" => AgentEvent::StreamStart,
        "stream_end" => AgentEvent::StreamEnd,
        "message_end" => AgentEvent::MessageEnd,
        "session_id" => {
            let id = first_str(raw, &["session_id", "sessionId", "id", "value"])
                .ok_or_else(|| Error::EventParse("session_id event without an id".into()))?;
            AgentEvent::SessionId(id.to_string())
        }
        "tool_result" => AgentEvent::ToolResult(parse_tool_result_event(raw)?),
        "result" => AgentEvent::Result(parse_result(raw)),
        "slash_commands" => AgentEvent::SlashCommands(parse_slash_commands(raw)),
        "system" => AgentEvent::System(parse_system(raw)),
        other => AgentEvent::Unknown {
            kind: other.to_string(),
            payload: raw.clone(),
        },
    };
    Ok(event)
}

/// First string value among `keys`.
pub(crate) fn first_str<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| raw.get(*k).and_then(Value::as_str))
}

fn text_payload(raw: &Value) -> String {
    first_str(raw, &["text", "delta", "content", "thinking"])
        .unwrap_or("")
        .to_string()
}

pub(crate) fn parse_assistant(raw: &Value) -> AssistantEvent {
    let msg = raw.get("message").unwrap_or(raw);
    AssistantEvent {
        id: msg.get("id").and_then(Value::as_str).map(String::from),
        content: parse_content_blocks(msg.get("content")),
        usage: msg.get("usage").map(|u| parse_usage(Some(u))),
    }
}

pub(crate) fn parse_user(raw: &Value) -> UserEvent {
    let msg = raw.get("message").unwrap_or(raw);
    let is_meta = raw
        .get("isMeta")
        .or_else(|| raw.get("is_meta"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    UserEvent {
        content: parse_content_blocks(msg.get("content")),
        is_meta,
    }
}

/// Parse a provider content array (or a bare string) into blocks.
pub(crate) fn parse_content_blocks(content: Option<&Value>) -> Vec<ContentBlock> {
    match content {
        Some(Value::String(text)) => vec![ContentBlock::Text { text: text.clone() }],
        Some(Value::Array(arr)) => arr.iter().filter_map(parse_content_block).collect(),
        _ => Vec::new(),
    }
}

fn parse_content_block(block: &Value) -> Option<ContentBlock> {
    let block_type = block.get("type")?.as_str()?;
    match block_type {
        "text" => {
            let text = block.get("text")?.as_str()?.to_string();
            Some(ContentBlock::Text { text })
        }
        "thinking" => {
            let text = first_str(block, &["thinking", "text"])?.to_string();
            Some(ContentBlock::Thinking { text })
        }
        "tool_use" | "server_tool_use" => {
            let id = block.get("id")?.as_str()?.to_string();
            let name = block.get("name")?.as_str()?.to_string();
            let input = block.get("input").cloned().unwrap_or(Value::Null);
            Some(ContentBlock::ToolUse { id, name, input })
        }
        "tool_result" => {
            let tool_use_id = first_str(block, &["tool_use_id", "toolUseId"])?.to_string();
            Some(ContentBlock::ToolResult {
                tool_use_id,
                output: flatten_tool_output(block.get("content").or_else(|| block.get("output"))),
                is_error: block
                    .get("is_error")
                    .or_else(|| block.get("isError"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        }
        _ => None,
    }
}

/// Tool output is either a string or a list of text blocks.
pub(crate) fn flatten_tool_output(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub(crate) fn parse_usage(val: Option<&Value>) -> Usage {
    val.and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn parse_tool_result_event(raw: &Value) -> Result<ToolResultEvent> {
    let tool_use_id = first_str(raw, &["tool_use_id", "toolUseId", "id"])
        .ok_or_else(|| Error::EventParse("tool_result without tool_use_id".into()))?
        .to_string();
    Ok(ToolResultEvent {
        tool_use_id,
        output: flatten_tool_output(raw.get("content").or_else(|| raw.get("output"))),
        is_error: raw
            .get("is_error")
            .or_else(|| raw.get("isError"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

pub(crate) fn parse_result(raw: &Value) -> ResultEvent {
    let subtype = raw.get("subtype").and_then(Value::as_str).unwrap_or("success");
    let is_error = raw
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false)
        || subtype.starts_with("error");

    let error = is_error.then(|| {
        raw.get("errors")
            .and_then(Value::as_array)
            .map(|errs| {
                errs.iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|s| !s.is_empty())
            .or_else(|| first_str(raw, &["error", "result"]).map(String::from))
            .unwrap_or_else(|| format!("Agent turn failed ({subtype})"))
    });

    ResultEvent {
        session_id: first_str(raw, &["session_id", "sessionId"]).map(String::from),
        usage: raw.get("usage").map(|u| parse_usage(Some(u))),
        duration_ms: raw.get("duration_ms").and_then(Value::as_u64).unwrap_or(0),
        cost_usd: raw
            .get("total_cost_usd")
            .or_else(|| raw.get("cost_usd"))
            .and_then(Value::as_f64),
        is_error,
        error,
    }
}

pub(crate) fn parse_slash_commands(raw: &Value) -> Vec<String> {
    raw.get("commands")
        .or_else(|| raw.get("slash_commands"))
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|c| c.as_str().or_else(|| c.get("name").and_then(Value::as_str)))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_system(raw: &Value) -> SystemEvent {
    SystemEvent {
        subtype: raw
            .get("subtype")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        session_id: first_str(raw, &["session_id", "sessionId"]).map(String::from),
        model: raw.get("model").and_then(Value::as_str).map(String::from),
    }
}
