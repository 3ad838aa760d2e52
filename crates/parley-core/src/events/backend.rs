//! Backend adapters.
//!
//! Each backend speaks its own JSON-lines dialect. Adapters translate one
//! provider line into zero or more events of the shared vocabulary so the
//! assemblers never see provider shapes.

use std::str::FromStr;

use serde_json::{Value, json};

use super::parser::{
    first_str, flatten_tool_output, parse_assistant, parse_result, parse_slash_commands,
    parse_system, parse_usage, parse_user, parse_value,
};
use super::types::{
    AgentEvent, AssistantEvent, ContentBlock, ResultEvent, ToolResultEvent, Usage,
};
use crate::error::{Error, Result};

/// Supported agent backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Lines already in the shared vocabulary.
    #[default]
    Native,
    /// Claude Code `--output-format stream-json`.
    Claude,
    /// Codex `exec --json`.
    Codex,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            other => Err(Error::Config(format!("unknown backend: {other}"))),
        }
    }
}

impl Backend {
    /// Translate one provider line into vocabulary events.
    ///
    /// Blank lines yield no events.
    pub fn parse_line(self, line: &str) -> Result<Vec<AgentEvent>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Value = serde_json::from_str(trimmed)?;
        match self {
            Self::Native => parse_value(&raw).map(|e| vec![e]),
            Self::Claude => Ok(claude_events(&raw)),
            Self::Codex => Ok(codex_events(&raw)),
        }
    }

    /// Whether the backend streams deltas (and so needs the full assembler).
    pub const fn streams_deltas(self) -> bool {
        !matches!(self, Self::Codex)
    }
}

fn unknown(kind: &str, raw: &Value) -> AgentEvent {
    AgentEvent::Unknown {
        kind: kind.to_string(),
        payload: raw.clone(),
    }
}

fn claude_events(raw: &Value) -> Vec<AgentEvent> {
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or("");
    match kind {
        "system" => {
            let system = parse_system(raw);
            let mut events = Vec::new();
            if system.subtype == "init" {
                if let Some(id) = &system.session_id {
                    events.push(AgentEvent::SessionId(id.clone()));
                }
                let commands = parse_slash_commands(raw);
                if !commands.is_empty() {
                    events.push(AgentEvent::SlashCommands(commands));
                }
            }
            events.push(AgentEvent::System(system));
            events
        }
        "assistant" => vec![AgentEvent::Assistant(parse_assistant(raw))],
        "user" => vec![AgentEvent::User(parse_user(raw))],
        "result" => vec![AgentEvent::Result(parse_result(raw))],
        "stream_event" => claude_stream_event(raw),
        _ => vec![unknown(kind, raw)],
    }
}

fn claude_stream_event(raw: &Value) -> Vec<AgentEvent> {
    let event = raw.get("event").unwrap_or(raw);
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or("");
    match event_type {
        "message_start" => vec![AgentEvent::StreamStart],
        "message_stop" => vec![AgentEvent::MessageEnd],
        "content_block_delta" => {
            let delta = event.get("delta").unwrap_or(&Value::Null);
            match delta.get("type").and_then(Value::as_str).unwrap_or("") {
                "text_delta" => first_str(delta, &["text"])
                    .filter(|t| !t.is_empty())
                    .map(|t| vec![AgentEvent::ContentDelta(t.to_string())])
                    .unwrap_or_default(),
                "thinking_delta" => first_str(delta, &["thinking", "text"])
                    .filter(|t| !t.is_empty())
                    .map(|t| vec![AgentEvent::ThinkingDelta(t.to_string())])
                    .unwrap_or_default(),
                _ => Vec::new(),
            }
        }
        // Block start/stop, message_delta and input_json deltas carry nothing
        // the transcript needs; the matching `assistant` line has the content.
        _ => Vec::new(),
    }
}

fn codex_events(raw: &Value) -> Vec<AgentEvent> {
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or("");
    match kind {
        "thread.started" => first_str(raw, &["thread_id"])
            .map(|id| vec![AgentEvent::SessionId(id.to_string())])
            .unwrap_or_default(),
        "turn.started" => vec![AgentEvent::StreamStart],
        "turn.completed" => {
            let usage = raw.get("usage").map(codex_usage);
            vec![
                AgentEvent::Result(ResultEvent {
                    usage,
                    ..ResultEvent::default()
                }),
                AgentEvent::StreamEnd,
            ]
        }
        "turn.failed" | "error" => {
            let message = raw
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .or_else(|| first_str(raw, &["message"]))
                .unwrap_or("Codex turn failed");
            vec![
                AgentEvent::Result(ResultEvent {
                    is_error: true,
                    error: Some(message.to_string()),
                    ..ResultEvent::default()
                }),
                AgentEvent::StreamEnd,
            ]
        }
        "item.completed" => raw.get("item").map(codex_item).unwrap_or_default(),
        "item.started" | "item.updated" => Vec::new(),
        _ => vec![unknown(kind, raw)],
    }
}

fn codex_usage(raw: &Value) -> Usage {
    let mut usage = parse_usage(Some(raw));
    if let Some(cached) = raw.get("cached_input_tokens").and_then(Value::as_u64) {
        usage.cache_read_input_tokens = u32::try_from(cached).unwrap_or(u32::MAX);
    }
    usage
}

fn codex_item(item: &Value) -> Vec<AgentEvent> {
    let item_type = item.get("type").and_then(Value::as_str).unwrap_or("");
    let id = item
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let text = || first_str(item, &["text"]).unwrap_or("").to_string();

    match item_type {
        "agent_message" => vec![assistant_block(ContentBlock::Text { text: text() })],
        "reasoning" => vec![assistant_block(ContentBlock::Thinking { text: text() })],
        "command_execution" => {
            let command = first_str(item, &["command"]).unwrap_or("");
            let failed = matches!(
                item.get("status").and_then(Value::as_str),
                Some("failed" | "declined")
            ) || item
                .get("exit_code")
                .and_then(Value::as_i64)
                .is_some_and(|code| code != 0);
            tool_pair(
                id,
                "Bash",
                json!({ "command": command }),
                flatten_tool_output(item.get("aggregated_output")),
                failed,
            )
        }
        "file_change" => {
            let failed = item.get("status").and_then(Value::as_str) == Some("failed");
            let changes = item.get("changes").cloned().unwrap_or(Value::Null);
            let summary = changes
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(|c| {
                            let path = c.get("path").and_then(Value::as_str)?;
                            let kind = c.get("kind").and_then(Value::as_str).unwrap_or("update");
                            Some(format!("{kind} {path}"))
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();
            tool_pair(id, "Edit", json!({ "changes": changes }), summary, failed)
        }
        "mcp_tool_call" => {
            let server = first_str(item, &["server"]).unwrap_or("mcp");
            let tool = first_str(item, &["tool"]).unwrap_or("tool");
            let failed = item.get("status").and_then(Value::as_str) == Some("failed");
            let input = item.get("arguments").cloned().unwrap_or(Value::Null);
            let output = item
                .get("result")
                .map(|r| flatten_tool_output(r.get("content").or(Some(r))))
                .or_else(|| {
                    item.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(Value::as_str)
                        .map(String::from)
                })
                .unwrap_or_default();
            tool_pair(id, &format!("mcp__{server}__{tool}"), input, output, failed)
        }
        _ => vec![unknown(item_type, item)],
    }
}

fn assistant_block(block: ContentBlock) -> AgentEvent {
    AgentEvent::Assistant(AssistantEvent {
        id: None,
        content: vec![block],
        usage: None,
    })
}

fn tool_pair(id: String, name: &str, input: Value, output: String, is_error: bool) -> Vec<AgentEvent> {
    vec![
        assistant_block(ContentBlock::ToolUse {
            id: id.clone(),
            name: name.to_string(),
            input,
        }),
        AgentEvent::ToolResult(ToolResultEvent {
            tool_use_id: id,
            output,
            is_error,
        }),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn claude_init_yields_session_and_commands() {
        let line = r#"{"type":"system","subtype":"init","session_id":"abc","model":"m","slash_commands":["clear","compact"]}"#;
        let events = Backend::Claude.parse_line(line).unwrap();
        assert_eq!(events[0], AgentEvent::SessionId("abc".into()));
        assert_eq!(
            events[1],
            AgentEvent::SlashCommands(vec!["clear".into(), "compact".into()])
        );
        assert!(matches!(events[2], AgentEvent::System(_)));
    }

    #[test]
    fn claude_stream_events_map_to_deltas() {
        let start = r#"{"type":"stream_event","event":{"type":"message_start","message":{}}}"#;
        let text = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}}"#;
        let think = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}}"#;
        let json_delta = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{"}}}"#;
        let stop = r#"{"type":"stream_event","event":{"type":"message_stop"}}"#;

        assert_eq!(Backend::Claude.parse_line(start).unwrap(), vec![AgentEvent::StreamStart]);
        assert_eq!(
            Backend::Claude.parse_line(text).unwrap(),
            vec![AgentEvent::ContentDelta("Hi".into())]
        );
        assert_eq!(
            Backend::Claude.parse_line(think).unwrap(),
            vec![AgentEvent::ThinkingDelta("hmm".into())]
        );
        assert!(Backend::Claude.parse_line(json_delta).unwrap().is_empty());
        assert_eq!(Backend::Claude.parse_line(stop).unwrap(), vec![AgentEvent::MessageEnd]);
    }

    #[test]
    fn codex_command_becomes_tool_use_and_result() {
        let line = r#"{"type":"item.completed","item":{"id":"item_3","type":"command_execution","command":"ls","aggregated_output":"a\nb","exit_code":1,"status":"completed"}}"#;
        let events = Backend::Codex.parse_line(line).unwrap();
        assert_eq!(events.len(), 2);
        let AgentEvent::Assistant(assistant) = &events[0] else {
            panic!("expected assistant");
        };
        assert!(assistant.has_tool_use());
        assert_eq!(
            events[1],
            AgentEvent::ToolResult(ToolResultEvent {
                tool_use_id: "item_3".into(),
                output: "a\nb".into(),
                is_error: true,
            })
        );
    }

    #[test]
    fn codex_turn_lifecycle() {
        assert_eq!(
            Backend::Codex
                .parse_line(r#"{"type":"thread.started","thread_id":"t-1"}"#)
                .unwrap(),
            vec![AgentEvent::SessionId("t-1".into())]
        );
        let done = Backend::Codex
            .parse_line(r#"{"type":"turn.completed","usage":{"input_tokens":10,"cached_input_tokens":4,"output_tokens":2}}"#)
            .unwrap();
        let AgentEvent::Result(result) = &done[0] else {
            panic!("expected result");
        };
        let usage = result.usage.unwrap();
        assert_eq!((usage.input_tokens, usage.cache_read_input_tokens), (10, 4));
        assert_eq!(done[1], AgentEvent::StreamEnd);
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(Backend::Native.parse_line("   ").unwrap().is_empty());
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("Claude".parse::<Backend>().unwrap(), Backend::Claude);
        assert!("gpt".parse::<Backend>().is_err());
    }
}
