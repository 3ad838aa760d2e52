#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Integration tests for transcript assembly from recorded backend output.

use parley_core::events::{Backend, ContentBlock};
use parley_host::session::{MessageKind, SessionHandle, TranscriptUpdate};

const CLAUDE_TURN: &[&str] = &[
    r#"{"type":"system","subtype":"init","session_id":"s1","model":"m","slash_commands":["clear"]}"#,
    r#"{"type":"stream_event","event":{"type":"message_start","message":{}}}"#,
    r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}}"#,
    r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo"}}}"#,
    r#"{"type":"assistant","message":{"id":"msg_1","content":[{"type":"text","text":"Hello"}]}}"#,
    r#"{"type":"assistant","message":{"id":"msg_1","content":[{"type":"tool_use","id":"tu_1","name":"Bash","input":{"command":"ls"}}]}}"#,
    r#"{"type":"stream_event","event":{"type":"message_stop"}}"#,
    r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"tu_1","content":"a.rs"}]}}"#,
    r#"{"type":"stream_event","event":{"type":"message_start","message":{}}}"#,
    r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Done"}}}"#,
    r#"{"type":"assistant","message":{"id":"msg_2","content":[{"type":"text","text":"Done"}]}}"#,
    r#"{"type":"stream_event","event":{"type":"message_stop"}}"#,
    r#"{"type":"result","subtype":"success","session_id":"s1","usage":{"input_tokens":5,"output_tokens":7}}"#,
];

fn replay(backend: Backend, lines: &[&str]) -> (SessionHandle, Vec<TranscriptUpdate>) {
    let session = SessionHandle::new(backend);
    let mut updates = Vec::new();
    for line in lines {
        updates.extend(session.feed_line(line).unwrap());
    }
    (session, updates)
}

#[test]
fn claude_turn_assembles_without_duplicates() {
    let (session, updates) = replay(Backend::Claude, CLAUDE_TURN);
    let state = session.snapshot();

    let kinds: Vec<_> = state.messages.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![MessageKind::Assistant, MessageKind::User, MessageKind::Assistant]
    );

    let first = &state.messages[0];
    assert_eq!(first.content, "Hello");
    assert_eq!(first.blocks.len(), 2);
    assert!(first.has_tool_use("tu_1"));
    assert_eq!(state.messages[1].content, "a.rs");
    assert_eq!(state.messages[2].content, "Done");
    assert_eq!(state.messages[2].usage.map(|u| u.output_tokens), Some(7));

    assert_eq!(state.session_id.as_deref(), Some("s1"));
    let announced = updates
        .iter()
        .filter(|u| matches!(u, TranscriptUpdate::SessionId { .. }))
        .count();
    assert_eq!(announced, 1);
    assert!(!state.busy);
    assert!(!state.loading);
}

#[test]
fn same_deltas_give_same_transcript() {
    let (a, _) = replay(Backend::Claude, CLAUDE_TURN);
    let (b, _) = replay(Backend::Claude, CLAUDE_TURN);
    assert_eq!(a.snapshot().messages, b.snapshot().messages);
}

#[test]
fn text_after_tool_use_opens_new_block() {
    let (session, _) = replay(
        Backend::Native,
        &[
            r#"{"type":"stream_start"}"#,
            r#"{"type":"content_delta","text":"Reading"}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"/p/a"}}]}}"#,
            r#"{"type":"content_delta","text":"Done"}"#,
            r#"{"type":"stream_end"}"#,
        ],
    );
    let state = session.snapshot();
    assert_eq!(state.messages.len(), 1);
    let texts: Vec<_> = state.messages[0]
        .blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["Reading", "Done"]);
}

#[test]
fn internal_user_messages_stay_hidden() {
    let (session, _) = replay(
        Backend::Native,
        &[
            r#"{"type":"user","message":{"content":"<command-name>/clear</command-name>"}}"#,
            r#"{"type":"user","isMeta":true,"message":{"content":"caveat"}}"#,
            r#"{"type":"user","message":{"content":"fix the build"}}"#,
        ],
    );
    let state = session.snapshot();
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].content, "fix the build");
}
