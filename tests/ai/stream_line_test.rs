//! NDJSON stream line parsing tests.

use peyk::ai::http::{parse_stream_line, StreamEvent};
use peyk::ai::AiError;

#[test]
fn parse_delta_line() {
    let event = parse_stream_line(r#"{"delta": "سلام", "done": false}"#).expect("should parse");
    assert_eq!(event, StreamEvent::Delta("سلام".to_owned()));
}

#[test]
fn parse_delta_line_without_done_field() {
    let event = parse_stream_line(r#"{"delta": "!"}"#).expect("should parse");
    assert_eq!(event, StreamEvent::Delta("!".to_owned()));
}

#[test]
fn parse_done_marker() {
    let event = parse_stream_line(r#"{"done": true}"#).expect("should parse");
    assert_eq!(event, StreamEvent::Done);
}

#[test]
fn parse_backend_error_line() {
    let err = parse_stream_line(r#"{"error": "model overloaded"}"#).expect_err("should fail");
    assert!(matches!(err, AiError::InvalidResponse(msg) if msg == "model overloaded"));
}

#[test]
fn parse_rejects_invalid_json() {
    let err = parse_stream_line("delta: nope").expect_err("should fail");
    assert!(matches!(err, AiError::InvalidResponse(_)));
}

#[test]
fn parse_rejects_line_without_delta_or_done() {
    let err = parse_stream_line(r#"{"model": "x"}"#).expect_err("should fail");
    assert!(matches!(err, AiError::InvalidResponse(_)));
}
