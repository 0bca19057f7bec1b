//! Orchestrator terminal-state tests with fake collaborators.

use peyk::ai::{AiError, ModelPreference};
use peyk::audit::AuditReason;
use peyk::relay::{RelayOutcome, FALLBACK_TEXT};

use crate::fakes::{
    harness, harness_with, inbound, lock, student, FakeCredentials, FakeResolver, Script,
    SendEvent,
};

#[tokio::test]
async fn streams_answer_to_chat() {
    let h = harness(
        Some(student(1)),
        Some("111111:tok"),
        vec![Script::chunks(&["سلام", "!", " خوبم"])],
    );

    let outcome = h.relay.process(inbound("123", "سلام", 1)).await;

    assert!(matches!(
        outcome,
        RelayOutcome::Delivered {
            chunks: 3,
            sends: 1,
            send_failures: 0
        }
    ));
    assert_eq!(
        *lock(&h.sent),
        vec![
            SendEvent::Typing {
                chat: "123".to_owned()
            },
            SendEvent::Text {
                chat: "123".to_owned(),
                text: "سلام! خوبم".to_owned()
            },
        ]
    );
    assert!(lock(&h.audits).is_empty());

    let queries = lock(&h.queries);
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].user_id, 7);
    assert_eq!(queries[0].school_id, 1);
    assert_eq!(queries[0].role, "student");
    assert_eq!(queries[0].text, "سلام");
    assert_eq!(queries[0].model_preference, ModelPreference::Cloud);
}

#[tokio::test]
async fn unmatched_sender_sees_nothing() {
    let h = harness(None, Some("111111:tok"), Vec::new());

    let outcome = h.relay.process(inbound("123", "سلام", 1)).await;

    assert!(matches!(
        outcome,
        RelayOutcome::Unmatched(AuditReason::UnmatchedUser)
    ));
    assert!(lock(&h.sent).is_empty(), "anonymous senders get no reply");
    assert!(lock(&h.queries).is_empty(), "no AI query for unmatched senders");

    let audits = lock(&h.audits);
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].reason, AuditReason::UnmatchedUser);
    assert_eq!(audits[0].external_chat_id, "123");
    assert_eq!(audits[0].raw_text, "سلام");
}

#[tokio::test]
async fn tenant_mismatch_is_unmatched() {
    // The binding belongs to school 2, the webhook claims school 1.
    let h = harness(Some(student(2)), Some("111111:tok"), Vec::new());

    let outcome = h.relay.process(inbound("123", "سلام", 1)).await;

    assert!(matches!(
        outcome,
        RelayOutcome::Unmatched(AuditReason::UnmatchedUser)
    ));
    assert!(lock(&h.sent).is_empty());
    assert_eq!(lock(&h.audits).len(), 1);
}

#[tokio::test]
async fn missing_token_is_unmatched() {
    let h = harness(Some(student(1)), None, Vec::new());

    let outcome = h.relay.process(inbound("123", "سلام", 1)).await;

    assert!(matches!(
        outcome,
        RelayOutcome::Unmatched(AuditReason::MissingBotToken)
    ));
    assert!(lock(&h.sent).is_empty(), "not even a typing indicator");

    let audits = lock(&h.audits);
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].reason, AuditReason::MissingBotToken);
}

#[tokio::test]
async fn resolver_failure_degrades_to_unmatched() {
    let h = harness_with(
        FakeResolver {
            user: None,
            fail: true,
        },
        FakeCredentials {
            token: Some("111111:tok".to_owned()),
            fail: false,
        },
        Vec::new(),
        false,
    );

    let outcome = h.relay.process(inbound("123", "سلام", 1)).await;

    assert!(matches!(
        outcome,
        RelayOutcome::Unmatched(AuditReason::UnmatchedUser)
    ));
    assert!(lock(&h.sent).is_empty());
    assert_eq!(lock(&h.audits).len(), 1);
}

#[tokio::test]
async fn credential_store_failure_degrades_to_unmatched() {
    let h = harness_with(
        FakeResolver {
            user: Some(student(1)),
            fail: false,
        },
        FakeCredentials {
            token: None,
            fail: true,
        },
        Vec::new(),
        false,
    );

    let outcome = h.relay.process(inbound("123", "سلام", 1)).await;

    assert!(matches!(
        outcome,
        RelayOutcome::Unmatched(AuditReason::MissingBotToken)
    ));
    assert!(lock(&h.sent).is_empty());
}

#[tokio::test]
async fn empty_stream_then_error_sends_exactly_one_fallback() {
    let h = harness(
        Some(student(1)),
        Some("111111:tok"),
        vec![Script::error(AiError::Unreachable("connection refused".to_owned()))],
    );

    let outcome = h.relay.process(inbound("123", "سلام", 1)).await;

    assert!(matches!(outcome, RelayOutcome::AiFailed { chunks: 0 }));
    let sent = lock(&h.sent);
    let texts: Vec<_> = sent
        .iter()
        .filter_map(|e| match e {
            SendEvent::Text { text, .. } => Some(text.as_str()),
            SendEvent::Typing { .. } => None,
        })
        .collect();
    assert_eq!(texts, vec![FALLBACK_TEXT], "never zero, never more than one");
}

#[tokio::test]
async fn partial_stream_then_error_sends_one_fallback() {
    let h = harness(
        Some(student(1)),
        Some("111111:tok"),
        vec![Script {
            delay: std::time::Duration::ZERO,
            items: vec![Ok("نیمی از پاسخ".to_owned()), Err(AiError::Timeout)],
        }],
    );

    let outcome = h.relay.process(inbound("123", "سلام", 1)).await;

    assert!(matches!(outcome, RelayOutcome::AiFailed { chunks: 1 }));
    let sent = lock(&h.sent);
    let texts: Vec<_> = sent
        .iter()
        .filter(|e| matches!(e, SendEvent::Text { .. }))
        .collect();
    assert_eq!(texts.len(), 1);
}

#[tokio::test]
async fn send_failure_still_completes_the_update() {
    let h = harness_with(
        FakeResolver {
            user: Some(student(1)),
            fail: false,
        },
        FakeCredentials {
            token: Some("111111:tok".to_owned()),
            fail: false,
        },
        vec![Script::chunks(&["پاسخ"])],
        true,
    );

    let outcome = h.relay.process(inbound("123", "سلام", 1)).await;

    // The platform rejected the send; the update is still terminal and no
    // retry happened.
    assert!(matches!(
        outcome,
        RelayOutcome::Delivered {
            chunks: 1,
            sends: 0,
            send_failures: 1
        }
    ));
    let sent = lock(&h.sent);
    let attempts = sent
        .iter()
        .filter(|e| matches!(e, SendEvent::Text { .. }))
        .count();
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn long_answer_is_split_not_truncated() {
    let answer = "ا".repeat(5000);
    let h = harness(
        Some(student(1)),
        Some("111111:tok"),
        vec![Script::chunks(&[answer.as_str()])],
    );

    let outcome = h.relay.process(inbound("123", "سلام", 1)).await;

    assert!(matches!(outcome, RelayOutcome::Delivered { sends: 2, .. }));
    let sent = lock(&h.sent);
    let relayed: String = sent
        .iter()
        .filter_map(|e| match e {
            SendEvent::Text { text, .. } => Some(text.as_str()),
            SendEvent::Typing { .. } => None,
        })
        .collect();
    assert_eq!(relayed, answer, "concatenation of sends equals the stream");
}
