mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use common::ChannelBackend;
use finsight_core::backend::StreamEvent;
use finsight_core::session::{
    SessionHandle, SessionState, SessionStatus, SessionStore, Source, SourceIcon, SourceName,
    StoreError, TurnId,
};

async fn settled(
    handle: &SessionHandle,
    pred: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    let mut rx = handle.subscribe();
    timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("state never settled")
        .expect("store closed")
        .clone()
}

fn source(name: &str) -> Source {
    Source::new(name).with_icon(SourceIcon::News)
}

fn sources(names: &[&str]) -> StreamEvent {
    StreamEvent::Sources {
        sources: names.iter().map(|n| source(n)).collect(),
    }
}

fn chunk(turn: TurnId, text: &str) -> StreamEvent {
    StreamEvent::Chunk {
        turn,
        text: text.to_string(),
    }
}

#[tokio::test]
async fn search_streams_into_the_summary_turn() {
    let backend = Arc::new(ChannelBackend::new());
    let script = backend.script();
    let handle = SessionStore::spawn(backend.clone());

    handle.search("AMD earnings").await.unwrap();
    settled(&handle, |s| s.status == SessionStatus::Searching).await;

    script.send(sources(&["edgar:amd-10q"])).unwrap();
    script.send(chunk(TurnId::SUMMARY, "AMD ")).unwrap();
    script.send(chunk(TurnId::SUMMARY, "reported ")).unwrap();
    script.send(chunk(TurnId::SUMMARY, "strong Q2.")).unwrap();
    script.send(StreamEvent::Done).unwrap();

    let state = settled(&handle, |s| s.status == SessionStatus::Idle).await;
    let summary = state.conversation.summary();
    assert_eq!(summary.content, "AMD reported strong Q2.");
    assert!(!summary.loading);
    assert!(state.active_request.is_none());
    assert!(state.sources.contains(&SourceName::from("edgar:amd-10q")));

    let seen = backend.seen_requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].question, "AMD earnings");
    assert!(seen[0].new_topic);
}

#[tokio::test]
async fn abort_keeps_partial_content_and_ignores_late_chunks() {
    let backend = Arc::new(ChannelBackend::new());
    let script = backend.script();
    let handle = SessionStore::spawn(backend);

    handle.search("AMD earnings").await.unwrap();
    script.send(chunk(TurnId::SUMMARY, "AMD ")).unwrap();
    settled(&handle, |s| s.conversation.summary().content == "AMD ").await;

    handle.abort().await.unwrap();
    let state = settled(&handle, |s| s.status == SessionStatus::Idle).await;
    assert_eq!(state.conversation.summary().content, "AMD ");
    assert!(!state.conversation.summary().loading);

    // The pump is cancelled; whether or not this send still lands in the
    // channel, nothing of it may reach the state.
    let _ = script.send(chunk(TurnId::SUMMARY, "reported "));
    sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.snapshot().conversation.summary().content, "AMD ");
}

#[tokio::test]
async fn ask_appends_a_pair_and_preserves_expansion() {
    let backend = Arc::new(ChannelBackend::new());
    let first = backend.script();
    let handle = SessionStore::spawn(backend.clone());

    handle.search("AMD earnings").await.unwrap();
    first.send(sources(&["news:amd"])).unwrap();
    first.send(chunk(TurnId::SUMMARY, "Summary.")).unwrap();
    first.send(StreamEvent::Done).unwrap();
    settled(&handle, |s| s.status == SessionStatus::Idle).await;

    handle.toggle_source("news:amd", Some(true)).await.unwrap();
    settled(&handle, |s| {
        s.sources
            .get(&SourceName::from("news:amd"))
            .is_some_and(|src| src.expanded)
    })
    .await;

    let second = backend.script();
    handle.ask("what about Q3?").await.unwrap();
    let answer_turn = settled(&handle, |s| s.conversation.len() == 3)
        .await
        .conversation
        .turns()[2]
        .id;
    second.send(sources(&["news:amd", "dart:q3"])).unwrap();
    second.send(chunk(answer_turn, "Better.")).unwrap();
    second
        .send(StreamEvent::EvalScores {
            turn: answer_turn,
            scores: BTreeMap::from([("relevance".to_string(), 0.9)]),
        })
        .unwrap();
    second.send(StreamEvent::Done).unwrap();

    let state = settled(&handle, |s| s.status == SessionStatus::Idle).await;
    assert_eq!(state.conversation.summary().content, "Summary.");
    let turns = state.conversation.turns();
    assert!(turns[1].is_human);
    assert_eq!(turns[2].content, "Better.");
    assert_eq!(
        turns[2].eval_scores.as_ref().unwrap().get("relevance"),
        Some(&0.9)
    );
    // Merged, not replaced: the expanded flag survived the follow-up.
    assert!(state.sources.get(&SourceName::from("news:amd")).unwrap().expanded);
    assert_eq!(state.sources.len(), 2);
    assert!(!backend.seen_requests()[1].new_topic);
}

#[tokio::test]
async fn new_search_supersedes_a_streaming_one() {
    let backend = Arc::new(ChannelBackend::new());
    let first = backend.script();
    let handle = SessionStore::spawn(backend.clone());

    handle.search("AMD earnings").await.unwrap();
    first.send(chunk(TurnId::SUMMARY, "old topic")).unwrap();
    settled(&handle, |s| s.conversation.summary().content == "old topic").await;

    let second = backend.script();
    handle.search("NVDA outlook").await.unwrap();
    settled(&handle, |s| s.conversation.summary().content.is_empty()).await;

    // Anything still queued on the superseded stream must not surface.
    let _ = first.send(chunk(TurnId::SUMMARY, "stale tail"));

    second.send(chunk(TurnId::SUMMARY, "NVDA rallied.")).unwrap();
    second.send(StreamEvent::Done).unwrap();

    let state = settled(&handle, |s| s.status == SessionStatus::Idle).await;
    assert_eq!(state.conversation.summary().content, "NVDA rallied.");
    assert_eq!(state.conversation.len(), 1);
}

#[tokio::test]
async fn empty_query_is_rejected_without_state_change() {
    let backend = Arc::new(ChannelBackend::new());
    let handle = SessionStore::spawn(backend);
    let before = handle.snapshot();

    assert!(matches!(
        handle.search("   ").await,
        Err(StoreError::EmptyQuery)
    ));
    assert!(matches!(handle.ask("").await, Err(StoreError::EmptyQuery)));

    sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.snapshot(), before);
}

#[tokio::test]
async fn failed_connection_surfaces_as_error_status() {
    let backend = Arc::new(ChannelBackend::new());
    // No script queued: the backend refuses the connection.
    let handle = SessionStore::spawn(backend);

    handle.search("AMD earnings").await.unwrap();

    let state = settled(&handle, |s| s.status == SessionStatus::Error).await;
    let summary = state.conversation.summary();
    assert!(summary.content.contains("connection refused"));
    assert!(!summary.loading);
    assert!(state.active_request.is_none());
}

#[tokio::test]
async fn stream_error_keeps_partial_answer_and_allows_retry() {
    let backend = Arc::new(ChannelBackend::new());
    let script = backend.script();
    let handle = SessionStore::spawn(backend.clone());

    handle.search("AMD earnings").await.unwrap();
    script.send(chunk(TurnId::SUMMARY, "AMD ")).unwrap();
    script
        .send(StreamEvent::Error {
            message: "connection reset".to_string(),
        })
        .unwrap();

    let state = settled(&handle, |s| s.status == SessionStatus::Error).await;
    assert!(state.conversation.summary().content.starts_with("AMD "));
    assert!(state.conversation.summary().content.contains("connection reset"));

    // Error state never blocks a fresh query.
    let retry = backend.script();
    handle.search("AMD earnings").await.unwrap();
    retry.send(chunk(TurnId::SUMMARY, "Fresh answer.")).unwrap();
    retry.send(StreamEvent::Done).unwrap();

    let state = settled(&handle, |s| s.status == SessionStatus::Idle).await;
    assert_eq!(state.conversation.summary().content, "Fresh answer.");
}
