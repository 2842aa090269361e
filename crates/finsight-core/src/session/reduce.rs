use std::collections::BTreeMap;

use crate::session::action::Action;
use crate::session::effect::Effect;
use crate::session::sources::Source;
use crate::session::state::{SessionState, SessionStatus};
use crate::session::types::{Query, RequestId, SourceName, TurnId};

/// Applies one action to the session state and returns the side effects the
/// store actor must carry out. All state transitions happen here, in one
/// place, synchronously; the actor never mutates state directly.
pub fn reduce(state: &mut SessionState, action: Action) -> Vec<Effect> {
    // Staleness gate: events from a superseded or aborted request are
    // expected under supersede semantics and dropped without ceremony.
    if let Some(request_id) = action.stream_request_id()
        && !state.request_matches(request_id)
    {
        tracing::debug!(request = %request_id, "dropping event from stale request");
        return vec![];
    }

    match action {
        Action::Search { query, request_id } => handle_search(state, query, request_id),
        Action::Ask { query, request_id } => handle_ask(state, query, request_id),
        Action::Abort => handle_abort(state),
        Action::ToggleSource { name, expanded } => handle_toggle_source(state, &name, expanded),
        Action::StreamChunk { turn, text, .. } => handle_chunk(state, turn, &text),
        Action::StreamSources { sources, .. } => handle_sources(state, sources),
        Action::StreamEvalScores { turn, scores, .. } => handle_eval_scores(state, turn, scores),
        Action::StreamDone { .. } => handle_done(state),
        Action::StreamFailed { message, .. } => handle_failed(state, &message),
    }
}

fn handle_search(state: &mut SessionState, query: Query, request_id: RequestId) -> Vec<Effect> {
    let mut effects = supersede(state);

    // New topic: the whole conversation and source set start over. The
    // summary slot comes back loading, ready for the stream.
    let turn = state.conversation.reset();
    state.sources.replace_all(std::iter::empty::<Source>());
    state.begin_request(request_id, turn);

    tracing::info!(request = %request_id, "search started");
    effects.push(Effect::StartRequest {
        request_id,
        turn,
        question: query.into_string(),
        new_topic: true,
    });
    effects
}

fn handle_ask(state: &mut SessionState, query: Query, request_id: RequestId) -> Vec<Effect> {
    let mut effects = supersede(state);

    // Follow-ups never touch the summary; they grow the conversation by a
    // human/assistant pair and merge new sources into the existing set.
    state.conversation.push_human(query.as_str().to_string());
    let turn = state.conversation.push_assistant();
    state.begin_request(request_id, turn);

    tracing::info!(request = %request_id, %turn, "follow-up started");
    effects.push(Effect::StartRequest {
        request_id,
        turn,
        question: query.into_string(),
        new_topic: false,
    });
    effects
}

/// Cancels the outstanding request, if any, and settles its turn. Shared by
/// abort and by search/ask supersede; the two differ only in what happens
/// next, which is why superseding is atomic from the outside.
fn supersede(state: &mut SessionState) -> Vec<Effect> {
    match state.active_request.take() {
        Some(active) => {
            tracing::debug!(request = %active.id, "superseding in-flight request");
            state.conversation.finalize(active.turn);
            vec![Effect::CancelRequest {
                request_id: active.id,
            }]
        }
        None => vec![],
    }
}

fn handle_abort(state: &mut SessionState) -> Vec<Effect> {
    // No active request means nothing to do; the state is left untouched.
    let effects = supersede(state);
    if !effects.is_empty() {
        state.status = SessionStatus::Idle;
        tracing::info!("request aborted; partial content retained");
    }
    effects
}

fn handle_toggle_source(
    state: &mut SessionState,
    name: &SourceName,
    expanded: Option<bool>,
) -> Vec<Effect> {
    if !state.sources.toggle(name, expanded) {
        tracing::debug!(source = %name, "toggle for unknown source ignored");
    }
    vec![]
}

fn handle_chunk(state: &mut SessionState, turn: TurnId, text: &str) -> Vec<Effect> {
    // First chunk of the answer moves the session out of the searching
    // phase; later chunks just accumulate.
    if state.status == SessionStatus::Searching {
        state.status = SessionStatus::Streaming;
    }
    if !state.conversation.append_chunk(turn, text) {
        tracing::debug!(%turn, "chunk for missing turn dropped");
    }
    vec![]
}

fn handle_sources(state: &mut SessionState, sources: Vec<Source>) -> Vec<Effect> {
    let Some(active) = state.active_request else {
        return vec![];
    };
    let names: Vec<SourceName> = sources.iter().map(|s| s.name.clone()).collect();
    // For a search the registry was cleared at reset, so the merge below
    // rebuilds it from scratch; for an ask it preserves expansion state on
    // anything already known.
    state.sources.upsert(sources);
    state.conversation.cite(active.turn, names);
    vec![]
}

fn handle_eval_scores(
    state: &mut SessionState,
    turn: TurnId,
    scores: BTreeMap<String, f64>,
) -> Vec<Effect> {
    if !state.conversation.set_eval_scores(turn, scores) {
        tracing::debug!(%turn, "eval scores for missing turn dropped");
    }
    vec![]
}

fn handle_done(state: &mut SessionState) -> Vec<Effect> {
    if let Some(active) = state.active_request {
        state.conversation.finalize(active.turn);
    }
    state.release_request(SessionStatus::Idle);
    tracing::info!("answer stream completed");
    vec![]
}

fn handle_failed(state: &mut SessionState, message: &str) -> Vec<Effect> {
    if let Some(active) = state.active_request {
        // Partial content is a valid truncated answer; the error message is
        // attached after it rather than replacing it.
        let turn = active.turn;
        let attached = if state
            .conversation
            .get(turn)
            .is_some_and(|t| t.content.is_empty())
        {
            message.to_string()
        } else {
            format!("\n\n{message}")
        };
        state.conversation.append_chunk(turn, &attached);
        state.conversation.finalize(turn);
    }
    state.release_request(SessionStatus::Error);
    tracing::warn!(error = message, "answer stream failed");
    vec![]
}
