//! Minimal terminal driver for the finsight session core: reads queries
//! from stdin, dispatches them into the session store, and renders state
//! snapshots as they change. The first query opens a topic; later ones are
//! follow-ups unless `/new` forces a fresh search.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use url::Url;

use finsight_core::backend::http::HttpBackend;
use finsight_core::session::{SessionHandle, SessionStatus, SessionStore, StoreError, TurnId};

#[derive(Parser, Debug)]
#[command(name = "finsight", about = "Ask the finsight answer assistant from the terminal")]
struct Cli {
    /// Base URL of the answer backend.
    #[arg(long, env = "FINSIGHT_BACKEND_URL", default_value = "http://localhost:5000/")]
    backend_url: Url,

    /// Log filter, e.g. "finsight_core=debug".
    #[arg(long, env = "FINSIGHT_LOG", default_value = "warn")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).context("invalid log filter")?)
        .with_writer(std::io::stderr)
        .init();

    let backend = Arc::new(HttpBackend::new(cli.backend_url));
    let handle = SessionStore::spawn(backend);

    println!("finsight — type a question to search, /new <q> for a fresh topic,");
    println!("/toggle <source> to expand a citation, /sources to list them, /quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ') {
            _ if line == "/quit" => break,
            _ if line == "/sources" => print_sources(&handle),
            Some(("/new", query)) => dispatch(&handle, query, true).await?,
            Some(("/toggle", name)) => {
                handle.toggle_source(name.trim(), None).await?;
                print_sources(&handle);
            }
            _ if line.starts_with('/') => {
                eprintln!("unknown command: {line}");
            }
            _ => {
                // A fresh session searches; an established topic asks.
                let fresh = handle.snapshot().conversation.summary().content.is_empty();
                dispatch(&handle, line, fresh).await?;
            }
        }
    }

    Ok(())
}

async fn dispatch(handle: &SessionHandle, query: &str, new_topic: bool) -> Result<()> {
    let sent = if new_topic {
        handle.search(query).await
    } else {
        handle.ask(query).await
    };
    match sent {
        Ok(()) => follow_answer(handle).await,
        Err(StoreError::EmptyQuery) => {
            eprintln!("empty query ignored");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Prints the in-flight answer incrementally until the request settles.
/// Dispatch is acknowledged by the store, so the first snapshot already
/// names the answering turn (or shows the request settled).
async fn follow_answer(handle: &SessionHandle) -> Result<()> {
    let mut rx = handle.subscribe();
    let snapshot = rx.borrow_and_update().clone();
    let turn = match snapshot.active_request {
        Some(active) => active.turn,
        // A request that failed or finished before we looked left its
        // answer in the most recent turn.
        None => snapshot
            .conversation
            .turns()
            .last()
            .map_or(TurnId::SUMMARY, |t| t.id),
    };

    let mut printed = 0;
    loop {
        let state = rx.borrow_and_update().clone();
        if let Some(turn) = state.conversation.get(turn) {
            let content = &turn.content;
            if content.len() > printed {
                print!("{}", &content[printed..]);
                std::io::stdout().flush()?;
                printed = content.len();
            }
        }
        match state.status {
            SessionStatus::Idle if state.active_request.is_none() => break,
            SessionStatus::Error => {
                // The failure message was appended to the turn's content
                // and already printed above.
                println!();
                eprintln!("request failed");
                return Ok(());
            }
            _ => {}
        }
        tokio::select! {
            changed = rx.changed() => changed?,
            // Ctrl-C cancels the in-flight request; the partial answer stays.
            _ = tokio::signal::ctrl_c() => handle.abort().await?,
        }
    }
    println!();

    if let Some(turn) = handle.snapshot().conversation.get(turn)
        && let Some(scores) = &turn.eval_scores
    {
        for (metric, score) in scores {
            println!("  {metric}: {score:.2}");
        }
    }
    print_sources(handle);
    Ok(())
}

fn print_sources(handle: &SessionHandle) {
    let state = handle.snapshot();
    for source in state.sources.iter() {
        let marker = if source.expanded { "-" } else { "+" };
        println!("{marker} [{}] {}", source.icon, source.name);
        if source.expanded {
            if let Some(title) = &source.metadata.title {
                println!("    {title}");
            }
            if let Some(summary) = &source.metadata.summary {
                println!("    {summary}");
            }
            if let Some(url) = &source.metadata.url {
                println!("    {url}");
            }
        }
    }
}
