//! Live event tail.
//!
//! Subscribes to the push channel for the given pipelines and prints each
//! new replication event once. Polls over REST whenever the channel is not
//! connected, including after the server drops it mid-watch.

use std::collections::HashSet;
use std::time::Duration;

use pipewatch_core::{ChannelState, CoreError, Dashboard, ReplicationEvent};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::events;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub async fn handle(
    dashboard: &Dashboard,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    dashboard.start().await?;

    for id in args.pipelines.iter().rev() {
        dashboard.watch_pipeline(id).await;
    }
    // `watch_pipeline` selects as it goes; the first pipeline stays in scope.
    dashboard.select_pipeline(args.pipelines.first().cloned());

    let live = !needs_polling(dashboard.channel_state());
    let mut channel_state = dashboard.channel().map(|c| c.state_changes());
    if !global.quiet {
        eprintln!(
            "Watching {} ({}), Ctrl-C to stop",
            args.pipelines.join(", "),
            if live { "live" } else { "polling" }
        );
    }

    // Backlog counts as seen; only new events are printed.
    if let Err(e) = dashboard.refresh_events().await {
        fail_on_session_error(e)?;
    }
    let mut stream = dashboard.store().subscribe_events();
    let mut seen: HashSet<String> = stream.current().iter().map(|e| e.id.clone()).collect();

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut poll = time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
            () = sleep_until(deadline) => break,
            snapshot = stream.changed() => {
                let Some(snapshot) = snapshot else { break };
                // Snapshots are newest first; print in arrival order.
                for event in snapshot.iter().rev() {
                    if seen.insert(event.id.clone()) {
                        print_event(event, global)?;
                    }
                }
            }
            state = next_state(channel_state.as_mut()) => match state {
                Some(ChannelState::Disconnected) => {
                    warn!("push channel closed, polling over REST");
                    poll.reset_immediately();
                }
                Some(_) => {}
                None => channel_state = None,
            },
            _ = poll.tick(), if needs_polling(dashboard.channel_state()) => {
                if let Err(e) = dashboard.refresh_events().await {
                    fail_on_session_error(e)?;
                }
            }
        }
    }

    for id in &args.pipelines {
        dashboard.unwatch_pipeline(id).await;
    }
    Ok(())
}

/// REST polling covers every moment the push channel is not delivering.
fn needs_polling(state: ChannelState) -> bool {
    state != ChannelState::Connected
}

/// Next channel state; pends forever when there is no channel.
async fn next_state(rx: Option<&mut watch::Receiver<ChannelState>>) -> Option<ChannelState> {
    match rx {
        Some(rx) => {
            rx.changed().await.ok()?;
            Some(*rx.borrow_and_update())
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn fail_on_session_error(err: CoreError) -> Result<(), CliError> {
    match err {
        CoreError::SessionExpired { .. } | CoreError::NotAuthenticated => Err(err.into()),
        other => {
            warn!(error = %other, "event refresh failed");
            Ok(())
        }
    }
}

fn print_event(event: &ReplicationEvent, global: &GlobalOpts) -> Result<(), CliError> {
    let line = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(event, true)?,
        OutputFormat::Plain => event.id.clone(),
        OutputFormat::Table => events::event_line(event),
    };
    output::print_output(&line, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn polls_unless_connected() {
        assert!(needs_polling(ChannelState::Disconnected));
        assert!(needs_polling(ChannelState::Connecting));
        assert!(!needs_polling(ChannelState::Connected));
    }

    #[tokio::test]
    async fn dropped_channel_is_reported() {
        let (tx, mut rx) = watch::channel(ChannelState::Connected);
        tx.send_replace(ChannelState::Disconnected);
        assert_eq!(next_state(Some(&mut rx)).await, Some(ChannelState::Disconnected));

        drop(tx);
        assert_eq!(next_state(Some(&mut rx)).await, None);
    }
}
