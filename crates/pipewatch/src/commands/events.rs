//! Event and metric listings over REST.

use pipewatch_core::{Dashboard, EventQuery, MonitoringMetric, ReplicationEvent};
use tabled::Tabled;

use crate::cli::{EventsArgs, EventsCommand, GlobalOpts, PageArgs};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Pipeline")]
    pipeline: String,
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Op")]
    op: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Latency")]
    latency: String,
}

impl From<&ReplicationEvent> for EventRow {
    fn from(e: &ReplicationEvent) -> Self {
        Self {
            time: e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            pipeline: e.pipeline_id.clone(),
            table: e.table_name.clone(),
            op: e.event_type.to_string(),
            status: match (&e.status, &e.error_message) {
                (_, Some(err)) => format!("error: {err}"),
                (Some(status), None) => status.clone(),
                (None, None) => "-".into(),
            },
            latency: format_ms(e.latency_ms),
        }
    }
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Pipeline")]
    pipeline: String,
    #[tabled(rename = "Events/s")]
    rate: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Lag")]
    lag: String,
    #[tabled(rename = "Errors")]
    errors: String,
}

impl From<&MonitoringMetric> for MetricRow {
    fn from(m: &MonitoringMetric) -> Self {
        Self {
            time: m.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            pipeline: m.pipeline_id.clone(),
            rate: m
                .events_per_second
                .map_or_else(|| "-".into(), |r| format!("{r:.1}")),
            latency: format_ms(m.latency_ms),
            lag: m.lag_seconds.map_or_else(|| "-".into(), |s| format!("{s:.1}s")),
            errors: m.error_count.map_or_else(|| "-".into(), |n| n.to_string()),
        }
    }
}

fn format_ms(ms: Option<f64>) -> String {
    ms.map_or_else(|| "-".into(), |v| format!("{v:.0} ms"))
}

/// One line per event for streaming output.
pub(crate) fn event_line(e: &ReplicationEvent) -> String {
    let row = EventRow::from(e);
    format!(
        "{}  {}  {} {}  {}  {}",
        row.time, row.pipeline, row.op, row.table, row.status, row.latency
    )
}

fn query(pipeline: Option<String>, page: PageArgs) -> EventQuery {
    match pipeline {
        Some(id) => EventQuery::for_pipeline(id, page.skip, page.limit),
        None => EventQuery::new(page.skip, page.limit),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    dashboard: &Dashboard,
    args: EventsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let api = dashboard.api();

    match args.command {
        EventsCommand::List { pipeline, page } => {
            let events = api.list_events(&query(pipeline, page)).await?;
            let out =
                output::render_list(&global.output, &events, |e| EventRow::from(e), |e| e.id.clone())?;
            output::print_output(&out, global.quiet);
        }

        EventsCommand::Metrics { pipeline, page } => {
            let metrics = api.list_metrics(&query(pipeline, page)).await?;
            let out = output::render_list(
                &global.output,
                &metrics,
                |m| MetricRow::from(m),
                MonitoringMetric::key,
            )?;
            output::print_output(&out, global.quiet);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pipewatch_core::EventType;
    use pretty_assertions::assert_eq;

    use super::*;

    fn event(error: Option<&str>) -> ReplicationEvent {
        ReplicationEvent {
            id: "e1".into(),
            pipeline_id: "7".into(),
            table_name: "orders".into(),
            event_type: EventType::Insert,
            status: Some("applied".into()),
            latency_ms: Some(12.4),
            error_message: error.map(str::to_owned),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn event_line_shows_operation_and_latency() {
        assert_eq!(
            event_line(&event(None)),
            "2024-05-01 12:00:00  7  insert orders  applied  12 ms"
        );
    }

    #[test]
    fn error_message_wins_over_status() {
        let row = EventRow::from(&event(Some("duplicate key")));
        assert_eq!(row.status, "error: duplicate key");
    }

    #[test]
    fn pipeline_filter_scopes_the_query() {
        let page = PageArgs { skip: 5, limit: 10 };
        assert_eq!(query(Some("7".into()), page).pipeline_id.as_deref(), Some("7"));
        assert_eq!(query(None, page).pipeline_id, None);
    }
}
