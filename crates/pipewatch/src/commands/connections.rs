//! Connection command handlers.

use pipewatch_core::{Connection, ConnectionTestResult, Dashboard, DataPreview};
use tabled::Tabled;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::{ConnectionsArgs, ConnectionsCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ConnectionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    source_type: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Database")]
    database: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&Connection> for ConnectionRow {
    fn from(c: &Connection) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            source_type: output::or_dash(c.source_type.as_deref()),
            host: match (&c.host, c.port) {
                (Some(host), Some(port)) => format!("{host}:{port}"),
                (Some(host), None) => host.clone(),
                _ => "-".into(),
            },
            database: output::or_dash(c.database.as_deref()),
            status: output::or_dash(c.status.as_deref()),
        }
    }
}

#[derive(Tabled)]
struct TableRow {
    #[tabled(rename = "Table")]
    name: String,
}

fn detail(c: &Connection) -> String {
    let row = ConnectionRow::from(c);
    [
        format!("ID:       {}", row.id),
        format!("Name:     {}", row.name),
        format!("Type:     {}", row.source_type),
        format!("Host:     {}", row.host),
        format!("Database: {}", row.database),
        format!("Status:   {}", row.status),
    ]
    .join("\n")
}

fn test_detail(r: &ConnectionTestResult) -> String {
    let mut lines = vec![format!(
        "Result:  {}",
        if r.success { "ok" } else { "failed" }
    )];
    if let Some(ref message) = r.message {
        lines.push(format!("Message: {message}"));
    }
    if let Some(latency) = r.latency_ms {
        lines.push(format!("Latency: {latency:.0} ms"));
    }
    lines.join("\n")
}

/// Render preview rows under their column headers. Rows may be objects
/// keyed by column or positional arrays.
fn preview_table(preview: &DataPreview) -> String {
    let mut builder = Builder::default();
    builder.push_record(preview.columns.iter().cloned());
    for row in &preview.rows {
        let cells: Vec<String> = match row {
            serde_json::Value::Object(map) => preview
                .columns
                .iter()
                .map(|col| map.get(col).map(cell).unwrap_or_default())
                .collect(),
            serde_json::Value::Array(values) => values.iter().map(cell).collect(),
            other => vec![cell(other)],
        };
        builder.push_record(cells);
    }
    let mut out = builder.build().with(Style::rounded()).to_string();
    if let Some(total) = preview.total_rows {
        out.push_str(&format!("\n{} of {total} rows", preview.rows.len()));
    }
    out
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    dashboard: &Dashboard,
    args: ConnectionsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let api = dashboard.api();

    match args.command {
        ConnectionsCommand::List(page) => {
            let connections = api.list_connections(page.skip, page.limit).await?;
            let out = output::render_list(
                &global.output,
                &connections,
                |c| ConnectionRow::from(c),
                |c| c.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
        }

        ConnectionsCommand::Get { id } => {
            let connection = api.get_connection(&id).await?;
            let out =
                output::render_single(&global.output, &connection, detail, |c| c.id.clone())?;
            output::print_output(&out, global.quiet);
        }

        ConnectionsCommand::Create { file } => {
            let body = util::read_json_file(&file)?;
            let connection = api.create_connection(&body).await?;
            let out =
                output::render_single(&global.output, &connection, detail, |c| c.id.clone())?;
            output::print_output(&out, global.quiet);
        }

        ConnectionsCommand::Update { id, file } => {
            let body = util::read_json_file(&file)?;
            let connection = api.update_connection(&id, &body).await?;
            let out =
                output::render_single(&global.output, &connection, detail, |c| c.id.clone())?;
            output::print_output(&out, global.quiet);
        }

        ConnectionsCommand::Delete { id } => {
            if !util::confirm(&format!("Delete connection {id}?"), global.yes)? {
                return Ok(());
            }
            dashboard.delete_connection(&id).await?;
            output::print_output(&format!("Deleted connection {id}"), global.quiet);
        }

        ConnectionsCommand::Test { id } => {
            let result = api.test_connection(&id).await?;
            let out = output::render_single(&global.output, &result, test_detail, |r| {
                r.success.to_string()
            })?;
            output::print_output(&out, global.quiet);
        }

        ConnectionsCommand::Tables { id } => {
            let tables = api.list_tables(&id).await?;
            let out = output::render_list(
                &global.output,
                &tables,
                |name| TableRow { name: name.clone() },
                Clone::clone,
            )?;
            output::print_output(&out, global.quiet);
        }

        ConnectionsCommand::Preview { id, table, limit } => {
            // The source type decides how long the preview may take.
            let connection = api.get_connection(&id).await?;
            let preview = api
                .preview_table(&id, &table, connection.source_type.as_deref(), limit)
                .await?;
            let out = match global.output {
                OutputFormat::Table => preview_table(&preview),
                OutputFormat::Plain => preview
                    .rows
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n"),
                OutputFormat::Json => output::render_json(&preview, false)?,
                OutputFormat::JsonCompact => output::render_json(&preview, true)?,
            };
            output::print_output(&out, global.quiet);
        }
    }
    Ok(())
}
