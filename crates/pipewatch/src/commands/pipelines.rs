//! Pipeline command handlers.

use pipewatch_core::{Dashboard, Pipeline, PipelineAction};
use tabled::Tabled;

use crate::cli::{GlobalOpts, OutputFormat, PipelinesArgs, PipelinesCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct PipelineRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Target")]
    target: String,
}

impl From<&Pipeline> for PipelineRow {
    fn from(p: &Pipeline) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            status: output::or_dash(p.status.as_deref()),
            source: output::or_dash(p.source_connection_id.as_deref()),
            target: output::or_dash(p.target_connection_id.as_deref()),
        }
    }
}

fn detail(p: &Pipeline) -> String {
    let row = PipelineRow::from(p);
    let mut lines = vec![
        format!("ID:     {}", row.id),
        format!("Name:   {}", row.name),
        format!("Status: {}", row.status),
        format!("Source: {}", row.source),
        format!("Target: {}", row.target),
    ];
    for (key, value) in &p.extra {
        lines.push(format!("{key}: {value}"));
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    dashboard: &Dashboard,
    args: PipelinesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let api = dashboard.api();

    match args.command {
        PipelinesCommand::List(page) => {
            let pipelines = api.list_pipelines(page.skip, page.limit).await?;
            let out = output::render_list(
                &global.output,
                &pipelines,
                |p| PipelineRow::from(p),
                |p| p.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
        }

        PipelinesCommand::Get { id } => {
            let pipeline = api.get_pipeline(&id).await?;
            let out = output::render_single(&global.output, &pipeline, detail, |p| p.id.clone())?;
            output::print_output(&out, global.quiet);
        }

        PipelinesCommand::Create { file } => {
            let body = util::read_json_file(&file)?;
            let pipeline = api.create_pipeline(&body).await?;
            let out = output::render_single(&global.output, &pipeline, detail, |p| p.id.clone())?;
            output::print_output(&out, global.quiet);
        }

        PipelinesCommand::Update { id, file } => {
            let body = util::read_json_file(&file)?;
            let pipeline = api.update_pipeline(&id, &body).await?;
            let out = output::render_single(&global.output, &pipeline, detail, |p| p.id.clone())?;
            output::print_output(&out, global.quiet);
        }

        PipelinesCommand::Delete { id } => {
            if !util::confirm(&format!("Delete pipeline {id}?"), global.yes)? {
                return Ok(());
            }
            dashboard.delete_pipeline(&id).await?;
            output::print_output(&format!("Deleted pipeline {id}"), global.quiet);
        }

        PipelinesCommand::Trigger { id } => {
            run_action(dashboard, &id, PipelineAction::Trigger, global).await?;
        }
        PipelinesCommand::Pause { id } => {
            run_action(dashboard, &id, PipelineAction::Pause, global).await?;
        }
        PipelinesCommand::Stop { id } => {
            if !util::confirm(&format!("Stop pipeline {id}?"), global.yes)? {
                return Ok(());
            }
            run_action(dashboard, &id, PipelineAction::Stop, global).await?;
        }

        PipelinesCommand::Export { id } => {
            let definition = api.export_pipeline(&id).await?;
            let compact = matches!(global.output, OutputFormat::JsonCompact);
            let out = output::render_json(&definition, compact)?;
            output::print_output(&out, global.quiet);
        }
    }
    Ok(())
}

async fn run_action(
    dashboard: &Dashboard,
    id: &str,
    action: PipelineAction,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    dashboard.pipeline_action(id, action).await?;
    let status = dashboard
        .store()
        .pipeline_by_id(id)
        .and_then(|p| p.status.clone());
    let msg = match status {
        Some(status) => format!("{action} sent to pipeline {id} (now {status})"),
        None => format!("{action} sent to pipeline {id}"),
    };
    output::print_output(&msg, global.quiet);
    Ok(())
}
