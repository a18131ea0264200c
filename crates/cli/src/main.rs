use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use dstk_api::ReqwestTransport;
use dstk_engine::{ExecutionContext, ExternalCallOptions, IntegrityChecks, LoadOptions, MemorySurface, Process, load_page};
use dstk_types::ToolkitEvent;
use dstk_util::{DocumentLocation, parse_query_string};
use indexmap::IndexMap;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};

mod builtin;

/// Load a DS Toolkit page and run its activities.
#[derive(Parser, Debug)]
#[command(name = "dstk", version, about)]
struct Cli {
    /// Page document path or http(s) URL
    #[arg(long)]
    page: String,

    /// Query parameter visible to the page (repeatable)
    #[arg(long = "query", value_name = "KEY=VALUE", value_parser = parse_pair)]
    query: Vec<(String, String)>,

    /// Raw query string, applied before --query values
    #[arg(long, value_name = "RAW")]
    query_string: Option<String>,

    /// Value of a service input (repeatable); JSON values are parsed, anything else is text
    #[arg(long = "input", value_name = "SERVICE.FIELD=VALUE", value_parser = parse_input)]
    inputs: Vec<InputAssignment>,

    /// File selected in a service file input (repeatable)
    #[arg(long = "file", value_name = "SERVICE.INPUT=PATH", value_parser = parse_input)]
    files: Vec<InputAssignment>,

    /// Skip structural validation of the documents
    #[arg(long)]
    no_validate: bool,

    /// Treat every integrity problem as fatal, even without validation
    #[arg(long)]
    strict_integrity: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one activity with its full lifecycle
    Run { service: String, activity: String },
    /// Run a named sequence of a service
    Sequence { service: String, sequence: String },
    /// Call only the execution strategy of an activity
    Call {
        service: String,
        activity: String,
        /// Parameter override (repeatable)
        #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_pair)]
        params: Vec<(String, String)>,
        /// Request body as JSON
        #[arg(long)]
        body: Option<String>,
        /// Do not resolve the activity's own parameters first
        #[arg(long)]
        no_params: bool,
    },
    /// Run the autostart activities of the page
    Autostart,
    /// List activities whose execution could not be resolved
    Inactive,
    /// Read a stored value
    Storage {
        key: String,
        /// Service store to read; the process store when omitted
        #[arg(long)]
        service: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct InputAssignment {
    service: String,
    input: String,
    value: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let surface = Arc::new(MemorySurface::new());
    for assignment in &cli.inputs {
        surface.set_value(&assignment.service, &assignment.input, parse_value(&assignment.value));
    }
    for assignment in &cli.files {
        surface.set_file(&assignment.service, &assignment.input, PathBuf::from(&assignment.value));
    }

    let transport = Arc::new(ReqwestTransport::from_env()?);
    let (sender, events) = tokio::sync::mpsc::unbounded_channel();
    let context = ExecutionContext::new(surface.clone(), transport)
        .with_query(query_parameters(&cli))
        .with_events(sender);
    let event_printer = spawn_event_printer(events);

    let location = DocumentLocation::parse(&cli.page)?;
    let process = load_page(&location, &load_options(&cli), &builtin::registry(), context)
        .await
        .with_context(|| format!("load page {}", cli.page))?;

    let outcome = run_command(&process, cli.command).await;
    drop(process);
    let _ = event_printer.await;

    for alert in surface.alerts() {
        eprintln!("alert: {alert}");
    }
    let output = outcome?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_options(cli: &Cli) -> LoadOptions {
    LoadOptions {
        validate: !cli.no_validate,
        integrity: if cli.strict_integrity {
            IntegrityChecks::all()
        } else {
            IntegrityChecks::default()
        },
    }
}

fn query_parameters(cli: &Cli) -> IndexMap<String, String> {
    let mut query = cli.query_string.as_deref().map(parse_query_string).unwrap_or_default();
    query.extend(cli.query.iter().cloned());
    query
}

fn spawn_event_printer(mut events: UnboundedReceiver<ToolkitEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(
                kind = ?event.kind,
                service = %event.event_data.service_name,
                activity = %event.event_data.activity_name,
                at = %event.emitted_at,
                "activity event"
            );
        }
    })
}

async fn run_command(process: &Process, command: Command) -> Result<Value> {
    match command {
        Command::Run { service, activity } => {
            let result = process.execute_activity(&service, &activity).await?;
            Ok(json!({
                "result": result,
                "executedActivities": process.executed_activities(),
            }))
        }
        Command::Sequence { service, sequence } => {
            let results = process.execute_sequence(&service, &sequence).await?;
            Ok(json!({
                "results": results,
                "executedActivities": process.executed_activities(),
            }))
        }
        Command::Call {
            service,
            activity,
            params,
            body,
            no_params,
        } => {
            let parameters = params.into_iter().map(|(name, value)| (name, parse_value(&value))).collect();
            let body = body
                .map(|raw| serde_json::from_str(&raw).context("--body must be JSON"))
                .transpose()?;
            let options = ExternalCallOptions { get_params: !no_params };
            Ok(process.external_call(&service, &activity, parameters, body, options).await?)
        }
        Command::Autostart => {
            process.autostart().await?;
            Ok(json!({"executedActivities": process.executed_activities()}))
        }
        Command::Inactive => {
            let inactive = process.inactive_activities();
            if !inactive.is_empty() {
                warn!(count = inactive.len(), "page has inactive activities");
            }
            Ok(serde_json::to_value(inactive)?)
        }
        Command::Storage { key, service } => Ok(process.storage_value(&key, service.as_deref())?),
    }
}

/// JSON when the text parses as JSON, otherwise the text itself.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_pair(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| anyhow!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(anyhow!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_input(raw: &str) -> Result<InputAssignment> {
    let (target, value) = parse_pair(raw)?;
    let (service, input) = target
        .split_once('.')
        .filter(|(service, input)| !service.is_empty() && !input.is_empty())
        .ok_or_else(|| anyhow!("expected SERVICE.NAME=VALUE, got '{raw}'"))?;
    Ok(InputAssignment {
        service: service.to_string(),
        input: input.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_subcommand() {
        let cli = Cli::try_parse_from([
            "dstk",
            "--page",
            "page.json",
            "--query-string",
            "?user=ada&tab=1",
            "--query",
            "tab=2",
            "--input",
            "users.userId=42",
            "--no-validate",
            "--strict-integrity",
            "run",
            "users",
            "fetchUser",
        ])
        .unwrap_or_else(|error| panic!("unexpected error: {error}"));

        assert!(matches!(&cli.command, Command::Run { service, activity } if service == "users" && activity == "fetchUser"));
        let query = query_parameters(&cli);
        assert_eq!(query.get("user").map(String::as_str), Some("ada"));
        assert_eq!(query.get("tab").map(String::as_str), Some("2"));
        assert_eq!(
            cli.inputs,
            vec![InputAssignment {
                service: "users".into(),
                input: "userId".into(),
                value: "42".into(),
            }]
        );
        let options = load_options(&cli);
        assert!(!options.validate);
        assert_eq!(options.integrity, IntegrityChecks::all());
    }

    #[test]
    fn rejects_malformed_assignments() {
        assert!(parse_input("userId=1").is_err());
        assert!(parse_input(".userId=1").is_err());
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=1").is_err());
        assert_eq!(parse_pair("a=b=c").unwrap(), ("a".to_string(), "b=c".to_string()));
    }

    #[test]
    fn values_are_json_when_possible() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("{\"a\":true}"), json!({"a": true}));
        assert_eq!(parse_value("ada"), json!("ada"));
    }
}
