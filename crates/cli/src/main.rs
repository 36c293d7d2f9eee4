mod capabilities;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use patterns_engine::{FileSystemSource, LoadReport, Orchestrator, OrchestratorConfig, load_config, load_config_from_path};
use patterns_types::{Maturity, WorkflowDocument};
use serde_json::{Map as JsonMap, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::capabilities::builtin_registry;

/// Default workflow location when neither the flag nor the config names one.
const DEFAULT_WORKFLOWS_DIR: &str = "workflows";

#[derive(Debug, Parser)]
#[command(name = "patterns", version, about = "Load, validate, and run declarative workflows")]
struct Cli {
    /// Configuration file (defaults to $PATTERNS_CONFIG_PATH or the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workflow file or directory; overrides `workflows_dir` from the configuration.
    #[arg(long, short = 'w', global = true)]
    workflows: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List runnable workflows.
    List,
    /// Print a loaded workflow definition as YAML.
    Describe { name: String },
    /// Report diagnostics for one workflow or for every loaded document.
    Validate { name: Option<String> },
    /// List registered capabilities and their contracts.
    Capabilities,
    /// Run a workflow and print its outputs as JSON.
    Run {
        name: String,
        /// Input binding as `key=value`; values parse as JSON when possible.
        #[arg(long = "input", short = 'i', value_parser = parse_assignment)]
        inputs: Vec<(String, Value)>,
        /// Context entry as `key=value`.
        #[arg(long = "context", short = 'c', value_parser = parse_assignment)]
        context: Vec<(String, Value)>,
        /// Overrides `run_timeout_ms` from the configuration.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Print the full run report (step trail and timings) instead of outputs only.
        #[arg(long)]
        report: bool,
    },
    /// Print the JSON schema of a workflow document.
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Schema => {
            let schema = schemars::schema_for!(WorkflowDocument);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Command::Capabilities => print_capabilities(&config),
        Command::List => {
            let orchestrator = load_orchestrator(config, cli.workflows)?.0;
            for name in orchestrator.list_workflows() {
                let label = orchestrator
                    .describe_workflow(&name)
                    .map(|definition| definition.display_name().to_string())
                    .unwrap_or_else(|| name.clone());
                println!("{name}\t{label}");
            }
            Ok(())
        }
        Command::Describe { name } => {
            let orchestrator = load_orchestrator(config, cli.workflows)?.0;
            let definition = orchestrator
                .describe_workflow(&name)
                .with_context(|| format!("workflow '{name}' is not loaded"))?;
            print!("{}", serde_yaml::to_string(&definition)?);
            Ok(())
        }
        Command::Validate { name } => {
            let (orchestrator, report) = load_orchestrator(config, cli.workflows)?;
            let diagnostics = orchestrator.validate(name.as_deref())?;
            for diagnostic in &diagnostics {
                println!("{diagnostic}");
            }
            let errors = diagnostics.iter().filter(|diagnostic| diagnostic.is_error()).count();
            if errors > 0 {
                bail!("{errors} error(s) found");
            }
            println!("ok: {} workflow(s) valid, {} warning(s)", report.accepted.len(), diagnostics.len());
            Ok(())
        }
        Command::Run {
            name,
            inputs,
            context,
            timeout_ms,
            report: full_report,
        } => {
            if timeout_ms.is_some() {
                config.run_timeout_ms = timeout_ms;
            }
            let orchestrator = load_orchestrator(config, cli.workflows)?.0;

            let cancellation = CancellationToken::new();
            let interrupt = cancellation.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received; cancelling run");
                    interrupt.cancel();
                }
            });

            let report = orchestrator
                .run_with_cancellation(&name, into_map(inputs), into_map(context), cancellation)
                .await
                .with_context(|| format!("workflow '{name}' failed"))?;
            let rendered = if full_report {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string_pretty(&report.outputs)?
            };
            println!("{rendered}");
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_orchestrator(config: OrchestratorConfig, workflows: Option<PathBuf>) -> Result<(Orchestrator, LoadReport)> {
    let root = workflows
        .or_else(|| config.workflows_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKFLOWS_DIR));
    let registry = builtin_registry(config.duplicate_policy)?;
    let orchestrator = Orchestrator::new(Arc::new(registry), config);
    let report = orchestrator.load(&FileSystemSource::new(&root))?;
    info!(
        root = %root.display(),
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        "workflows loaded"
    );
    Ok((orchestrator, report))
}

fn print_capabilities(config: &OrchestratorConfig) -> Result<()> {
    let registry = builtin_registry(config.duplicate_policy)?;
    for name in registry.list() {
        match registry.describe(name)? {
            Some(contract) => {
                let maturity = match contract.maturity {
                    Maturity::Implemented => "implemented",
                    Maturity::Partial => "partial",
                    Maturity::Placeholder => "placeholder",
                };
                println!("{name}\t{maturity}\t{}", contract.description);
                for field in &contract.inputs {
                    let required = if field.required { "required" } else { "optional" };
                    println!("  in  {}: {} ({required})", field.name, field.r#type);
                }
                for field in &contract.outputs {
                    println!("  out {}: {}", field.name, field.r#type);
                }
            }
            None => println!("{name}"),
        }
    }
    Ok(())
}

/// Parses `key=value`. The value is read as JSON when it parses, otherwise as a string.
fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn into_map(pairs: Vec<(String, Value)>) -> JsonMap<String, Value> {
    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn assignments_parse_json_values_and_fall_back_to_strings() {
        assert_eq!(parse_assignment("limit=10"), Ok(("limit".to_string(), json!(10))));
        assert_eq!(parse_assignment("flags=[true,false]"), Ok(("flags".to_string(), json!([true, false]))));
        assert_eq!(parse_assignment("account=ACC-1"), Ok(("account".to_string(), json!("ACC-1"))));
        assert_eq!(parse_assignment("expr=a=b"), Ok(("expr".to_string(), json!("a=b"))));
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn run_arguments_collect_inputs_and_context() {
        let cli = Cli::try_parse_from([
            "patterns",
            "run",
            "overview",
            "--input",
            "account=ACC-1",
            "-i",
            "days=30",
            "--context",
            "correlation_id=req-1",
            "--timeout-ms",
            "500",
        ])
        .expect("parse");
        let Command::Run { name, inputs, context, timeout_ms, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(name, "overview");
        assert_eq!(Value::Object(into_map(inputs)), json!({"account": "ACC-1", "days": 30}));
        assert_eq!(Value::Object(into_map(context)), json!({"correlation_id": "req-1"}));
        assert_eq!(timeout_ms, Some(500));
    }

    #[tokio::test]
    async fn runs_a_workflow_from_a_directory() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            temp_dir.path().join("greet.yaml"),
            "workflow: greet\nsteps:\n  - capability: core.merge\n    args:\n      base: { greeting: hello }\n      who: \"{{ name }}\"\n    as: message\noutputs: [message]\n",
        )
        .expect("write");

        let (orchestrator, report) =
            load_orchestrator(OrchestratorConfig::default(), Some(temp_dir.path().to_path_buf())).expect("load");
        assert_eq!(report.accepted, vec!["greet"]);
        let outputs = orchestrator
            .run("greet", into_map(vec![("name".to_string(), json!("ada"))]), JsonMap::new())
            .await
            .expect("run");
        assert_eq!(Value::Object(outputs), json!({"message": {"greeting": "hello", "who": "ada"}}));
    }

    #[tokio::test]
    async fn bundled_demo_workflows_load_and_run() {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../workflows");
        let (orchestrator, report) = load_orchestrator(OrchestratorConfig::default(), Some(root)).expect("load");
        assert_eq!(report.accepted, vec!["greeting", "slow-echo"]);
        assert!(report.rejected.is_empty());

        let outputs = orchestrator
            .run("greeting", into_map(vec![("name".to_string(), json!("ada"))]), JsonMap::new())
            .await
            .expect("run");
        assert_eq!(Value::Object(outputs), json!({"base": {"text": "hello ada"}, "excited_greeting": null}));
    }
}
