//! Compare policy assignments of several subjects from the command line
//!
//! Prints the comparison as JSON on stdout; logs go to stderr.
//!
//! Usage:
//!   compare-subjects [--config <path>] [--settings] [--pretty] <type:id[=label]>...
//!
//! Example:
//!   compare-subjects --settings user:2f1c...=alice@contoso.com device:9a7e...

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use futures::future::try_join_all;
use tracing::info;

use intune_assignment_checker::{
    logging::{init_logging, ConsoleStream},
    models::{Subject, SubjectKey},
    services::{GraphClient, LogProgress},
    AppConfig, AppState,
};

/// One subject argument, with an optional label after `=`
#[derive(Debug, PartialEq)]
struct SubjectArg {
    key: SubjectKey,
    label: Option<String>,
}

fn parse_subject(arg: &str) -> Result<SubjectArg> {
    let (key, label) = match arg.split_once('=') {
        Some((key, label)) => (key, Some(label.trim().to_string())),
        None => (arg, None),
    };
    let key = SubjectKey::try_from(key.trim().to_string())
        .with_context(|| format!("Invalid subject '{}', expected type:id", arg))?;
    if key.id.trim().is_empty() {
        bail!("Subject '{}' has an empty id", arg);
    }
    Ok(SubjectArg {
        key,
        label: label.filter(|l| !l.is_empty()),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut include_settings = false;
    let mut pretty = false;
    let mut subjects = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--settings" => include_settings = true,
            "--pretty" => pretty = true,
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            flag if flag.starts_with("--") => {
                eprintln!("Unknown argument: {}", flag);
                print_help();
                std::process::exit(1);
            }
            subject => subjects.push(parse_subject(subject)?),
        }
        i += 1;
    }

    if subjects.len() < 2 {
        print_help();
        bail!("At least two subjects are required");
    }

    let config = AppConfig::load_from(config_path).context("Failed to load configuration")?;
    let _log_guard = init_logging(&config.logging, ConsoleStream::Stderr);

    let graph = GraphClient::from_config(&config).context("Failed to initialize Graph client")?;
    let state = AppState::with_graph(config, graph);

    let resolved: Vec<Subject> = try_join_all(subjects.iter().map(|arg| {
        let state = &state;
        async move {
            match &arg.label {
                Some(label) => Ok(Subject::new(arg.key.subject_type, arg.key.id.clone(), label)),
                None => {
                    state
                        .directory
                        .describe_subject(arg.key.subject_type, &arg.key.id)
                        .await
                }
            }
        }
    }))
    .await?;

    let inventory = state.inventory.load(&LogProgress).await?;
    let settings = include_settings.then_some(&state.settings);
    let result = state
        .comparator
        .run(
            &state.session,
            &resolved,
            &inventory.policies,
            settings,
            &LogProgress,
        )
        .await?;

    info!(
        policies = result.policies.len(),
        apps = result.apps.len(),
        "Comparison finished"
    );

    let output = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);
    Ok(())
}

fn print_help() {
    eprintln!(
        r#"compare-subjects {}

USAGE:
    compare-subjects [OPTIONS] <type:id[=label]>...

ARGS:
    <type:id[=label]>   Subject to compare; type is user, device or group.
                        At least two are required.

OPTIONS:
    --config <path>     Path to configuration file
    --settings          Also diff the settings of effective policies
    --pretty            Pretty-print the JSON output
    -h, --help          Print this help message"#,
        env!("CARGO_PKG_VERSION")
    );
}
