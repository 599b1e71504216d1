//! FlowRunner CLI Entry Point
//!
//! Provides command-line interface for running workflow graphs.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in code review graph on sample code
//! flowrunner
//!
//! # Run a graph definition
//! flowrunner review.yaml --data input.yaml
//!
//! # Inline initial data, explicit start node
//! flowrunner review.yaml --data '{"code": "def f(): pass"}' --start extract
//!
//! # Print the run response as JSON
//! flowrunner review.yaml --json
//! ```

use std::env;
use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use log::{error, info};
use serde_json::{json, Value};

use flowrunner::capability::review::{
    self, CODE_REVIEW_GRAPH_ID, DEFAULT_QUALITY_THRESHOLD, EXAMPLE_CODE,
};
use flowrunner::capability::{CapabilityLookup, CapabilityRegistry};
use flowrunner::execution::{RunResponse, WorkflowEngine};
use flowrunner::workflow::{load_graph_definition, StateData, WorkflowState};
use flowrunner::{EngineConfig, APP_NAME, VERSION};

/// Review iterations used for the built-in demo run.
const DEMO_REVIEW_ITERATIONS: i64 = 3;

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    graph_path: Option<String>,
    data: Option<String>,
    start_node: Option<String>,
    config_path: Option<String>,
    json: bool,
    list_capabilities: bool,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Workflow Graph Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: flowrunner [OPTIONS] [GRAPH_FILE]");
    println!();
    println!("Arguments:");
    println!("  [GRAPH_FILE]          Graph definition (YAML or JSON). Runs the");
    println!("                        built-in code review graph when omitted");
    println!();
    println!("Options:");
    println!("  --data FILE|JSON      Initial state, as a file or inline JSON object");
    println!("  --start NODE          Start node (default: inferred)");
    println!("  --config FILE         Engine config file");
    println!("  --json                Print the run response as JSON");
    println!("  --list-capabilities   List registered capabilities and exit");
    println!("  --verbose             Enable debug logging");
    println!("  --help                Show this help message");
    println!("  --version             Show version information");
    println!();
    println!("Examples:");
    println!("  flowrunner");
    println!("  flowrunner review.yaml --data input.yaml");
    println!("  flowrunner review.yaml --data '{{\"code\": \"def f(): pass\"}}' --json");
}

/// Takes the value following an option.
fn option_value(args: &[String], i: &mut usize, option: &str) -> Result<String, String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| format!("{} requires an argument", option))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => config.verbose = true,
            "--json" => config.json = true,
            "--list-capabilities" => config.list_capabilities = true,
            "--data" => config.data = Some(option_value(args, &mut i, "--data")?),
            "--start" => config.start_node = Some(option_value(args, &mut i, "--start")?),
            "--config" => config.config_path = Some(option_value(args, &mut i, "--config")?),
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.graph_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.graph_path = Some(arg.clone());
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Reads initial run data from inline JSON or a YAML/JSON file.
fn load_initial_data(source: &str) -> Result<StateData, Box<dyn std::error::Error>> {
    let content = if source.trim_start().starts_with('{') {
        source.to_string()
    } else {
        fs::read_to_string(source)
            .map_err(|e| format!("Failed to read data file '{}': {}", source, e))?
    };

    let data: StateData = serde_yaml::from_str(&content)
        .map_err(|e| format!("Initial data must be a mapping: {}", e))?;
    Ok(data)
}

/// Initial data for the built-in demo run.
fn demo_data() -> StateData {
    let mut data = StateData::new();
    data.insert("code".into(), json!(EXAMPLE_CODE));
    data.insert("quality_threshold".into(), json!(DEFAULT_QUALITY_THRESHOLD));
    data.insert("max_iterations".into(), json!(DEMO_REVIEW_ITERATIONS));
    data
}

fn print_capabilities(capabilities: &dyn CapabilityLookup) {
    println!("{}", "Registered capabilities:".bold());
    for (name, kind) in capabilities.list() {
        println!("  {:28} {}", name, kind.to_string().cyan());
    }
}

/// Renders a value on one line, shortened for the summary.
fn preview(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 72 {
        let kept: String = text.chars().take(69).collect();
        format!("{}...", kept)
    } else {
        text
    }
}

/// Prints a human-readable run summary.
fn print_summary(state: &WorkflowState) {
    println!();
    println!("{} {}", "Run".bold(), state.run_id);

    match &state.error {
        None => println!("Status: {}", "completed".green().bold()),
        Some(e) => println!("Status: {} ({})", "failed".red().bold(), e),
    }

    let executed = state
        .execution_log
        .iter()
        .filter(|entry| entry.message.starts_with("Executing node"))
        .count();
    println!("Nodes executed: {}", executed);
    if let Some(node) = &state.current_node {
        println!("Last node: {}", node);
    }

    println!();
    println!("{}", "Execution log:".bold());
    for entry in &state.execution_log {
        println!(
            "  {} [{}] {}",
            entry.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
            entry.node_id.yellow(),
            entry.message
        );
    }

    println!();
    println!("{}", "Final state:".bold());
    for (key, value) in &state.data {
        println!("  {:20} {}", key, preview(value));
    }
}

/// Main application entry point. Returns whether the run succeeded.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);

    if !config.json {
        print_banner();
    }

    let engine_config = match &config.config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_default()?,
    };

    let registry = CapabilityRegistry::new();
    review::register_builtins(&registry)?;
    let engine = WorkflowEngine::with_config(Arc::new(registry), engine_config);

    if config.list_capabilities {
        print_capabilities(engine.capabilities());
        return Ok(true);
    }
    info!("Iteration cap: {}", engine.config().max_iterations);

    let graph_id = match &config.graph_path {
        Some(path) => {
            let definition = load_graph_definition(path).map_err(|e| {
                error!("Failed to load graph: {}", e);
                e
            })?;
            engine.create_graph(&definition)?
        }
        None => {
            info!("No graph file given, running the built-in code review graph");
            engine.register_graph(review::code_review_graph()?)?;
            CODE_REVIEW_GRAPH_ID.to_string()
        }
    };

    let initial_data = match &config.data {
        Some(source) => load_initial_data(source)?,
        None if config.graph_path.is_none() => demo_data(),
        None => StateData::new(),
    };

    let state = engine.run(&graph_id, initial_data, config.start_node.as_deref())?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&RunResponse::from_state(&state))?);
    } else {
        print_summary(&state);
    }

    Ok(state.succeeded())
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
