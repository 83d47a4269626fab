mod logging;
mod server;

use clap::{ArgAction, Parser, Subcommand};
use kiln_agent::{SessionConfig, ToolSession};
use kiln_bridge::{BridgeConfig, HttpEditorBridge};
use kiln_buildstate::{BuildLock, BuildStateStore, CompletionDecision, StopHookInput, evaluate_stop};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Tool server and build guard for agent-driven game development")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the tool catalog as newline-delimited JSON-RPC on stdio.
    Serve(ServeArgs),
    /// Stop-hook entry point: blocks session end while a build is in progress.
    StopHook(StopHookArgs),
    InspectState(InspectStateArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "KILN_PROJECT_ROOT")]
    project_root: Option<PathBuf>,
    /// Overrides KILN_BRIDGE_PORT.
    #[arg(long)]
    bridge_port: Option<u16>,
    #[arg(long, env = "KILN_BRIDGE_HOST")]
    bridge_host: Option<String>,
}

#[derive(clap::Args, Debug)]
struct StopHookArgs {
    /// Takes precedence over the `cwd` reported by the host.
    #[arg(long, env = "KILN_PROJECT_ROOT")]
    project_root: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct InspectStateArgs {
    #[arg(long, env = "KILN_PROJECT_ROOT")]
    project_root: Option<PathBuf>,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    logging::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve(args) => serve_command(args).await,
        Commands::StopHook(args) => stop_hook_command(args),
        Commands::InspectState(args) => inspect_state_command(args),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

async fn serve_command(args: ServeArgs) -> Result<ExitCode, String> {
    let mut bridge_config = BridgeConfig::from_env();
    if let Some(port) = args.bridge_port.filter(|port| *port > 0) {
        bridge_config.port = port;
    }
    if let Some(host) = args.bridge_host.filter(|host| !host.trim().is_empty()) {
        bridge_config.host = host;
    }
    let bridge = HttpEditorBridge::from_config(&bridge_config).map_err(|e| e.to_string())?;

    let mut session_config = SessionConfig::from_env();
    if let Some(project_root) = args.project_root {
        session_config.project_root = project_root;
    }
    info!(
        project_root = %session_config.project_root.display(),
        bridge = %bridge.base_url(),
        "serving tools on stdio"
    );

    let mut session = ToolSession::new(session_config, Arc::new(bridge));
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    server::serve_jsonrpc_lines(stdin, &mut stdout, &mut session)
        .await
        .map_err(|e| format!("stdio transport failed: {e}"))?;
    Ok(ExitCode::SUCCESS)
}

/// Never fails: unreadable input lets the session end.
fn stop_hook_command(args: StopHookArgs) -> Result<ExitCode, String> {
    let mut raw = String::new();
    let input = match std::io::stdin().read_to_string(&mut raw) {
        Err(error) => {
            warn!(%error, "stop hook could not read stdin; allowing stop");
            None
        }
        Ok(_) if raw.trim().is_empty() => {
            warn!("stop hook received empty input; allowing stop");
            None
        }
        Ok(_) => match serde_json::from_str::<StopHookInput>(&raw) {
            Ok(input) => Some(input),
            Err(error) => {
                warn!(%error, "stop hook input is not valid JSON; allowing stop");
                None
            }
        },
    };

    let Some(input) = input else {
        return Ok(ExitCode::SUCCESS);
    };
    let project_root = input.project_root(args.project_root.as_deref(), &current_dir());
    let decision = evaluate_stop(&input, &project_root);
    if let CompletionDecision::Block { reason } = &decision {
        info!(%reason, "blocking stop while build is in progress");
    }
    if let Some(output) = decision.hook_output() {
        println!("{output}");
    }
    Ok(ExitCode::SUCCESS)
}

fn inspect_state_command(args: InspectStateArgs) -> Result<ExitCode, String> {
    let project_root = args.project_root.unwrap_or_else(current_dir);
    let store = BuildStateStore::for_project(&project_root);
    let lock = BuildLock::for_project(&project_root);
    let state = store.get().map_err(|e| e.to_string())?;

    if args.json {
        let json = serde_json::to_string_pretty(&state).map_err(|e| e.to_string())?;
        println!("{json}");
        return Ok(ExitCode::SUCCESS);
    }

    let Some(state) = state else {
        println!("checkpoint: {} (none)", store.path().display());
        println!("lock_held: {}", lock.is_held());
        return Ok(ExitCode::SUCCESS);
    };
    let gates_passed = state.current_phase.gates.values().filter(|passed| **passed).count();
    println!("checkpoint: {}", store.path().display());
    println!("build_id: {}", state.build_id);
    println!(
        "started_at: {}",
        state.started_at.as_deref().unwrap_or("<unknown>")
    );
    println!("current_phase: {}", state.phase_label());
    println!("phase_status: {}", state.current_phase.status.as_str());
    println!(
        "gates_passed: {gates_passed}/{}",
        state.current_phase.gates.len()
    );
    println!("completed_phases: {}", state.completed_phases.len());
    println!("files_written: {}", state.files_written.len());
    println!("unresolved_errors: {}", state.unresolved_errors());
    println!("test_runs: {}", state.test_runs.len());
    println!("quality_scores: {}", state.quality_scores.len());
    println!(
        "design_document: {}",
        state.design_document.as_deref().unwrap_or("<none>")
    );
    for step in &state.next_steps {
        println!("next_step: {step}");
    }
    println!("lock_held: {}", lock.is_held());
    Ok(ExitCode::SUCCESS)
}
