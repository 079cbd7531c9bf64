use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

use pinflow_debugger::server::{self, DebugServer};
use pinflow_debugger::{EmitterConfig, EventEmitter};
use pinflow_node::{PinRef, ResolvedGraph, Value};
use pinflow_resolver::{Resolver, Secrets, StandardResolver};
use pinflow_runtime::{ExecuteOptions, GraphInput, GraphOutput, SessionConfig, execute};

/// Pinflow - resolve and run visual dataflow graphs
#[derive(Parser)]
#[command(name = "pinflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.pinflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve a flow and print the resolved graph as JSON
  Resolve {
    /// Path to the flow file (JSON or YAML)
    flow_file: PathBuf,

    /// Secrets file (default: <data-dir>/secrets.json when present)
    #[arg(long)]
    secrets: Option<PathBuf>,
  },

  /// Resolve and execute a flow, printing its outputs as JSON
  Run {
    /// Path to the flow file (JSON or YAML)
    flow_file: PathBuf,

    /// Root inputs as a JSON object; read from stdin when omitted
    #[arg(long)]
    inputs: Option<String>,

    /// Secrets file (default: <data-dir>/secrets.json when present)
    #[arg(long)]
    secrets: Option<PathBuf>,

    /// Destroy the session after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print batched debugger events to stderr
    #[arg(long)]
    events: bool,

    /// Serve the debug protocol (websocket at /ws, /history, /state)
    #[arg(long)]
    debug_addr: Option<SocketAddr>,

    /// Pause when a value reaches this pin, as <instance path>.<pin>
    #[arg(long = "break", value_parser = parse_breakpoint)]
    breakpoints: Vec<PinRef>,
  },
}

struct RunOptions {
  timeout: Option<Duration>,
  print_events: bool,
  debug_addr: Option<SocketAddr>,
  breakpoints: Vec<PinRef>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .ok_or_else(|| anyhow!("could not determine home directory"))?
      .join(".pinflow"),
  };

  match cli.command {
    Some(Commands::Resolve { flow_file, secrets }) => {
      let secrets = load_secrets(secrets, &data_dir)?;
      let graph = resolve(&flow_file, &secrets)?;
      println!("{}", serde_json::to_string_pretty(&graph)?);
    }
    Some(Commands::Run {
      flow_file,
      inputs,
      secrets,
      timeout_ms,
      events,
      debug_addr,
      breakpoints,
    }) => {
      let secrets = load_secrets(secrets, &data_dir)?;
      let graph = resolve(&flow_file, &secrets)?;
      let inputs = match inputs {
        Some(text) => serde_json::from_str(&text).context("failed to parse --inputs JSON")?,
        None => read_inputs_from_stdin()?,
      };

      let rt = tokio::runtime::Runtime::new()?;
      let options = RunOptions {
        timeout: timeout_ms.map(Duration::from_millis),
        print_events: events,
        debug_addr,
        breakpoints,
      };
      let outputs = rt.block_on(run_flow(graph, inputs, options))?;
      println!("{}", serde_json::to_string_pretty(&outputs)?);
    }
    None => {
      println!("pinflow - use --help to see available commands");
    }
  }

  Ok(())
}

fn resolve(flow_file: &Path, secrets: &Secrets) -> Result<ResolvedGraph> {
  let library = pinflow_stdlib::library().context("failed to build the standard library")?;
  StandardResolver::new(library)
    .resolve(flow_file, secrets)
    .with_context(|| format!("failed to resolve flow: {}", flow_file.display()))
}

/// Process environment, overlaid with the secrets file.
fn load_secrets(path: Option<PathBuf>, data_dir: &Path) -> Result<Secrets> {
  let mut secrets = Secrets::from_env();

  let path = match path {
    Some(path) => path,
    None => {
      let default = data_dir.join("secrets.json");
      if !default.exists() {
        return Ok(secrets);
      }
      default
    }
  };

  let content = std::fs::read_to_string(&path)
    .with_context(|| format!("failed to read secrets file: {}", path.display()))?;
  let values: BTreeMap<String, String> = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse secrets file: {}", path.display()))?;
  secrets.extend(values.into_iter().collect());
  Ok(secrets)
}

async fn run_flow(
  graph: ResolvedGraph,
  inputs: Value,
  run: RunOptions,
) -> Result<BTreeMap<String, Vec<Value>>> {
  let Value::Object(inputs) = inputs else {
    bail!("inputs must be a JSON object");
  };

  let mut options = ExecuteOptions::new(graph).config(SessionConfig {
    breakpoints: run.breakpoints,
    ..Default::default()
  });
  for (pin, value) in inputs {
    options = options.input(pin, GraphInput::fixed(value));
  }

  let mut receivers = HashMap::new();
  let output_pins: Vec<String> = options.graph.main.outputs.keys().cloned().collect();
  for pin in output_pins {
    let (output, receiver) = GraphOutput::channel();
    options = options.output(pin.clone(), output);
    receivers.insert(pin, receiver);
  }

  // Bound before the session starts so a busy port fails fast
  let listener = match run.debug_addr {
    Some(addr) => Some(
      TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind debug server to {addr}"))?,
    ),
    None => None,
  };

  let (batches, _) = broadcast::channel(server::CLIENT_BUFFER);
  let debugging = run.print_events || listener.is_some();
  let (emitter, relay) = if debugging {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let print_events = run.print_events;
    let clients = batches.clone();
    let relay = tokio::spawn(async move {
      while let Some(message) = rx.recv().await {
        if print_events {
          if let Ok(line) = serde_json::to_string(&message) {
            eprintln!("{line}");
          }
        }
        // No debug client connected
        let _ = clients.send(message);
      }
    });
    let emitter = Arc::new(EventEmitter::start(EmitterConfig::default(), Some(tx)));
    options = options.debugger(emitter.clone());
    (Some(emitter), Some(relay))
  } else {
    (None, None)
  };

  let session = execute(options).context("failed to start session")?;
  let execution_id = session.execution_id().to_string();

  let debug_server = match (listener, &emitter) {
    (Some(listener), Some(emitter)) => {
      eprintln!("Debugger listening on http://{}", listener.local_addr()?);
      let server = DebugServer::new(
        Arc::new(session.control()),
        emitter.history().clone(),
        session.state().clone(),
        batches.clone(),
      );
      let handle = tokio::spawn(server::serve(listener, server.clone()));
      Some((server, handle))
    }
    _ => None,
  };

  let wait = session.wait();
  tokio::pin!(wait);
  let outcome = tokio::select! {
    outcome = &mut wait => outcome?,
    _ = tokio::signal::ctrl_c() => {
      eprintln!("Interrupted");
      bail!("execution {execution_id} interrupted");
    }
    _ = sleep_or_forever(run.timeout) => {
      bail!("execution {execution_id} timed out");
    }
  };
  eprintln!("Execution {execution_id} finished: {outcome:?}");

  if let Some(emitter) = emitter {
    emitter.shutdown();
  }
  // The relay ends once the emitter has flushed its last batch
  if let Some(relay) = relay {
    relay.await.context("event relay failed")?;
  }
  if let Some((server, handle)) = debug_server {
    server.shutdown();
    handle
      .await
      .context("debug server task failed")?
      .context("debug server failed")?;
  }

  let mut outputs = BTreeMap::new();
  for (pin, mut receiver) in receivers {
    let mut values = Vec::new();
    while let Ok(value) = receiver.try_recv() {
      values.push(value);
    }
    outputs.insert(pin, values);
  }
  Ok(outputs)
}

/// Parse `<instance path>.<pin>`; the instance path may itself contain dots.
fn parse_breakpoint(text: &str) -> Result<PinRef, String> {
  match text.rsplit_once('.') {
    Some((ins_id, pin_id)) if !ins_id.is_empty() && !pin_id.is_empty() => {
      Ok(PinRef::new(ins_id, pin_id))
    }
    _ => Err(format!("expected <instance>.<pin>, got '{text}'")),
  }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
  match timeout {
    Some(timeout) => tokio::time::sleep(timeout).await,
    None => std::future::pending().await,
  }
}

fn read_inputs_from_stdin() -> Result<Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, no inputs
    Ok(serde_json::json!({}))
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read inputs from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse inputs JSON from stdin")
    }
  }
}
