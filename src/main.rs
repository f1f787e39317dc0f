mod app;
mod cli;
mod config;
mod input;
mod k8s;
mod metrics;
mod mirror;
mod model;
mod nav;
mod session;
mod ui;
mod view;

use anyhow::{Context, Result};
use app::{App, AppCommand};
use clap::Parser;
use cli::CliArgs;
use config::LastSource;
use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use k8s::KubeGateway;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use session::{ClusterBackend, WatchSession};
use std::io::{self, Stdout};
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::warn;
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
const LOGS_TIMEOUT: Duration = Duration::from_secs(5);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter)?;

    let last_source = config::load_last_source();
    let context = args.context.clone().or_else(|| {
        last_source
            .as_ref()
            .map(|source| source.context.clone())
            .filter(|context| !context.is_empty())
    });
    let mut gateway = KubeGateway::new(context).await?;

    if args.all_namespaces && args.namespace.is_some() {
        warn!("both --all-namespaces and --namespace were provided, using all namespaces");
    }
    let namespace = resolve_namespace(&args, last_source.as_ref(), &gateway);

    let mut app = App::new(
        gateway.context().to_string(),
        gateway.cluster().to_string(),
        gateway.user().to_string(),
        namespace,
    );
    app.set_contexts(gateway.contexts());

    run(&mut app, &mut gateway, args.usage_ms.max(1_000)).await
}

fn init_tracing(level_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::sink)
        .try_init();

    Ok(())
}

fn resolve_namespace(
    args: &CliArgs,
    last_source: Option<&LastSource>,
    gateway: &KubeGateway,
) -> Option<String> {
    if args.all_namespaces {
        return None;
    }
    if let Some(namespace) = &args.namespace {
        return Some(namespace.clone());
    }
    if let Some(source) = last_source
        && !source.namespace.is_empty()
    {
        return Some(source.namespace.clone());
    }
    Some(gateway.default_namespace().to_string())
}

async fn run(app: &mut App, gateway: &mut KubeGateway, usage_ms: u64) -> Result<()> {
    let mut terminal = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, gateway, usage_ms).await;
    let restore_result = restore_terminal(&mut terminal);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    gateway: &mut KubeGateway,
    usage_ms: u64,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = WatchSession::new(gateway.clone(), tx);
    let usage_interval = Duration::from_millis(usage_ms);

    refresh_discovery(app, gateway).await;
    activate_scope(app, &mut session, usage_interval);
    persist_last_source(app);

    let mut reader = EventStream::new();
    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.mode(), key) {
                            let command = app.apply_action(action);
                            execute_app_command(app, gateway, &mut session, usage_interval, command)
                                .await;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            maybe_message = rx.recv() => {
                if let Some(message) = maybe_message {
                    app.handle_message(message);
                }
            }
        }
    }

    Ok(())
}

fn activate_scope(
    app: &mut App,
    session: &mut WatchSession<KubeGateway>,
    usage_interval: Duration,
) {
    let scope = app.scope().clone();
    let generation = session.activate(&scope, usage_interval);
    app.begin_scope(generation);
}

fn persist_last_source(app: &App) {
    let source = LastSource {
        context: app.context().to_string(),
        namespace: app.scope().namespace.clone().unwrap_or_default(),
    };
    if let Err(error) = config::save_last_source(&source) {
        warn!("failed to persist last source: {error:#}");
    }
}

async fn refresh_discovery(app: &mut App, gateway: &KubeGateway) {
    match timeout(DISCOVERY_TIMEOUT, gateway.list_kinds()).await {
        Ok(Ok(kinds)) => app.set_discovered(kinds),
        Ok(Err(error)) => app.set_status(format!("API discovery failed: {error:#}")),
        Err(_) => app.set_status("API discovery timed out"),
    }
}

async fn execute_app_command(
    app: &mut App,
    gateway: &mut KubeGateway,
    session: &mut WatchSession<KubeGateway>,
    usage_interval: Duration,
    command: AppCommand,
) {
    match command {
        AppCommand::None => {}
        AppCommand::ActivateScope => {
            activate_scope(app, session, usage_interval);
            persist_last_source(app);
        }
        AppCommand::LoadPodLogs { namespace, name } => {
            match timeout(LOGS_TIMEOUT, gateway.fetch_pod_logs(&namespace, &name, false)).await {
                Ok(Ok(logs)) => {
                    app.set_logs_overlay(format!("Logs {namespace}/{name}"), logs);
                    app.set_status(format!("Loaded logs for {namespace}/{name}"));
                }
                Ok(Err(error)) => {
                    app.set_status(format!(
                        "Failed loading logs for {namespace}/{name}: {error:#}"
                    ));
                }
                Err(_) => {
                    app.set_status(format!("Log fetch timed out for {namespace}/{name}"));
                }
            }
        }
        AppCommand::ExecProbe {
            namespace,
            name,
            command,
        } => match run_kubectl_exec(&namespace, &name, &command).await {
            Ok(output) => {
                app.set_shell_overlay(format!("Exec {namespace}/{name}"), output);
                app.set_status(format!("Exec completed for {namespace}/{name}"));
            }
            Err(error) => {
                app.set_status(format!("Exec failed for {namespace}/{name}: {error:#}"));
            }
        },
        AppCommand::DeleteObject {
            kind,
            namespace,
            name,
        } => match gateway.delete_object(&kind, namespace.as_deref(), &name).await {
            Ok(()) => {
                // The mirror catches up through the watch's Deleted event.
                app.set_status(match namespace {
                    Some(namespace) => format!("Deleted {} {namespace}/{name}", kind.plural()),
                    None => format!("Deleted {} {name}", kind.plural()),
                });
            }
            Err(error) => {
                app.set_status(format!(
                    "Delete failed for {} {name}: {error:#}",
                    kind.plural()
                ));
            }
        },
        AppCommand::SwitchContext { context } => match gateway.switch_context(&context).await {
            Ok(()) => {
                session.set_backend(gateway.clone());
                app.set_kube_target(
                    gateway.context().to_string(),
                    gateway.cluster().to_string(),
                    gateway.user().to_string(),
                );
                app.set_contexts(gateway.contexts());
                refresh_discovery(app, gateway).await;
                activate_scope(app, session, usage_interval);
                persist_last_source(app);
                app.set_status(format!(
                    "Switched context to '{}' ({})",
                    gateway.context(),
                    gateway.cluster()
                ));
            }
            Err(error) => {
                app.set_status(format!("Context switch failed for '{context}': {error:#}"));
            }
        },
    }
}

async fn run_kubectl_exec(namespace: &str, pod_name: &str, command: &[String]) -> Result<String> {
    let mut cmd = TokioCommand::new("kubectl");
    cmd.arg("exec")
        .arg("-n")
        .arg(namespace)
        .arg(pod_name)
        .arg("--")
        .args(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to execute kubectl for {namespace}/{pod_name}"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let rendered = if stderr.trim().is_empty() {
        stdout.to_string()
    } else if stdout.trim().is_empty() {
        format!("stderr:\n{stderr}")
    } else {
        format!("stdout:\n{stdout}\n\nstderr:\n{stderr}")
    };

    if output.status.success() {
        Ok(rendered)
    } else {
        Err(anyhow::anyhow!(
            "kubectl exec exited with {}",
            output.status
        ))
    }
}
