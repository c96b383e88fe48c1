use std::io::IsTerminal;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use room_dispatch::channels::{MatrixChannel, MessageSource};
use room_dispatch::config::{Credentials, DispatcherConfig, RulesFile};
use room_dispatch::logging;
use room_dispatch::pipeline::{
    AuthorizationList, Dispatcher, DispatcherState, PollSettings, RulesEngine,
};
use room_dispatch::store::{FileSessionStore, spawn_registry};
use room_dispatch::worker::{ProcessRunner, PromptBuilder, SessionSpawner, SpawnerDeps, WorkerPool};
use room_dispatch::workspace::Workspace;

/// Room Dispatch - turns chat-room requests into worker sessions.
#[derive(Parser, Debug)]
#[command(name = "room-dispatch", version, about, long_about = None)]
struct Cli {
    /// Detach, print the background process id, and exit.
    #[arg(long)]
    daemon: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Configuration errors are fatal in both modes, before anything starts.
    let config = DispatcherConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let credentials = Credentials::load(&config.credentials_path).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export DISPATCH_CREDENTIALS=/path/to/matrix-credentials.json");
        std::process::exit(1);
    });
    let rules_file = RulesFile::load(&config.rules_path).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    if cli.daemon {
        let pid = detach().context("starting background dispatcher")?;
        println!("{pid}");
        return Ok(());
    }

    let foreground = std::io::stderr().is_terminal();
    let _log_guard = logging::init(&config.log_path, foreground)?;

    let instance_id = credentials.instance_id();
    if foreground {
        eprintln!("📡 Room Dispatch v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("   Instance: {} ({})", credentials.instance_name, instance_id);
        eprintln!("   Room: {}", credentials.room_id);
        eprintln!("   Log: {}", config.log_path.display());
        eprintln!("   Sessions: {}\n", config.sessions_dir.display());
    }

    // ── Transport ────────────────────────────────────────────────────────
    let channel = Arc::new(MatrixChannel::new(&credentials)?);
    match channel.whoami().await {
        Ok(id) if id == credentials.user_id => info!(user_id = %id, "Credentials verified"),
        Ok(id) => warn!(
            expected = %credentials.user_id,
            actual = %id,
            "Access token belongs to a different user"
        ),
        Err(e) => warn!("Could not verify credentials: {e}"),
    }

    // ── Rules & authorization ────────────────────────────────────────────
    let mut mention_tokens = RulesEngine::mention_tokens_for(&credentials.user_id);
    mention_tokens.extend(rules_file.mention_tokens.iter().cloned());
    let rules = RulesEngine::new(&credentials.user_id, &mention_tokens, &rules_file.keywords)
        .unwrap_or_else(|e| {
            eprintln!("Error: invalid trigger rule in {}: {e}", config.rules_path.display());
            std::process::exit(1);
        });

    let allow_list = AuthorizationList::new(
        config
            .allowed_senders
            .iter()
            .chain(rules_file.allowed_senders.iter())
            .cloned(),
    );
    if allow_list.is_empty() {
        warn!("Allow-list is empty; every sender will be rejected");
    } else {
        info!(entries = ?allow_list.entries(), "Allow-list loaded");
    }

    // ── Sessions ─────────────────────────────────────────────────────────
    let store = FileSessionStore::open(&config.sessions_dir).await?;
    let (registry, registry_task) = spawn_registry(store);

    let spawner = SessionSpawner::new(SpawnerDeps {
        instance_id,
        sessions_dir: config.sessions_dir.clone(),
        registry,
        runner: Arc::new(ProcessRunner::from_command(&config.worker_command)?),
        context: Arc::new(Workspace::new(&config.context_path)),
        prompts: PromptBuilder::new(&credentials.instance_name, &credentials.room_id),
        pool: WorkerPool::new(config.max_sessions, config.admission),
    });

    let dispatcher = Dispatcher::new(
        channel,
        rules,
        spawner,
        DispatcherState::new(allow_list),
        PollSettings {
            poll_interval: config.poll_interval,
            retry_delay: config.retry_delay,
            fetch_limit: config.fetch_limit,
            announce: config.announce,
        },
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    dispatcher.run(shutdown).await;

    // Every registry handle is gone once the dispatcher is; wait for the final writes.
    if let Err(e) = registry_task.await {
        warn!("Session registry task ended abnormally: {e}");
    }
    Ok(())
}

/// Cancel `token` on Ctrl-C, or SIGTERM on Unix.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {e}");
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {e}");
            return;
        }
    }

    info!("Shutdown requested");
    token.cancel();
}

/// Re-launch this executable without `--daemon`, detached from the terminal.
fn detach() -> anyhow::Result<u32> {
    let exe = std::env::current_exe().context("locating current executable")?;
    let args = std::env::args_os().skip(1).filter(|a| a != "--daemon");

    let mut command = std::process::Command::new(exe);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command.spawn()?;
    Ok(child.id())
}
