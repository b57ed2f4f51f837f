use clap::Parser;
use ckstate_cli::commands::{cli, config, simulate};
use ckstate_core::api::{AppConfig, CliError, ContextError, LoggingConfig, SessionError, StateError};
use ckstate_plugins::factory::build_stack;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(&args)?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    match args.command {
        cli::Commands::Config(config_args) => config::handle_config(config_args, &cfg),
        cli::Commands::Simulate(sim_args) => run_simulate(sim_args, &cfg).await,
    }
}

fn load_config(args: &cli::Args) -> Result<AppConfig, CliError> {
    let loaded = match args.config.as_deref() {
        Some(path) => ckstate_core::api::load_from_path(path),
        None => ckstate_core::api::load_default(),
    };
    loaded.map_err(|e| CliError::Config(format!("{e:#}")))
}

async fn run_simulate(args: cli::SimulateArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let stack = build_stack(cfg);
    stack.start_background().await;

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling");
                cancel.cancel();
            }
        })
    };

    let result = simulate::simulate(&stack, &args, &cancel).await;
    ctrl_c.abort();

    if let Ok(state) = stack.sessions.get(&args.session_id).await {
        let outcomes = simulate::tool_outcomes(&state);
        tracing::info!(
            session_id = %state.session_id,
            stage = %state.current_stage,
            tools = ?outcomes,
            "simulation finished"
        );
    }
    stack.shutdown().await;

    let doc = result?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(0)
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 11: config error
    // 20: IO / logging setup error
    // 30: rejected state write (validation)
    // 40: session missing or expired
    // 50: internal/uncategorized
    // 130: cancelled
    match e {
        CliError::Config(_) => 11,
        CliError::Command(_) => 20,
        CliError::Io(_) => 20,
        CliError::State(se) => match se {
            StateError::Validation(_) => 30,
            StateError::System { source, .. }
                if matches!(**source, StateError::Validation(_)) =>
            {
                30
            }
            StateError::Cancelled => 130,
            _ => 50,
        },
        CliError::Session(se) => match se {
            SessionError::NotFound(_) | SessionError::Expired(_) => 40,
            SessionError::Stopped => 50,
        },
        CliError::Context(ContextError::Cancelled(_)) => 130,
        CliError::Json(_) => 50,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("ckstate"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("ckstate.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
