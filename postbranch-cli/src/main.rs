mod api;
mod cli;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use postbranch_core::catalog::Catalog;
use postbranch_core::runner::Runner;
use postbranch_core::{orchestrator, zfs};

use config::Config;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    init_logger(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::FAILURE
        }
    }
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    simple_logger::SimpleLogger::new().with_level(level).init().expect("logger installs exactly once");
}

async fn run(cli: cli::Cli) -> miette::Result<()> {
    let config = Config::load(&cli.config_file)
        .into_diagnostic()
        .wrap_err_with(|| format!("loading config from {}", cli.config_file.display()))?;

    if !nix::unistd::Uid::effective().is_root() {
        miette::bail!("postbranchd must run as root (euid 0); it manages ZFS pools and loop devices directly");
    }

    let runner = Arc::new(Runner::new());
    zfs::check_version(&runner).into_diagnostic().wrap_err("checking installed ZFS version")?;

    let catalog = Arc::new(Catalog::open(&config.catalog.path).await.into_diagnostic().wrap_err_with(|| {
        format!("opening catalog at {}", config.catalog.path.display())
    })?);

    let cancel = CancellationToken::new();
    orchestrator::mount_all(catalog.clone(), runner.clone(), cancel.clone())
        .await
        .into_diagnostic()
        .wrap_err("running mount-all at startup")?;

    let tasks = Arc::new(Mutex::new(JoinSet::new()));
    let state = api::AppState::new(catalog.clone(), runner.clone(), tasks.clone());
    let app = api::router(state);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.into_diagnostic().wrap_err_with(|| {
        format!("binding control API to {addr}")
    })?;
    log::info!("postbranchd listening on {addr}");

    let serve_cancel = cancel.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move { serve_cancel.cancelled().await });
    let server_task = tokio::spawn(async move { server.await });

    wait_for_shutdown_signal().await;
    log::info!("shutdown signal received, stopping control API and unmounting repos");
    cancel.cancel();

    server_task
        .await
        .into_diagnostic()
        .wrap_err("control API server task panicked")?
        .into_diagnostic()
        .wrap_err("control API server exited with an error")?;

    orchestrator::unmount_all(catalog, runner).await.into_diagnostic().wrap_err("running unmount-all at shutdown")?;

    let mut tasks = tasks.lock().await;
    while tasks.join_next().await.is_some() {}

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            return;
        };
        signal.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
