// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cepd --demo`: runs the control plane end-to-end against an in-memory
//! wire client and an echo executor, to exercise the full
//! interactor → handler → processor → worker → reply pipeline without a
//! real upstream service or plugin runtime. A production deployment
//! supplies its own `WireClient`, `DocumentParser`, and `DocumentExecutor`
//! and calls `cep_daemon::runtime::build` directly.

use cep_daemon::demo::{EchoExecutor, PassthroughParser};
use cep_daemon::{ensure_directories, lock_path, Lock};
use cep_wire::test_support::FakeWireClient;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config_path =
        std::env::var("CEP_CONFIG").map(std::path::PathBuf::from).unwrap_or_else(|_| std::path::PathBuf::from("/etc/cepd/config.toml"));
    let config = match cep_core::Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config from {}: {e}", config_path.display());
            return std::process::ExitCode::FAILURE;
        }
    };

    let _log_guard = cep_daemon::logging::init(&config.instance_root().join("logs"));

    if let Err(e) = ensure_directories(&config) {
        eprintln!("failed to prepare control plane directories: {e}");
        return std::process::ExitCode::FAILURE;
    }

    let lock = match Lock::acquire(&lock_path(&config)) {
        Ok(lock) => lock,
        Err(e) => {
            eprintln!("failed to acquire daemon lock: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let wire = Arc::new(FakeWireClient::new());
    let parser = Arc::new(PassthroughParser);
    let stop_timeout = config.stop_timeout;
    let mut daemon = cep_daemon::build(config, wire, parser, Arc::new(EchoExecutor), Arc::new(EchoExecutor)).await;
    daemon.start();

    info!("cepd demo running; press Ctrl+C to stop");
    let _ = tokio::signal::ctrl_c().await;

    info!("shutting down");
    daemon.shutdown(stop_timeout).await;
    drop(lock);
    std::process::ExitCode::SUCCESS
}
