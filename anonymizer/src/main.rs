// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Service binary: parse arguments, load settings, wire the stores and
//! the HTTP shell, serve until a termination signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use anonymizer::execution::ServiceContext;
use anonymizer::infrastructure::auth::provider_from_settings;
use anonymizer::infrastructure::config::{ContextProviderKind, Settings};
use anonymizer::infrastructure::metrics::MetricsService;
use anonymizer::infrastructure::repositories::{NoAuditStore, SqliteAuditStore, SqliteContextStore};
use anonymizer::presentation::{router, AppState};
use anonymizer_bootstrap::{init_logging, shutdown_signal, ExitCode};
use anonymizer_domain::repositories::context_store::NoContextStore;
use anonymizer_domain::repositories::{AuditStore, ContextStore};

#[derive(Debug, Parser)]
#[command(name = "anonymizer", about = "Privacy-preserving data pipeline orchestrator")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listener host override
    #[arg(long)]
    host: Option<String>,

    /// Listener port override
    #[arg(long)]
    port: Option<u16>,

    /// Enable debug logging (RUST_LOG still wins)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let code = run().await;
    if !code.is_success() {
        error!(exit = %code, "terminating");
    }
    std::process::exit(code.as_i32());
}

async fn run() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("unable to install logger: {}", e);
    }

    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "unable to load configuration");
            return ExitCode::ConfigError;
        }
    };
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    let context_store: Arc<dyn ContextStore> = match settings.context.provider {
        ContextProviderKind::None => Arc::new(NoContextStore),
        ContextProviderKind::Sqlite => {
            let Some(sqlite) = settings.context.sqlite.clone() else {
                error!("context provider SQLITE configured without a sqlite section");
                return ExitCode::ConfigError;
            };
            match SqliteContextStore::connect(&sqlite.path).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(error = %e, "unable to initialize context store");
                    return ExitCode::StorageError;
                }
            }
        }
    };

    let audit_store: Arc<dyn AuditStore> = match &settings.audit.sqlite {
        None => Arc::new(NoAuditStore),
        Some(sqlite) => match SqliteAuditStore::connect(&sqlite.path).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(error = %e, "unable to initialize audit store");
                return ExitCode::StorageError;
            }
        },
    };

    let auth = provider_from_settings(&settings.auth);
    let metrics = match MetricsService::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(e) => {
            error!(error = %e, "unable to initialize metrics");
            return ExitCode::Failure;
        }
    };

    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let shared_settings = settings.into_shared();
    let services = Arc::new(ServiceContext {
        settings: shared_settings.clone(),
        context_store,
        audit_store,
    });
    let state = AppState {
        settings: shared_settings,
        services,
        auth,
        metrics,
    };

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %address, error = %e, "unable to bind listener");
            return ExitCode::BindError;
        }
    };
    info!(address = %address, "anonymizer listening");

    match axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            error!(error = %e, "server terminated abnormally");
            ExitCode::Failure
        }
    }
}
