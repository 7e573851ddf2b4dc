// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Logger
//!
//! Installs the process-wide tracing subscriber. The level comes from
//! `RUST_LOG` when set, otherwise from the verbosity flag; structured
//! fields are rendered by the fmt layer.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// `verbose` lowers the default level to DEBUG; an explicit `RUST_LOG`
/// always wins. Returns an error message when a subscriber is already
/// installed (e.g. in tests).
pub fn init_logging(verbose: bool) -> Result<(), String> {
    let default_level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| e.to_string())
}
