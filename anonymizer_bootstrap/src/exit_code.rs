// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Codes
//!
//! sysexits-style process exit codes for the service binary, so init
//! systems and scripts can distinguish configuration problems from
//! runtime failures.

use std::fmt;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Clean shutdown.
    Success,
    /// Unspecified runtime failure.
    Failure,
    /// The configuration could not be loaded or validated.
    ConfigError,
    /// A backing store could not be initialized.
    StorageError,
    /// The listener could not be bound.
    BindError,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Failure => 1,
            ExitCode::ConfigError => 78,  // EX_CONFIG
            ExitCode::StorageError => 74, // EX_IOERR
            ExitCode::BindError => 69,    // EX_UNAVAILABLE
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "success",
            ExitCode::Failure => "failure",
            ExitCode::ConfigError => "configuration error",
            ExitCode::StorageError => "storage initialization error",
            ExitCode::BindError => "listener bind error",
        }
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Success
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_i32(), self.description())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.as_i32()
    }
}
