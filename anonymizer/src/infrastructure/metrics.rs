// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service
//!
//! Prometheus counters and histograms for the request path, exposed in
//! text form at `GET /metrics`.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};

use anonymizer_domain::PipelineError;

/// Prometheus registry plus the collectors the request path updates.
pub struct MetricsService {
    registry: Registry,
    requests_total: IntCounter,
    pipeline_failures_total: IntCounter,
    request_duration_seconds: Histogram,
}

impl MetricsService {
    pub fn new() -> Result<Self, PipelineError> {
        let registry = Registry::new();
        let requests_total = IntCounter::with_opts(Opts::new(
            "anonymizer_requests_total",
            "Total anonymization requests processed",
        ))
        .map_err(|e| PipelineError::InternalError(format!("Metrics initialization failed: {}", e)))?;
        let pipeline_failures_total = IntCounter::with_opts(Opts::new(
            "anonymizer_pipeline_failures_total",
            "Requests whose pipeline reported failure",
        ))
        .map_err(|e| PipelineError::InternalError(format!("Metrics initialization failed: {}", e)))?;
        let request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "anonymizer_request_duration_seconds",
            "Wall-clock duration of pipeline runs",
        ))
        .map_err(|e| PipelineError::InternalError(format!("Metrics initialization failed: {}", e)))?;

        registry
            .register(Box::new(requests_total.clone()))
            .and_then(|_| registry.register(Box::new(pipeline_failures_total.clone())))
            .and_then(|_| registry.register(Box::new(request_duration_seconds.clone())))
            .map_err(|e| PipelineError::InternalError(format!("Metrics registration failed: {}", e)))?;

        Ok(MetricsService {
            registry,
            requests_total,
            pipeline_failures_total,
            request_duration_seconds,
        })
    }

    /// Records one completed pipeline run.
    pub fn observe_request(&self, duration_seconds: f64, success: bool) {
        self.requests_total.inc();
        if !success {
            self.pipeline_failures_total.inc();
        }
        self.request_duration_seconds.observe(duration_seconds);
    }

    /// The registry contents in Prometheus text exposition format.
    pub fn export(&self) -> Result<String, PipelineError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| PipelineError::InternalError(format!("Metrics encoding failed: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| PipelineError::InternalError(format!("Metrics encoding failed: {}", e)))
    }
}
