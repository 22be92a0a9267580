// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Severity-leveled log sink plus the error/warning counters exposed by
// `GetErrorWarningLogCount`. The default sink forwards to `tracing`; callers
// may install their own sink to intercept diagnostics instead.

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Severity of a diagnostic emitted by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Warn,
    Error,
}

/// A settable logging sink. Installed sinks must not panic and must not block.
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, message: &str);
}

struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => tracing::debug!("{message}"),
            Severity::Warn => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
    }
}

static SINK: Lazy<RwLock<Box<dyn LogSink>>> = Lazy::new(|| RwLock::new(Box::new(TracingSink)));

static ERROR_COUNT: AtomicU64 = AtomicU64::new(0);
static WARN_COUNT: AtomicU64 = AtomicU64::new(0);

/// Install a custom logging sink, replacing the default `tracing` forwarder.
pub fn set_log_sink(sink: Box<dyn LogSink>) {
    *SINK.write() = sink;
}

/// Emit a diagnostic through the installed sink, bumping the error/warning
/// counters for ERROR and WARN severities.
pub fn log(severity: Severity, message: impl AsRef<str>) {
    match severity {
        Severity::Error => {
            ERROR_COUNT.fetch_add(1, Ordering::Relaxed);
        }
        Severity::Warn => {
            WARN_COUNT.fetch_add(1, Ordering::Relaxed);
        }
        Severity::Debug => {}
    }
    SINK.read().log(severity, message.as_ref());
}

/// Read the current error/warning counters without resetting them.
pub fn get_error_warning_log_count() -> (u64, u64) {
    (
        ERROR_COUNT.load(Ordering::Relaxed),
        WARN_COUNT.load(Ordering::Relaxed),
    )
}

/// Read and atomically reset the error/warning counters.
pub fn get_error_warning_log_count_and_reset() -> (u64, u64) {
    (
        ERROR_COUNT.swap(0, Ordering::Relaxed),
        WARN_COUNT.swap(0, Ordering::Relaxed),
    )
}
