// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Construction-time errors (the only place this crate returns `Result`) and
// the diagnostic error-kind classification used by the logging sink.

use thiserror::Error;

/// Errors returned by fallible constructors (size-class tables, container
/// configuration). Hot-path operations never return this type; see
/// `logging` for how hot-path diagnostics are reported instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("size-class table must contain at least one entry")]
    EmptySizeClassTable,
    #[error("size-class table must be sorted ascending by slot_bytes")]
    UnsortedSizeClasses,
    #[error("size class at index {index} has zero slot_bytes")]
    ZeroSlotBytes { index: usize },
    #[error("size class at index {index} has zero initial_slots_per_chunk")]
    ZeroSlotsPerChunk { index: usize },
}

/// Diagnostic classification for hot-path error conditions. Never
/// propagated as a `Result`; used only to select a log message and to
/// tag the structured fields passed to the logging sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CorruptHeader,
    DoubleFree,
    UnknownAddress,
    RetireLeakOnShutdown,
    DestructorRemainingNodes,
    PrecondViolation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CorruptHeader => "CorruptHeader",
            ErrorKind::DoubleFree => "DoubleFree",
            ErrorKind::UnknownAddress => "UnknownAddress",
            ErrorKind::RetireLeakOnShutdown => "RetireLeakOnShutdown",
            ErrorKind::DestructorRemainingNodes => "DestructorRemainingNodes",
            ErrorKind::PrecondViolation => "PrecondViolation",
        }
    }
}
