// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

/// Errors surfaced by the lander core outside of the command path.
///
/// Dispatch entry points never return these; they are used for name lookups
/// and for core construction.
#[derive(Debug, Error)]
pub enum LanderError {
    #[error("unsupported operation: {0}")]
    UnknownOperation(String),

    #[error("unsupported joint: {0}")]
    UnknownJoint(String),

    #[error("unsupported fault domain: {0}")]
    UnknownFaultDomain(String),

    #[error("{0} backend is not available")]
    BackendUnavailable(String),

    #[error("lander core must be created inside a tokio runtime")]
    NoRuntime,
}
