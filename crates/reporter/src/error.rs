// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Failure categories for one run, mapped to process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing required field or invalid combination. Fatal before any I/O.
    Config,
    /// Bad credentials or an expired session that re-auth could not recover.
    Auth,
    /// Every configured source failed for the window.
    Collection,
    /// Report was produced but could not be delivered.
    Delivery,
    Internal,
}

impl ErrorCategory {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config => 1,
            Self::Auth | Self::Collection => 2,
            Self::Delivery => 3,
            Self::Internal => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "CONFIG",
            Self::Auth => "AUTH",
            Self::Collection => "COLLECTION",
            Self::Delivery => "DELIVERY",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A categorized run failure carrying its underlying error chain.
#[derive(Debug)]
pub struct RunError {
    pub category: ErrorCategory,
    pub error: anyhow::Error,
}

impl RunError {
    pub fn new(category: ErrorCategory, error: anyhow::Error) -> Self {
        Self { category, error }
    }

    pub fn config(error: anyhow::Error) -> Self {
        Self::new(ErrorCategory::Config, error)
    }

    pub fn collection(error: anyhow::Error) -> Self {
        Self::new(ErrorCategory::Collection, error)
    }

    pub fn delivery(error: anyhow::Error) -> Self {
        Self::new(ErrorCategory::Delivery, error)
    }

    pub fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.category, self.error)
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
