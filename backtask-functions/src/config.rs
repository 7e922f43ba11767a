//! Server configuration module
//!
//! Handles loading of hosting settings from environment variables. The
//! enqueue settings themselves live in [`backtask_gcp::GcpConfig`].

use anyhow::{anyhow, Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;

/// A function this server can host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionTarget {
    /// HTTP-triggered function that enqueues one task
    Enqueue,
    /// Task-queue-triggered function that receives dispatched tasks
    ProcessTask,
}

impl FunctionTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionTarget::Enqueue => "enqueue",
            FunctionTarget::ProcessTask => "processtask",
        }
    }
}

impl fmt::Display for FunctionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enqueue" => Ok(FunctionTarget::Enqueue),
            "processtask" => Ok(FunctionTarget::ProcessTask),
            other => Err(anyhow!(
                "unknown function target '{}', expected 'enqueue' or 'processtask'",
                other
            )),
        }
    }
}

/// Hosting configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port to listen on
    pub port: u16,
    /// Function additionally served at `/`
    pub function_target: Option<FunctionTarget>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `PORT`: HTTP port (default: 8080)
    /// - `FUNCTION_TARGET`: `enqueue` or `processtask` (optional)
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("Invalid PORT value")?;

        let function_target = match env::var("FUNCTION_TARGET") {
            Ok(value) if !value.trim().is_empty() => Some(value.parse()?),
            _ => None,
        };

        Ok(Self {
            port,
            function_target,
        })
    }
}
