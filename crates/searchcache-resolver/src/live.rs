//! Live search backed by an external program.
//!
//! The program gets the query as its last argument and must print a JSON
//! object on stdout. String values are kept as-is, other values are kept in
//! their JSON form. A spawn failure, non-zero exit or unparseable output
//! becomes a payload with `error` set.

use std::process::Command;

use tracing::{debug, warn};

use searchcache_core::{LiveSearch, Payload};

pub struct CommandLiveSearch {
    program: String,
    args: Vec<String>,
}

impl CommandLiveSearch {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a `[program, args...]` list as found in the settings.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self::new(program.clone(), args.to_vec()))
    }

    fn run(&self, query: &str) -> anyhow::Result<Payload> {
        debug!(program = %self.program, "running live search command");
        let output = Command::new(&self.program).args(&self.args).arg(query).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "live search command exited with {}: {}",
                output.status,
                stderr.trim().chars().take(300).collect::<String>()
            );
        }
        parse_output(&output.stdout)
    }
}

/// Turn the program's stdout into a payload.
pub fn parse_output(stdout: &[u8]) -> anyhow::Result<Payload> {
    let value: serde_json::Value = serde_json::from_slice(stdout)?;
    let serde_json::Value::Object(map) = value else {
        anyhow::bail!("live search output is not a JSON object");
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect())
}

impl LiveSearch for CommandLiveSearch {
    fn perform_live_search(&self, query: &str) -> Payload {
        match self.run(query) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "live search command failed");
                Payload::from_error(format!("{e:#}"))
            }
        }
    }
}
