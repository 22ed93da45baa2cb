use crate::error::RandRunError;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runnable {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
}

impl Runnable {
    /// Command and arguments joined for display.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElapsedRecord {
    pub key: String,
    pub seconds: u64,
}

/// Scope of the store transaction used while a runnable is being timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CommitPolicy {
    /// One transaction held for the whole run; committed when the child exits.
    #[default]
    Session,
    /// A short transaction per tick.
    Tick,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub list_path: PathBuf,
    pub store_path: PathBuf,
    pub tick: Duration,
    pub commit_policy: CommitPolicy,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Selected {
        runnable: Runnable,
    },
    Resumed {
        key: String,
        prior_seconds: u64,
    },
    Tick {
        seconds: u64,
    },
    ProcessExited {
        success: bool,
        code: Option<i32>,
    },
    LaunchFailed {
        message: String,
    },
    Finalized {
        key: String,
        seconds: u64,
    },
}

/// What a finished session hands back to the CLI layer.
#[derive(Debug)]
pub struct SessionSummary {
    pub runnable: Runnable,
    pub prior_seconds: u64,
    pub final_seconds: u64,
    pub launch: Result<ExitStatus, RandRunError>,
}

impl SessionSummary {
    /// Seconds added to the stored total by this session.
    pub fn tracked_seconds(&self) -> u64 {
        self.final_seconds.saturating_sub(self.prior_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedRecord {
    pub rank: usize,
    pub name: String,
    pub seconds: u64,
    pub hours: u64,
    pub minutes: u64,
    pub secs: u64,
}
