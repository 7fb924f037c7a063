//! Command-line surface (C7): `batchelor-ctl` takes a connection spec and
//! one action subcommand, mirroring the flags `send-event` /
//! `wait-task` / `cancel-task` / `signal-task` / `show-task` /
//! `show-tasks` / `show-event-types` describe.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "batchelor-ctl", about = "Control interface for the Batchelor batch dispatcher", styles = crate::output::clap_styles())]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct ConnectionArgs {
    /// One or more head base URLs; the client fails over between them.
    #[arg(long = "head-url", env = "BATCHELOR_HEAD_URL", required = true, num_args = 1..)]
    pub head_urls: Vec<String>,

    #[arg(long, env = "BATCHELOR_API_KEY")]
    pub api_key: Option<String>,

    #[arg(long, requires = "password")]
    pub user: Option<String>,

    #[arg(long, requires = "user")]
    pub password: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Submit a run request, optionally waiting for the task to finish.
    SendEvent(SendEventArgs),
    /// Poll an existing task until it reaches a terminal state.
    WaitTask(WaitTaskArgs),
    /// Send `CANCEL` to a task.
    CancelTask(TaskIdArgs),
    /// Send an arbitrary signal to a task.
    SignalTask(SignalTaskArgs),
    /// Print one task's current status.
    ShowTask(TaskIdArgs),
    /// List tasks, optionally filtered by state.
    ShowTasks(ShowTasksArgs),
    /// List event types and whether any worker currently has capacity for them.
    ShowEventTypes,
}

#[derive(Args)]
pub struct SendEventArgs {
    pub event_type: String,

    /// `key=value`, may be repeated.
    #[arg(long = "setting", value_parser = parse_key_value)]
    pub settings: Vec<(String, String)>,

    /// `key=value`, may be repeated.
    #[arg(long = "metric", value_parser = parse_key_value)]
    pub metrics: Vec<(String, String)>,

    #[arg(long)]
    pub condition: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub priority: i64,

    /// Poll until the task reaches a terminal state, then exit with its return code.
    #[arg(long, conflicts_with = "wait_cancel")]
    pub wait: bool,

    /// Like `--wait`, but on a shutdown signal sends CANCEL and exits once it
    /// has been sent this many times.
    #[arg(long, value_name = "N")]
    pub wait_cancel: Option<u32>,
}

#[derive(Args)]
pub struct WaitTaskArgs {
    pub task_id: String,

    #[arg(long, value_name = "N")]
    pub wait_cancel: Option<u32>,
}

#[derive(Args)]
pub struct TaskIdArgs {
    pub task_id: String,
}

#[derive(Args)]
pub struct SignalTaskArgs {
    pub task_id: String,
    pub signal: String,
}

#[derive(Args)]
pub struct ShowTasksArgs {
    #[arg(long)]
    pub state: Option<String>,
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected key=value, got `{input}`")),
    }
}
