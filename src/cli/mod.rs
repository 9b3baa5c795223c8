//! Terminal front end for tabletalk.

pub mod display;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::parse_flag;
use crate::tools::ToolServerSpec;

/// Tools the bundled sales server is expected to offer.
pub const DEFAULT_TOOL_NAMES: &[&str] = &["get_sales_data", "get_current_date"];
pub const DEFAULT_TOOL_NAMESPACE: &str = "sales_mcp";

/// tabletalk CLI
#[derive(Parser, Debug)]
#[command(name = "tabletalk", version, about = "Chat with hosted models about your sales data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a chat (one-shot when a prompt is given, interactive otherwise)
    Chat(ChatArgs),
    /// List the models available for switching
    Models,
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Model to start with (format: vendor/model, e.g. openai/gpt-4o)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Config file (defaults to ~/.tabletalk/config.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Do not render charts for tool data
    #[arg(long)]
    pub no_plots: bool,

    /// Tool server command line, e.g. "python3 -u mcp_sales_server.py"
    #[arg(long)]
    pub tool_server: Option<String>,

    /// User prompt (positional)
    pub prompt: Option<String>,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Build a tool server spec for the bundled sales tools from a command line.
pub fn tool_server_from_command_line(line: &str) -> Option<ToolServerSpec> {
    let mut parts = line.split_whitespace().map(str::to_string);
    let command = parts.next()?;
    Some(ToolServerSpec {
        command,
        args: parts.collect(),
        namespace: DEFAULT_TOOL_NAMESPACE.to_string(),
        include_tools: DEFAULT_TOOL_NAMES.iter().map(|s| s.to_string()).collect(),
    })
}

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Message(String),
    Model(String),
    Plots(bool),
    Models,
    Help,
    Quit,
    Empty,
}

pub const REPL_HELP: &str = "/model <vendor/model>  switch model\n\
/models                list models\n\
/plots on|off          toggle charts\n\
/help                  show this help\n\
/quit                  exit";

/// Parse a REPL line. Lines not starting with `/` are messages.
pub fn parse_repl_line(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(ReplCommand::Message(line.to_string()));
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((command, ""));
    match name {
        "model" if !rest.is_empty() => Ok(ReplCommand::Model(rest.to_string())),
        "model" => Err("usage: /model <vendor/model>".into()),
        "models" => Ok(ReplCommand::Models),
        "plots" => parse_flag(rest)
            .map(ReplCommand::Plots)
            .ok_or_else(|| "usage: /plots on|off".to_string()),
        "help" => Ok(ReplCommand::Help),
        "quit" | "exit" => Ok(ReplCommand::Quit),
        other => Err(format!("unknown command '/{other}' (try /help)")),
    }
}
