//! tabletalk CLI binary entry point.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use tabletalk::cli::display::{format_error, print_unit};
use tabletalk::cli::{
    parse_repl_line, tool_server_from_command_line, ChatArgs, Cli, Commands, ReplCommand,
    REPL_HELP,
};
use tabletalk::config::ChatConfig;
use tabletalk::mcp::McpRegistrar;
use tabletalk::models::ModelCatalog;
use tabletalk::provider::{ConnectionFactory, OpenRouterFactory};
use tabletalk::session::{ModelSwitcher, Session};
use tabletalk::transcript::Transcript;

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tabletalk=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse_args();

    let result = match cli.command {
        Commands::Chat(chat_args) => handle_chat(chat_args).await,
        Commands::Models => {
            handle_models(&ModelCatalog::default());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}", format_error(&e));
        std::process::exit(1);
    }
}

fn handle_models(catalog: &ModelCatalog) {
    for (i, model) in catalog.models().iter().enumerate() {
        let marker = if i == 0 { " (default)" } else { "" };
        println!("{model}{marker}");
    }
}

async fn handle_chat(args: ChatArgs) -> tabletalk::error::Result<()> {
    let mut config = match &args.config {
        Some(path) => ChatConfig::load_from(path)?,
        None => ChatConfig::load()?,
    };
    if let Some(model) = args.model {
        config.model = model;
    }
    if args.no_plots {
        config.plots_enabled = false;
    }
    if let Some(line) = &args.tool_server {
        config.tool_server = tool_server_from_command_line(line);
    }

    let catalog = ModelCatalog::default();
    let factory = Arc::new(OpenRouterFactory::from_config(&config, catalog.clone()));
    let connection = factory.connect(&config.model)?;

    let transcript = Transcript::new().with_observer(Arc::new(print_unit));
    let mut session = Session::new(connection)
        .with_config(&config)
        .with_transcript(transcript)
        .with_tool_registrar(Arc::new(McpRegistrar::new()));
    session.start_registration();
    let switcher = ModelSwitcher::new(factory);

    if let Some(prompt) = args.prompt {
        let result = session.submit(prompt).await;
        println!();
        return result.map(|_| ());
    }

    eprintln!("tabletalk · {} · /help for commands", session.model_id());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_repl_line(&line) {
            Ok(ReplCommand::Message(text)) => {
                // Failures are already in the transcript.
                let _ = session.submit(text).await;
                println!();
            }
            Ok(ReplCommand::Model(model)) => {
                if switcher.switch(&mut session, &model).is_ok() {
                    eprintln!("switched to {}", session.model_id());
                }
            }
            Ok(ReplCommand::Plots(enabled)) => {
                session.set_plots_enabled(enabled);
                eprintln!("plots {}", if enabled { "on" } else { "off" });
            }
            Ok(ReplCommand::Models) => handle_models(&catalog),
            Ok(ReplCommand::Help) => eprintln!("{REPL_HELP}"),
            Ok(ReplCommand::Quit) => break,
            Ok(ReplCommand::Empty) => {}
            Err(usage) => eprintln!("{usage}"),
        }
    }

    Ok(())
}
