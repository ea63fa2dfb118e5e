//! Chat command handler - interactive or one-shot.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use agentforge::agent::{Agent, AgentFactory, AssembledAgent, EchoRuntime};

use super::common::{load_with_tools, print_failures, read_line};
use super::ToolArgs;

const HELP: &str = "Commands: /tools, /clear, /save, /session <name>, /sessions, /quit";

pub(crate) async fn cmd_chat(
    config_path: Option<&Path>,
    message: Option<String>,
    session: Option<String>,
    tools: ToolArgs,
) -> Result<()> {
    let mut config = load_with_tools(config_path, &tools)?;
    if session.is_some() {
        config.session_id = session;
    }
    let initial_message = config.initial_message.clone();

    let mut factory = AgentFactory::new(config);
    factory
        .initialize()
        .await
        .context("Failed to initialize agent factory")?;
    let agent = factory
        .create_agent(Arc::new(EchoRuntime::new()))
        .await
        .context("Failed to create agent")?;

    if !agent.report().failures.is_empty() {
        eprintln!("Some tool providers are unavailable:");
        print_failures(agent.report());
    }

    let outcome = converse(&agent, message, initial_message).await;
    agentforge::log_component!(debug, "chat", "Leaving chat", tools = agent.tools().len());
    let shutdown = agent.shutdown().await;
    outcome?;
    shutdown.context("Teardown failed")?;
    Ok(())
}

async fn converse(agent: &Agent, message: Option<String>, initial: Option<String>) -> Result<()> {
    if let Some(message) = message {
        let reply = agent.run_interaction(&message).await?;
        println!("{}", reply);
        return Ok(());
    }

    if let Some(initial) = initial {
        if agent.sessions().conversation().read().await.is_empty() {
            println!("{}", agent.run_interaction(&initial).await?);
        }
    }

    println!("agentforge chat ({} tools). {}", agent.tools().len(), HELP);
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = read_line()? else {
            break;
        };
        if line.is_empty() {
            continue;
        }
        if let Some(command) = line.strip_prefix('/') {
            if !slash_command(agent, command).await? {
                break;
            }
            continue;
        }
        match agent.run_interaction(&line).await {
            Ok(reply) => println!("{}", reply),
            Err(e) => {
                warn!(error = %e, "Interaction failed");
                eprintln!("Error: {}", e);
            }
        }
    }
    Ok(())
}

/// Handle a `/command`. Returns `false` to leave the chat.
async fn slash_command(agent: &Agent, command: &str) -> Result<bool> {
    let (name, arg) = match command.split_once(' ') {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    let sessions = agent.sessions();
    match name {
        "quit" | "exit" => return Ok(false),
        "tools" => {
            for definition in agent.list_capabilities() {
                println!(
                    "  {:<24} [{}] {}",
                    definition.name, definition.provider_id, definition.description
                );
            }
        }
        "clear" => {
            agent.clear_history().await;
            println!("Conversation cleared (stored session kept).");
        }
        "save" => match sessions.save().await {
            Ok(()) => println!("Saved."),
            Err(e) => {
                warn!(error = %e, "Save failed");
                eprintln!("Error: {}", e);
            }
        },
        "session" if !arg.is_empty() => match sessions.activate(arg).await {
            Ok(()) => println!("Active session: {}", arg),
            Err(e) => {
                warn!(session = %arg, error = %e, "Session switch failed");
                eprintln!("Error: {}", e);
            }
        },
        "sessions" => {
            let current = sessions.current_session_id().await;
            for name in sessions.list_sessions().await? {
                let marker = if current.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!(" {} {}", marker, name);
            }
        }
        _ => println!("{}", HELP),
    }
    Ok(true)
}
