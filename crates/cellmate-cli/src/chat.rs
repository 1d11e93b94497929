//! Line-oriented chat loop.

use std::io::Write;

use anyhow::Result;
use cellmate_core::{ChatRole, Conversation, ConversationEvent, SubmitError, Turn, TurnStatus};
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::Session;

const HELP: &str = "Commands: /model NAME, /models, /clear, /quit";

pub async fn run(session: &Session) -> Result<()> {
    if session.registry.current().is_none() {
        session.refresh_models().await;
    }

    let conversation = Conversation::new(session.client.clone(), session.registry.clone());
    let printer = tokio::spawn(print_events(conversation.subscribe()));

    println!("\n{}", "💬 Notebook Assistant".bold().blue());
    println!(
        "Model: {}  {}",
        session.registry.current().unwrap_or_else(|| "<none>".into()).magenta(),
        HELP.dimmed()
    );
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Line::Quit => break,
            Line::Clear => conversation.clear(),
            Line::ListModels => {
                if session.refresh_models().await {
                    let names: Vec<String> =
                        session.registry.available().iter().map(|m| m.name.clone()).collect();
                    println!("{}", names.join(", ").green());
                }
                prompt();
            }
            Line::SelectModel(name) => {
                session.registry.select(name);
                conversation.add_system_note(format!("Model switched to {name}"));
            }
            Line::Help => {
                println!("{}", HELP.dimmed());
                prompt();
            }
            Line::Empty => prompt(),
            Line::Message(text) => match conversation.submit(text).await {
                Ok(_) => {}
                Err(SubmitError::NoModelSelected) => {
                    println!("{}", "No model selected. Use /model NAME or /models.".red());
                    prompt();
                }
                Err(e) => {
                    println!("{}", e.to_string().yellow());
                    prompt();
                }
            },
        }
    }

    drop(conversation);
    let _ = printer.await;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Quit,
    Clear,
    ListModels,
    SelectModel(&'a str),
    Help,
    Empty,
    Message(&'a str),
}

/// Anything starting with `/` is a command and never reaches the model.
fn parse_line(line: &str) -> Line<'_> {
    let line = line.trim();
    if !line.starts_with('/') {
        return if line.is_empty() { Line::Empty } else { Line::Message(line) };
    }
    match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest.trim())) {
        ("/quit", _) | ("/exit", _) => Line::Quit,
        ("/clear", _) => Line::Clear,
        ("/models", _) => Line::ListModels,
        ("/model", name) if !name.is_empty() => Line::SelectModel(name),
        _ => Line::Help,
    }
}

fn prompt() {
    print!("{} ", "you>".bold().cyan());
    let _ = std::io::stdout().flush();
}

async fn print_events(mut events: mpsc::UnboundedReceiver<ConversationEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ConversationEvent::TurnAppended(turn) => match turn.role() {
                ChatRole::Assistant if turn.is_pending() => {
                    println!("{}", "AI: Thinking...".dimmed());
                }
                ChatRole::System => {
                    println!("{}", turn.content().dimmed());
                    prompt();
                }
                _ => {}
            },
            ConversationEvent::TurnUpdated(turn) => {
                print_answer(&turn);
                prompt();
            }
            ConversationEvent::Cleared => {
                println!("{}", "Conversation cleared.".dimmed());
                prompt();
            }
        }
    }
}

fn print_answer(turn: &Turn) {
    match turn.status() {
        TurnStatus::Errored => println!("{} {}\n", "AI:".bold().green(), turn.content().red()),
        _ => println!("{} {}\n", "AI:".bold().green(), turn.content()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_recognized() {
        assert_eq!(parse_line("/quit"), Line::Quit);
        assert_eq!(parse_line("  /exit "), Line::Quit);
        assert_eq!(parse_line("/clear"), Line::Clear);
        assert_eq!(parse_line("/models"), Line::ListModels);
        assert_eq!(parse_line("/model  codellama:7b "), Line::SelectModel("codellama:7b"));
    }

    #[test]
    fn unknown_or_incomplete_commands_show_help() {
        assert_eq!(parse_line("/model"), Line::Help);
        assert_eq!(parse_line("/model   "), Line::Help);
        assert_eq!(parse_line("/help"), Line::Help);
        assert_eq!(parse_line("/clearall now"), Line::Help);
    }

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse_line("  what does df.pivot do? "), Line::Message("what does df.pivot do?"));
        assert_eq!(parse_line("   "), Line::Empty);
    }
}
