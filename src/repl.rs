// Line-oriented front end. Reads intents from stdin and prints store events.
use std::str::FromStr;
use std::sync::Arc;

use strum::IntoEnumIterator;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::app::App;
use crate::session::{Message, Model, Role};
use crate::store::{NoticeLevel, StoreEvent};

const HELP: &str = "\
Commands:
  /new <system prompt>   start a session with the selected model
  /template <name>       start a session from a prompt template
  /templates             list prompt templates
  /sessions              list sessions
  /switch <n>            make session n current
  /refresh               reload the current session from the backend
  /attach <path>         upload a PDF, TXT or DOCX to the current session
  /detach                forget the current session's document
  /model <gemini|groq>   model for new sessions
  /models                list models offered by the backend
  /validate <prompt>     ask the backend to check a system prompt
  /help                  this text
  /quit                  exit
Anything else is sent as a message.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    New(String),
    Template(String),
    Templates,
    Sessions,
    Switch(usize),
    Refresh,
    Attach(String),
    Detach,
    Model(Model),
    Models,
    Validate(String),
    Help,
    Quit,
    Send(String),
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Command::Send(line.to_string()));
        }
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };
        let cmd = match name {
            "/new" => Command::New(arg.to_string()),
            "/template" => Command::Template(arg.to_string()),
            "/templates" => Command::Templates,
            "/sessions" => Command::Sessions,
            "/switch" => match arg.parse::<usize>() {
                Ok(n) if n > 0 => Command::Switch(n),
                _ => Command::Invalid("usage: /switch <n>".to_string()),
            },
            "/refresh" => Command::Refresh,
            "/attach" if !arg.is_empty() => Command::Attach(arg.to_string()),
            "/attach" => Command::Invalid("usage: /attach <path>".to_string()),
            "/detach" => Command::Detach,
            "/model" => match Model::from_str(arg) {
                Ok(model) => Command::Model(model),
                Err(_) => {
                    let known: Vec<String> = Model::iter().map(|m| m.to_string()).collect();
                    Command::Invalid(format!("unknown model '{}' (expected {})", arg, known.join(" or ")))
                }
            },
            "/models" => Command::Models,
            "/validate" => Command::Validate(arg.to_string()),
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            other => Command::Invalid(format!("unknown command {}", other)),
        };
        Some(cmd)
    }
}

fn format_message(message: &Message) -> String {
    let who = match message.role {
        Role::User => "you".to_string(),
        Role::Bot => match &message.model {
            Some(model) => format!("bot ({})", model),
            None => "bot".to_string(),
        },
    };
    format!("[{}] {}: {}", message.timestamp.format("%H:%M"), who, message.content)
}

/// Prints store events for the current session until the store goes away.
fn spawn_renderer(app: Arc<App>) -> JoinHandle<()> {
    let mut events = app.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::MessageAppended { session_id, message_id }) => {
                    if app.store().current_id().as_deref() != Some(session_id.as_str()) {
                        continue;
                    }
                    let found = app
                        .store()
                        .session(&session_id)
                        .and_then(|s| s.messages.into_iter().find(|m| m.id == message_id));
                    if let Some(message) = found {
                        if message.is_bot() {
                            println!("{}", format_message(&message));
                        }
                    }
                }
                Ok(StoreEvent::LoadingChanged(true)) => println!("..."),
                Ok(StoreEvent::CurrentChanged(Some(id))) => {
                    if let Some(session) = app.store().session(&id) {
                        println!("== {} ({}) ==", session.title, session.model);
                        for message in &session.messages {
                            println!("{}", format_message(message));
                        }
                    }
                }
                Ok(StoreEvent::Notice(notice)) => match notice.level {
                    NoticeLevel::Info => println!("* {}: {}", notice.title, notice.description),
                    NoticeLevel::Error => eprintln!("! {}: {}", notice.title, notice.description),
                },
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => log::warn!("Renderer skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn run_command(app: &App, command: Command) -> bool {
    match command {
        Command::Quit => return false,
        Command::Help => println!("{}", HELP),
        Command::Invalid(reason) => eprintln!("{}", reason),
        Command::Send(text) => {
            app.set_input(text);
            if let Err(e) = app.submit_input().await {
                if e.is_validation() {
                    eprintln!("{}", e);
                }
            }
        }
        Command::New(prompt) => {
            if let Err(e) = app.create_session(&prompt).await {
                if e.is_validation() {
                    eprintln!("{} (usage: /new <system prompt>)", e);
                }
            }
        }
        Command::Template(name) => match app.prompt_templates().await {
            Ok(templates) => match templates.get(&name) {
                Some(prompt) => {
                    let _ = app.create_session(prompt).await;
                }
                None => eprintln!("no template named '{}'", name),
            },
            Err(e) => eprintln!("could not fetch templates: {}", e),
        },
        Command::Templates => match app.prompt_templates().await {
            Ok(templates) => {
                for (name, text) in templates {
                    println!("{:<12} {}", name, text);
                }
            }
            Err(e) => eprintln!("could not fetch templates: {}", e),
        },
        Command::Sessions => {
            let current = app.store().current_id();
            for (i, session) in app.sessions().iter().enumerate() {
                let marker = if current.as_deref() == Some(session.id.as_str()) { "*" } else { " " };
                let doc = session.document.as_ref().map(|d| format!(" [{}]", d.name)).unwrap_or_default();
                println!(
                    "{} {:>2}. {} ({}, {} messages, {}){}",
                    marker,
                    i + 1,
                    session.title,
                    session.model,
                    session.messages.len(),
                    session.created_at.format("%b %d"),
                    doc
                );
            }
        }
        Command::Switch(n) => match app.sessions().get(n - 1) {
            Some(session) => {
                app.switch_session(&session.id);
            }
            None => eprintln!("no session {}", n),
        },
        Command::Refresh => match app.refresh_current().await {
            Ok(session) => println!("refreshed {} ({} messages)", session.title, session.messages.len()),
            Err(e) => eprintln!("refresh failed: {}", e),
        },
        Command::Attach(path) => {
            let _ = app.attach_path(&path).await;
        }
        Command::Detach => match app.detach() {
            Some(doc) => println!("detached {}", doc.name),
            None => println!("no document attached"),
        },
        Command::Model(model) => {
            app.select_model(model);
            println!("new sessions will use {}", model);
        }
        Command::Models => match app.models().await {
            Ok(models) => {
                for model in models {
                    println!("{:<8} {} - {}", model.id, model.name, model.description);
                }
            }
            Err(e) => eprintln!("could not fetch models: {}", e),
        },
        Command::Validate(prompt) => match app.validate_prompt(&prompt).await {
            Ok(result) => println!("{}: {}", if result.valid { "valid" } else { "invalid" }, result.message),
            Err(e) => eprintln!("validation failed: {}", e),
        },
    }
    true
}

pub async fn run(app: Arc<App>) -> std::io::Result<()> {
    let renderer = spawn_renderer(app.clone());
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        if !run_command(&app, command).await {
            break;
        }
    }

    renderer.abort();
    log::info!("REPL finished.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_send() {
        assert_eq!(Command::parse("  hello there "), Some(Command::Send("hello there".to_string())));
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            Command::parse("/new You are concise."),
            Some(Command::New("You are concise.".to_string()))
        );
        assert_eq!(Command::parse("/switch 2"), Some(Command::Switch(2)));
        assert_eq!(Command::parse("/model groq"), Some(Command::Model(Model::Groq)));
        assert_eq!(Command::parse("/attach notes.pdf"), Some(Command::Attach("notes.pdf".to_string())));
        assert_eq!(Command::parse("/quit"), Some(Command::Quit));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(Command::parse("/switch 0"), Some(Command::Invalid(_))));
        assert!(matches!(Command::parse("/model gpt"), Some(Command::Invalid(_))));
        assert!(matches!(Command::parse("/attach"), Some(Command::Invalid(_))));
        assert!(matches!(Command::parse("/bogus"), Some(Command::Invalid(_))));
    }
}
