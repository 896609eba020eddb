//! Interactive terminal client for SmartAsset.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a local development server
//! smartasset-chat
//!
//! # Point at another server and stream replies
//! smartasset-chat --api-url https://advice.example.ca/api/v1/ --stream
//!
//! # Read settings from a file
//! smartasset-chat --config smartasset.yaml
//! ```
//!
//! Set `SMARTASSET_LOG=debug` to see state transitions on stderr.

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use smartasset::chat::{
    ChatArgs, ChatCommand, ChatConfig, PlainTextRenderer, Renderer, help_text, parse_command,
};
use smartasset::{
    AppError, ChatController, Identity, MessageRole, RegisterForm, SendOutcome, SmartAsset,
};

type Controller = ChatController<SmartAsset>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_env("SMARTASSET_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("smartasset-chat [OPTIONS]");
    let config = ChatConfig::from_args(args)?;
    let mut streaming = config.client.streaming;

    let credentials = config.client.credential_store()?;
    let client = Arc::new(config.client.client(Arc::clone(&credentials))?);
    let controller = ChatController::new(client, credentials);
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut rl = DefaultEditor::new()?;

    println!("SmartAsset chat ({})", config.client.resolved_base_url());
    controller.initialize().await;
    match controller.view().identity {
        Some(identity) => {
            renderer.print_info(&format!("Signed in as {}", identity.display_name()));
            let view = controller.view();
            renderer.print_sessions(&view.sessions, view.active_session_id);
        }
        None => renderer.print_info("Not signed in. Use /login <email> or /register <email>."),
    }
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                let Some(cmd) = parse_command(line) else {
                    send(&controller, &mut renderer, line, streaming).await;
                    continue;
                };
                match cmd {
                    ChatCommand::Quit => {
                        println!("Goodbye!");
                        break;
                    }
                    ChatCommand::Help => {
                        for line in help_text().lines() {
                            println!("    {}", line);
                        }
                    }
                    ChatCommand::Login(email) => {
                        let Some(password) = prompt_secret(&mut rl, "Password: ") else {
                            continue;
                        };
                        let result = controller.login(&email, &password).await;
                        signed_in(&controller, &mut renderer, result);
                    }
                    ChatCommand::Register { email, full_name } => {
                        let Some(password) = prompt_secret(&mut rl, "Password: ") else {
                            continue;
                        };
                        let Some(confirm) = prompt_secret(&mut rl, "Confirm password: ") else {
                            continue;
                        };
                        let form = RegisterForm::new(email, password, confirm, full_name);
                        let result = controller.register(&form).await;
                        signed_in(&controller, &mut renderer, result);
                    }
                    ChatCommand::Logout => {
                        controller.logout();
                        renderer.print_info("Signed out.");
                    }
                    ChatCommand::WhoAmI => match controller.view().identity {
                        Some(identity) => renderer.print_info(&format!(
                            "{} <{}>{}",
                            identity.display_name(),
                            identity.email,
                            if identity.is_verified {
                                ""
                            } else {
                                " (unverified)"
                            }
                        )),
                        None => renderer.print_info("Not signed in."),
                    },
                    ChatCommand::Sessions => {
                        let view = controller.view();
                        renderer.print_sessions(&view.sessions, view.active_session_id);
                    }
                    ChatCommand::Select(id) => match controller.select_session(id).await {
                        Ok(()) => print_transcript(&controller, &mut renderer),
                        Err(err) => report(&controller, &mut renderer, &err),
                    },
                    ChatCommand::New => {
                        controller.new_chat();
                        renderer.print_info("Started a new chat.");
                    }
                    ChatCommand::Delete(id) => match controller.delete_session(id).await {
                        Ok(()) => renderer.print_info(&format!("Deleted chat {id}.")),
                        Err(err) => report(&controller, &mut renderer, &err),
                    },
                    ChatCommand::Rename { id, title } => {
                        match controller.rename_session(id, &title).await {
                            Ok(()) => renderer.print_info(&format!("Renamed chat {id}.")),
                            Err(err) => report(&controller, &mut renderer, &err),
                        }
                    }
                    ChatCommand::Reload => match controller.reload_sessions().await {
                        Ok(()) => {
                            let view = controller.view();
                            renderer.print_sessions(&view.sessions, view.active_session_id);
                        }
                        Err(err) => report(&controller, &mut renderer, &err),
                    },
                    ChatCommand::Stream(on) => {
                        streaming = on;
                        if on {
                            renderer.print_info("Replies will stream.");
                        } else {
                            renderer.print_info("Replies will arrive whole.");
                        }
                    }
                    ChatCommand::Invalid(message) => {
                        renderer.print_error(&message);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn prompt_secret(rl: &mut DefaultEditor, prompt: &str) -> Option<String> {
    match rl.readline(prompt) {
        Ok(line) => Some(line),
        Err(_) => None,
    }
}

fn report(controller: &Controller, renderer: &mut dyn Renderer, err: &AppError) {
    renderer.print_error(&err.to_string());
    controller.dismiss_error();
}

fn signed_in(
    controller: &Controller,
    renderer: &mut dyn Renderer,
    result: Result<Identity, AppError>,
) {
    match result {
        Ok(identity) => {
            renderer.print_info(&format!("Signed in as {}", identity.display_name()));
            let view = controller.view();
            renderer.print_sessions(&view.sessions, view.active_session_id);
        }
        Err(err) => report(controller, renderer, &err),
    }
}

fn print_transcript(controller: &Controller, renderer: &mut dyn Renderer) {
    let view = controller.view();
    if view.items.is_empty() {
        renderer.print_info("(no messages)");
    }
    for item in &view.items {
        renderer.print_item(item);
    }
}

async fn send(
    controller: &Controller,
    renderer: &mut dyn Renderer,
    content: &str,
    streaming: bool,
) {
    let new_chat = controller.view().active_session_id.is_none();
    let (result, streamed) = if streaming {
        send_streaming(controller, renderer, content).await
    } else {
        (controller.send(content).await, false)
    };
    renderer.finish_response();
    match result {
        Ok(SendOutcome::Settled { session_id }) => {
            if !streamed {
                let view = controller.view();
                let reply = view
                    .items
                    .last()
                    .filter(|item| item.role() == MessageRole::Assistant);
                if let Some(item) = reply {
                    renderer.print_item(item);
                }
            }
            if new_chat {
                renderer.print_info(&format!("(saved as chat {session_id})"));
            }
        }
        Ok(SendOutcome::Discarded) => {}
        Err(err) => report(controller, renderer, &err),
    }
}

/// Send while echoing the reply as it streams in.  Also reports whether any
/// reply text was shown.
async fn send_streaming(
    controller: &Controller,
    renderer: &mut dyn Renderer,
    content: &str,
) -> (Result<SendOutcome, AppError>, bool) {
    let mut revisions = controller.subscribe();
    let mut shown = 0;
    let send = controller.send_streaming(content);
    tokio::pin!(send);
    loop {
        tokio::select! {
            result = &mut send => return (result, shown > 0),
            changed = revisions.changed() => {
                if changed.is_err() {
                    return ((&mut send).await, shown > 0);
                }
                let text = controller.view().streaming.unwrap_or_default();
                if text.len() > shown {
                    renderer.print_delta(&text[shown..]);
                    shown = text.len();
                }
            }
        }
    }
}
