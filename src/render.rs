//! Output rendering for the chat front end.
//!
//! This module provides a renderer trait and a plain-text implementation
//! that draws the controller's view as terminal lines.

use std::io::{self, Stdout, Write};

use crate::thread::ThreadItem;
use crate::types::{ChatSession, MessageRole, SessionId};

/// ANSI escape code for dim text (used for unconfirmed messages).
const ANSI_DIM: &str = "\x1b[2m";

const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the assistant label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used to mark the active session).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Draws controller output.  The REPL only talks to this trait, so a
/// redirected terminal can get an uncolored implementation.
pub trait Renderer: Send {
    /// Print one transcript entry.
    fn print_item(&mut self, item: &ThreadItem);

    /// Print a chunk of assistant text as it streams in.
    fn print_delta(&mut self, text: &str);

    /// Called when a reply is complete.
    ///
    /// Used to ensure proper newlines after streaming.
    fn finish_response(&mut self);

    /// Print the session list, marking the active session.
    fn print_sessions(&mut self, sessions: &[ChatSession], active: Option<SessionId>);

    fn print_error(&mut self, error: &str);

    /// Print a status line such as "Signed out."
    fn print_info(&mut self, info: &str);
}

/// Writes to stdout, with ANSI styling when `use_color` is set.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    in_reply: bool,
}

impl PlainTextRenderer {
    pub fn new() -> Self {
        Self::with_color(true)
    }

    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            in_reply: false,
        }
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn label(&self, role: MessageRole) -> String {
        let label = match role {
            MessageRole::User => "You",
            MessageRole::Assistant => "Advisor",
            MessageRole::System => "System",
        };
        if self.use_color && role == MessageRole::Assistant {
            format!("{ANSI_CYAN}{label}:{ANSI_RESET}")
        } else {
            format!("{label}:")
        }
    }

    /// The text drawn for one transcript entry.
    pub fn format_item(&self, item: &ThreadItem) -> String {
        let body = format!("{} {}", self.label(item.role()), item.content());
        match (item.is_optimistic(), self.use_color) {
            (false, _) => body,
            (true, true) => format!("{ANSI_DIM}{body}{ANSI_RESET}"),
            (true, false) => format!("{body} (sending)"),
        }
    }

    /// The line drawn for one session.
    pub fn format_session(&self, session: &ChatSession, active: bool) -> String {
        let updated = session.updated_at.date();
        let line = format!("{:>6}  {}  ({updated})", session.id, session.title);
        match (active, self.use_color) {
            (false, _) => format!("  {line}"),
            (true, true) => format!("{ANSI_GREEN}* {line}{ANSI_RESET}"),
            (true, false) => format!("* {line}"),
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_item(&mut self, item: &ThreadItem) {
        println!("{}", self.format_item(item));
        self.flush();
    }

    fn print_delta(&mut self, text: &str) {
        if !self.in_reply {
            print!("{} ", self.label(MessageRole::Assistant));
            self.in_reply = true;
        }
        print!("{text}");
        self.flush();
    }

    fn finish_response(&mut self) {
        if self.in_reply {
            println!();
            self.in_reply = false;
        }
        self.flush();
    }

    fn print_sessions(&mut self, sessions: &[ChatSession], active: Option<SessionId>) {
        if sessions.is_empty() {
            self.print_info("No chats yet.");
            return;
        }
        for session in sessions {
            println!("{}", self.format_session(session, Some(session.id) == active));
        }
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.finish_response();
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        self.finish_response();
        println!("{info}");
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use crate::thread::{ThreadEvent, ThreadState, Transition};

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn formats_confirmed_and_pending_items() {
        let renderer = PlainTextRenderer::with_color(false);
        let confirmed = ThreadItem::Confirmed(fixtures::message(
            2,
            7,
            MessageRole::Assistant,
            "Start with an emergency fund.",
        ));
        assert_eq!(
            renderer.format_item(&confirmed),
            "Advisor: Start with an emergency fund."
        );

        let mut state = ThreadState::new();
        let transition = state.apply(ThreadEvent::SendStarted {
            content: "Should I pay off debt first?".to_string(),
            created_at: fixtures::CREATED_AT,
        });
        assert!(matches!(transition, Transition::Started(_)));
        assert_eq!(
            renderer.format_item(&state.items()[0]),
            "You: Should I pay off debt first? (sending)"
        );
    }

    #[test]
    fn marks_active_session() {
        let renderer = PlainTextRenderer::with_color(false);
        let session = fixtures::session(7, "RRSP vs TFSA");
        assert_eq!(
            renderer.format_session(&session, true),
            "*      7  RRSP vs TFSA  (2024-05-02)"
        );
        assert!(renderer.format_session(&session, false).starts_with("  "));
    }
}
