//! Free-text directive classification for the strategy layer.
//!
//! This is a thin, replaceable adapter in front of the engine's typed
//! contract: it maps loosely-phrased operator input ("spawn a claude
//! agent", "broadcast: run the tests") onto [`Directive`] values, and
//! nothing downstream depends on its fuzziness. Anything it cannot
//! classify is rejected back to the operator rather than guessed at.

use std::str::FromStr;

use regex::Regex;

use crate::engine::AgentKind;

/// Default line count for output polls without an explicit count.
const DEFAULT_OUTPUT_LINES: usize = 50;

/// A typed operation for the engine, classified from free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Launch a new agent of the given kind.
    Spawn(AgentKind),
    /// Deliver a command line to one agent.
    Send { target: String, command: String },
    /// Deliver a command line to every agent.
    Broadcast(String),
    /// Poll an agent's buffered output.
    Output { target: String, max_lines: usize },
    /// Terminate one agent.
    Kill(String),
    /// Terminate every agent.
    KillAll,
    /// Show the agent roster.
    Roster,
    /// Export the session snapshot.
    Export,
    /// Leave the session.
    Quit,
}

/// Compiled keyword matcher. Construct once, classify many times.
pub struct DirectiveParser {
    spawn_re: Regex,
    send_re: Regex,
    at_re: Regex,
    broadcast_re: Regex,
    output_re: Regex,
    kill_re: Regex,
}

impl DirectiveParser {
    pub fn new() -> Self {
        // The patterns are anchored and the alternatives ordered from most
        // to least specific, so "kill all" never parses as Kill("all").
        Self {
            spawn_re: Regex::new(r"(?i)^(?:spawn|launch|start)\b.*?\b(claude|gemini)\b").unwrap(),
            send_re: Regex::new(r"(?i)^send\s+(\S+)\s+(.+)$").unwrap(),
            at_re: Regex::new(r"^@(\S+)\s+(.+)$").unwrap(),
            broadcast_re: Regex::new(r"(?i)^(?:broadcast|all)\s*:?\s+(.+)$").unwrap(),
            output_re: Regex::new(r"(?i)^(?:output|show)\s+(\S+)(?:\s+(\d+))?\s*$").unwrap(),
            kill_re: Regex::new(r"(?i)^(?:kill|stop)\s+(\S+)\s*$").unwrap(),
        }
    }

    /// Classify one line of operator input. `None` means unrecognized --
    /// the caller decides how to surface that.
    pub fn classify(&self, input: &str) -> Option<Directive> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        match input.to_ascii_lowercase().as_str() {
            "roster" | "list" | "status" | "agents" => return Some(Directive::Roster),
            "export" => return Some(Directive::Export),
            "quit" | "exit" => return Some(Directive::Quit),
            "kill all" | "stop all" | "killall" => return Some(Directive::KillAll),
            _ => {}
        }

        if let Some(caps) = self.spawn_re.captures(input) {
            // The kind word matched the pattern, so FromStr cannot fail.
            let kind = AgentKind::from_str(&caps[1]).ok()?;
            return Some(Directive::Spawn(kind));
        }

        if let Some(caps) = self.output_re.captures(input) {
            let max_lines = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(DEFAULT_OUTPUT_LINES);
            return Some(Directive::Output {
                target: caps[1].to_string(),
                max_lines,
            });
        }

        if let Some(caps) = self.kill_re.captures(input) {
            return Some(Directive::Kill(caps[1].to_string()));
        }

        if let Some(caps) = self.broadcast_re.captures(input) {
            return Some(Directive::Broadcast(caps[1].trim().to_string()));
        }

        if let Some(caps) = self.send_re.captures(input).or_else(|| self.at_re.captures(input)) {
            return Some(Directive::Send {
                target: caps[1].to_string(),
                command: caps[2].trim().to_string(),
            });
        }

        None
    }
}

impl Default for DirectiveParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(input: &str) -> Option<Directive> {
        DirectiveParser::new().classify(input)
    }

    #[test]
    fn spawn_variants() {
        assert_eq!(classify("spawn claude"), Some(Directive::Spawn(AgentKind::Claude)));
        assert_eq!(
            classify("launch a gemini agent"),
            Some(Directive::Spawn(AgentKind::Gemini))
        );
        assert_eq!(classify("Start Claude"), Some(Directive::Spawn(AgentKind::Claude)));
    }

    #[test]
    fn broadcast_variants() {
        assert_eq!(
            classify("broadcast: run the tests"),
            Some(Directive::Broadcast("run the tests".to_string()))
        );
        assert_eq!(
            classify("all: git status"),
            Some(Directive::Broadcast("git status".to_string()))
        );
    }

    #[test]
    fn targeted_send() {
        assert_eq!(
            classify("send abc123 explain this error"),
            Some(Directive::Send {
                target: "abc123".to_string(),
                command: "explain this error".to_string(),
            })
        );
        assert_eq!(
            classify("@abc123 hello there"),
            Some(Directive::Send {
                target: "abc123".to_string(),
                command: "hello there".to_string(),
            })
        );
    }

    #[test]
    fn kill_one_vs_kill_all() {
        assert_eq!(classify("kill all"), Some(Directive::KillAll));
        assert_eq!(classify("kill abc123"), Some(Directive::Kill("abc123".to_string())));
        assert_eq!(classify("stop all"), Some(Directive::KillAll));
    }

    #[test]
    fn output_with_and_without_count() {
        assert_eq!(
            classify("output abc123 20"),
            Some(Directive::Output {
                target: "abc123".to_string(),
                max_lines: 20,
            })
        );
        assert_eq!(
            classify("show abc123"),
            Some(Directive::Output {
                target: "abc123".to_string(),
                max_lines: DEFAULT_OUTPUT_LINES,
            })
        );
    }

    #[test]
    fn simple_keywords() {
        assert_eq!(classify("roster"), Some(Directive::Roster));
        assert_eq!(classify("status"), Some(Directive::Roster));
        assert_eq!(classify("export"), Some(Directive::Export));
        assert_eq!(classify("quit"), Some(Directive::Quit));
    }

    #[test]
    fn unrecognized_input_is_none() {
        assert_eq!(classify(""), None);
        assert_eq!(classify("   "), None);
        assert_eq!(classify("make me a sandwich"), None);
        assert_eq!(classify("spawn chatgpt"), None);
    }
}
