//! Interactive shell over the configured tool providers.
//!
//! `agent-relay repl` connects every configured provider, then reads slash
//! commands (`/tools`, `/call alpha echo {"text":"hi"}`, ...) until `/exit`
//! or end of input.

use std::path::PathBuf;

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Config, Context, Editor, Helper};
use serde_json::Value;
use tokio::runtime::Handle;

use agent_relay::client::{ClientOptions, ToolRegistry};
use agent_relay::config::{load_providers, ProvidersConfig};

const PROMPT: &str = " \x1b[36mrelay>\x1b[0m ";
const HISTORY_FILE: &str = ".agent_relay_history";

/// Name, argument synopsis, summary.
const HELP: &[(&str, &str, &str)] = &[
    ("providers", "", "List providers and their status"),
    ("tools", "[provider]", "List tools of one or all providers"),
    ("call", "<provider> <tool> [json]", "Call a tool"),
    ("refresh", "<provider>", "Re-read a provider's tool catalog"),
    ("connect", "<provider>", "Connect a configured provider"),
    ("disconnect", "<provider>", "Disconnect a provider"),
    ("clear", "", "Clear the screen"),
    ("help", "", "Show this list"),
    ("exit", "", "Leave the shell"),
];

/// One parsed input line.
#[derive(Debug, PartialEq)]
enum Command {
    Providers,
    Tools(Option<String>),
    Call {
        provider: String,
        tool: String,
        arguments: Option<Value>,
    },
    Refresh(String),
    Connect(String),
    Disconnect(String),
    Clear,
    Help,
    Exit,
}

impl Command {
    /// `Ok(None)` for a blank line. The leading slash is optional.
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let line = line.strip_prefix('/').unwrap_or(line);
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let first = || rest.split_whitespace().next().map(str::to_string);
        let provider = |usage: &str| first().ok_or_else(|| format!("usage: /{usage} <provider>"));

        let command = match verb {
            "" | "help" | "h" | "?" => Self::Help,
            "exit" | "quit" | "q" => Self::Exit,
            "clear" | "cls" => Self::Clear,
            "providers" | "ls" => Self::Providers,
            "tools" => Self::Tools(first()),
            "refresh" => Self::Refresh(provider("refresh")?),
            "connect" => Self::Connect(provider("connect")?),
            "disconnect" => Self::Disconnect(provider("disconnect")?),
            "call" => {
                let mut words = rest.splitn(3, char::is_whitespace);
                let (Some(provider), Some(tool)) = (
                    words.next().filter(|w| !w.is_empty()),
                    words.next().filter(|w| !w.is_empty()),
                ) else {
                    return Err("usage: /call <provider> <tool> [json]".into());
                };
                let arguments = match words.next().map(str::trim).filter(|raw| !raw.is_empty()) {
                    Some(raw) => Some(
                        serde_json::from_str(raw).map_err(|e| format!("arguments are not JSON: {e}"))?,
                    ),
                    None => None,
                };
                Self::Call {
                    provider: provider.to_string(),
                    tool: tool.to_string(),
                    arguments,
                }
            }
            other => return Err(format!("unknown command '/{other}', try /help")),
        };
        Ok(Some(command))
    }
}

/// Tab completion for command names and, after a command, provider names.
struct Completion {
    providers: Vec<String>,
}

impl Completion {
    /// Start offset of the word being completed, and what can replace it.
    fn candidates(&self, input: &str) -> (usize, Vec<Pair>) {
        match input.rsplit_once(' ') {
            None => {
                let typed = input.strip_prefix('/').unwrap_or(input);
                let pairs = HELP
                    .iter()
                    .filter(|(name, ..)| name.starts_with(typed))
                    .map(|(name, synopsis, _)| Pair {
                        display: format!("/{name} {synopsis}"),
                        replacement: format!("/{name} "),
                    })
                    .collect();
                (0, pairs)
            }
            // Only the word right after the command names a provider.
            Some((head, word)) if !head.trim_start().contains(' ') => {
                let start = head.len() + 1;
                let pairs = self
                    .providers
                    .iter()
                    .filter(|name| name.starts_with(word))
                    .map(|name| Pair {
                        display: name.clone(),
                        replacement: format!("{name} "),
                    })
                    .collect();
                (start, pairs)
            }
            Some(_) => (input.len(), Vec::new()),
        }
    }
}

impl Completer for Completion {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
        Ok(self.candidates(&line[..pos]))
    }
}

impl Hinter for Completion {
    type Hint = String;

    /// Greys in the rest of a command name once only one can match.
    fn hint(&self, line: &str, pos: usize, _: &Context<'_>) -> Option<String> {
        if pos != line.len() || !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        let (_, pairs) = self.candidates(line);
        match pairs.as_slice() {
            [only] => only
                .replacement
                .trim_end()
                .strip_prefix(line)
                .filter(|rest| !rest.is_empty())
                .map(str::to_string),
            _ => None,
        }
    }
}

impl Highlighter for Completion {}
impl Validator for Completion {}
impl Helper for Completion {}

struct Shell {
    runtime: Handle,
    registry: ToolRegistry,
    config: ProvidersConfig,
}

/// Blocks the calling thread; run it from `spawn_blocking` inside a runtime.
pub fn run(config_path: Option<&str>, options: ClientOptions) -> anyhow::Result<()> {
    let shell = Shell {
        runtime: Handle::current(),
        registry: ToolRegistry::new(options),
        config: load_providers(config_path)?,
    };

    eprintln!();
    eprintln!("  \x1b[1magent-relay {}\x1b[0m interactive shell", env!("CARGO_PKG_VERSION"));
    for (name, e) in shell.runtime.block_on(shell.registry.connect_all(&shell.config)) {
        eprintln!("  \x1b[31mx\x1b[0m {name}: {e}");
    }
    eprintln!(
        "  {}/{} providers up. /help lists commands, Tab completes.",
        shell.registry.len(),
        shell.config.providers.len()
    );
    eprintln!();

    let mut editor: Editor<Completion, DefaultHistory> = Editor::with_config(
        Config::builder()
            .auto_add_history(true)
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .build(),
    )?;
    editor.set_helper(Some(Completion {
        providers: shell.config.providers.keys().cloned().collect(),
    }));
    let history = history_path();
    if let Some(path) = &history {
        let _ = editor.load_history(path);
    }

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                eprintln!("  (interrupted, /exit to leave)");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                tracing::warn!("readline failed: {e}");
                break;
            }
        };
        match Command::parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Exit)) => break,
            Ok(Some(command)) => shell.execute(command),
            Err(message) => eprintln!("  {message}"),
        }
    }

    if let Some(path) = &history {
        if let Err(e) = editor.save_history(path) {
            tracing::debug!("history not saved: {e}");
        }
    }
    shell.runtime.block_on(shell.registry.shutdown());
    Ok(())
}

fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(HISTORY_FILE))
}

impl Shell {
    fn execute(&self, command: Command) {
        let registry = &self.registry;
        match command {
            Command::Help => print_help(),
            Command::Clear => eprint!("\x1b[2J\x1b[H"),
            Command::Providers => self.print_providers(),
            Command::Tools(provider) => self.print_tools(provider.as_deref()),
            Command::Call {
                provider,
                tool,
                arguments,
            } => match self.runtime.block_on(registry.call_tool(&provider, &tool, arguments)) {
                Ok(outcome) if outcome.success => {
                    let body = outcome.result.unwrap_or(Value::Null);
                    let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
                    eprintln!("{text}");
                }
                Ok(outcome) => eprintln!(
                    "  \x1b[31mtool failed:\x1b[0m {}",
                    outcome.error.as_deref().unwrap_or("no message")
                ),
                Err(e) => eprintln!("  {e}"),
            },
            Command::Refresh(name) => match self.runtime.block_on(registry.refresh_tools(&name)) {
                Ok(count) => eprintln!("  {name}: {count} tools"),
                Err(e) => eprintln!("  {e}"),
            },
            Command::Connect(name) => {
                let Some(config) = self.config.providers.get(&name) else {
                    eprintln!("  '{name}' is not in the config file");
                    return;
                };
                match self.runtime.block_on(registry.connect(&name, config)) {
                    Ok(conn) => eprintln!("  {name}: connected, {} tools", conn.tools().len()),
                    Err(e) => eprintln!("  {e}"),
                }
            }
            Command::Disconnect(name) => {
                if self.runtime.block_on(registry.disconnect(&name)) {
                    eprintln!("  {name}: disconnected");
                } else {
                    eprintln!("  {name}: not connected");
                }
            }
            Command::Exit => {}
        }
    }

    fn print_providers(&self) {
        let summaries = self.registry.summaries();
        if summaries.is_empty() {
            eprintln!("  no providers connected");
        }
        for summary in &summaries {
            eprintln!(
                "  {:<24} {:<12} {} tools",
                summary.name,
                summary.status.to_string(),
                summary.tool_count
            );
        }
        for name in self.config.providers.keys() {
            if self.registry.get(name).is_none() {
                eprintln!("  {name:<24} \x1b[90mnot connected\x1b[0m");
            }
        }
    }

    fn print_tools(&self, provider: Option<&str>) {
        let catalogs = match provider {
            None => self.registry.all_tools(),
            Some(name) => match self.registry.list_tools(name) {
                Ok(tools) => [(name.to_string(), tools)].into_iter().collect(),
                Err(e) => {
                    eprintln!("  {e}");
                    return;
                }
            },
        };
        for (name, tools) in catalogs {
            eprintln!("  \x1b[1m{name}\x1b[0m");
            for tool in tools {
                eprintln!("    {:<28} {}", tool.name, tool.description);
            }
        }
    }
}

fn print_help() {
    for (name, synopsis, summary) in HELP {
        let usage = format!("/{name} {synopsis}");
        eprintln!("  {usage:<36} {summary}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completion() -> Completion {
        Completion {
            providers: vec!["alpha".into(), "beta".into(), "alpine".into()],
        }
    }

    fn replacements(pairs: &[Pair]) -> Vec<&str> {
        pairs.iter().map(|p| p.replacement.as_str()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   ").unwrap(), None);
        assert_eq!(Command::parse("/").unwrap(), Some(Command::Help));
        assert_eq!(Command::parse("exit").unwrap(), Some(Command::Exit));
        assert_eq!(Command::parse("/tools").unwrap(), Some(Command::Tools(None)));
        assert_eq!(
            Command::parse("/tools beta").unwrap(),
            Some(Command::Tools(Some("beta".into())))
        );
        assert_eq!(
            Command::parse("/call alpha echo {\"text\": \"a b\"}").unwrap(),
            Some(Command::Call {
                provider: "alpha".into(),
                tool: "echo".into(),
                arguments: Some(json!({"text": "a b"})),
            })
        );
        assert_eq!(
            Command::parse("/call alpha echo").unwrap(),
            Some(Command::Call {
                provider: "alpha".into(),
                tool: "echo".into(),
                arguments: None,
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("/call alpha").unwrap_err().starts_with("usage"));
        assert!(Command::parse("/call alpha echo {oops").unwrap_err().contains("JSON"));
        assert!(Command::parse("/refresh").unwrap_err().contains("/refresh"));
        assert!(Command::parse("/launch").unwrap_err().contains("/launch"));
    }

    #[test]
    fn test_command_and_provider_completion() {
        let c = completion();

        let (start, pairs) = c.candidates("/di");
        assert_eq!(start, 0);
        assert_eq!(replacements(&pairs), ["/disconnect "]);

        let (start, pairs) = c.candidates("/tools al");
        assert_eq!(start, 7);
        assert_eq!(replacements(&pairs), ["alpha ", "alpine "]);

        // Past the provider there is nothing to offer.
        let (_, pairs) = c.candidates("/call alpha ec");
        assert!(pairs.is_empty());
    }
}
