//! Command sanitizer
//!
//! Every piece of free text that ends up in an agent CLI argument vector passes
//! through this module. Two independent checks apply: character-class
//! rejection of shell metacharacters, and a fixed whitelist of slash-command
//! names. Argument vectors are handed to the OS as arrays, never as a shell
//! string; these checks hold even if a caller later breaks that rule.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::{SanitizationFailure, SanitizationKind};

/// Maximum chat message length, in characters
pub const MAX_CHAT_MESSAGE_LENGTH: usize = 32_000;

/// Maximum raw command-name length, in characters
pub const MAX_COMMAND_LENGTH: usize = 1_000;

/// Executable used for agent invocations unless a builder overrides it
pub const DEFAULT_AGENT_EXECUTABLE: &str = "claude";

/// Characters that carry meaning in a shell
pub const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '<', '>', '\n', '\r', '\0', '\\',
];

/// Slash commands that may be forwarded to the agent CLI
pub const ALLOWED_COMMANDS: &[&str] = &[
    // Built-in agent CLI commands
    "help",
    "status",
    "clear",
    "compact",
    "config",
    "cost",
    "doctor",
    "init",
    "login",
    "logout",
    "memory",
    "mcp",
    "model",
    "permissions",
    "pr-comments",
    "review",
    "terminal-setup",
    "vim",
    // Workflow skills
    "orchestrate",
    "plan",
    "plan-feature",
    "validate-plan",
    "implement-task",
    "verify-code",
    "call-cursor",
    "call-gemini",
    "resolve-conflict",
    "phase-status",
    "list-projects",
    "sync-rules",
    "add-lesson",
    "skills",
    "task",
    "discover",
    "workflow-manager",
];

lazy_static! {
    static ref COMMAND_NAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9-]*$").unwrap();
}

/// Whether `name` is a whitelisted slash command (without the leading `/`)
pub fn is_allowed_command(name: &str) -> bool {
    ALLOWED_COMMANDS.contains(&name)
}

/// Output formats accepted by the agent CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    StreamJson,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::StreamJson => "stream-json",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = SanitizationFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "stream-json" => Ok(OutputFormat::StreamJson),
            _ => Err(SanitizationFailure::new(
                SanitizationKind::InvalidFormat,
                "output_format",
                "Output format must be one of: text, json, stream-json",
            )),
        }
    }
}

/// An agent CLI argument vector. The first element is the executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Command(Vec<String>);

impl Command {
    pub fn program(&self) -> &str {
        &self.0[0]
    }

    pub fn args(&self) -> &[String] {
        &self.0[1..]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

fn dangerous_chars(input: &str) -> BTreeSet<char> {
    input
        .chars()
        .filter(|c| SHELL_METACHARACTERS.contains(c))
        .collect()
}

fn describe(chars: &BTreeSet<char>) -> String {
    let listed: Vec<String> = chars.iter().map(|c| format!("'{}'", c.escape_debug())).collect();
    format!("[{}]", listed.join(", "))
}

/// Validate a chat message headed for an agent prompt.
///
/// Newlines and carriage returns are tolerated so multi-line prompts work, but
/// only when they are the sole metacharacters present.
pub fn sanitize_chat_message(message: &str) -> Result<&str, SanitizationFailure> {
    if message.is_empty() {
        return Err(SanitizationFailure::new(
            SanitizationKind::EmptyInput,
            "message",
            "Message cannot be empty",
        ));
    }

    if message.chars().count() > MAX_CHAT_MESSAGE_LENGTH {
        return Err(SanitizationFailure::new(
            SanitizationKind::TooLong,
            "message",
            format!("Message exceeds maximum length of {MAX_CHAT_MESSAGE_LENGTH}"),
        ));
    }

    if message.contains('\0') {
        return Err(SanitizationFailure::new(
            SanitizationKind::NullByte,
            "message",
            "Message contains null bytes",
        ));
    }

    let mut found = dangerous_chars(message);
    if !found.is_empty() {
        found.remove(&'\n');
        found.remove(&'\r');
        if !found.is_empty() {
            return Err(SanitizationFailure::new(
                SanitizationKind::DangerousChar,
                "message",
                format!(
                    "Message contains potentially dangerous characters: {}",
                    describe(&found)
                ),
            ));
        }
    }

    Ok(message)
}

/// Validate a slash-command name and return it without leading slashes.
pub fn sanitize_command_name(command: &str) -> Result<&str, SanitizationFailure> {
    if command.is_empty() {
        return Err(SanitizationFailure::new(
            SanitizationKind::EmptyInput,
            "command",
            "Command cannot be empty",
        ));
    }

    if command.chars().count() > MAX_COMMAND_LENGTH {
        return Err(SanitizationFailure::new(
            SanitizationKind::TooLong,
            "command",
            format!("Command exceeds maximum length of {MAX_COMMAND_LENGTH}"),
        ));
    }

    let name = command.trim_start_matches('/');

    if !COMMAND_NAME.is_match(name) {
        return Err(SanitizationFailure::new(
            SanitizationKind::InvalidFormat,
            "command",
            "Command name must start with a letter and contain only letters, numbers, and hyphens",
        ));
    }

    if !is_allowed_command(name) {
        return Err(SanitizationFailure::new(
            SanitizationKind::NotWhitelisted,
            "command",
            format!("Command '{name}' is not in the allowed commands list"),
        ));
    }

    Ok(name)
}

/// Validate slash-command or CLI arguments. No newline carve-out applies here.
pub fn sanitize_command_args<S: AsRef<str>>(args: &[S]) -> Result<Vec<String>, SanitizationFailure> {
    let mut sanitized = Vec::with_capacity(args.len());

    for (i, arg) in args.iter().enumerate() {
        let arg = arg.as_ref();

        if arg.contains('\0') {
            return Err(SanitizationFailure::new(
                SanitizationKind::NullByte,
                "args",
                format!("Argument {i} contains null bytes"),
            ));
        }

        let found = dangerous_chars(arg);
        if !found.is_empty() {
            return Err(SanitizationFailure::new(
                SanitizationKind::DangerousChar,
                "args",
                format!(
                    "Argument {i} contains potentially dangerous characters: {}",
                    describe(&found)
                ),
            ));
        }

        sanitized.push(arg.to_string());
    }

    Ok(sanitized)
}

/// Builds agent CLI argument vectors.
///
/// This is the only place agent-CLI arguments are assembled.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    executable: String,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_EXECUTABLE)
    }
}

impl CommandBuilder {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// `[exe, "-p", prompt, "--output-format", format, ...extra_args]`
    pub fn agent_command<S: AsRef<str>>(
        &self,
        prompt: &str,
        output_format: &str,
        extra_args: &[S],
    ) -> Result<Command, SanitizationFailure> {
        let format: OutputFormat = output_format.parse()?;
        let prompt = sanitize_chat_message(prompt)?;
        let extra = sanitize_command_args(extra_args)?;

        let mut argv = Vec::with_capacity(5 + extra.len());
        argv.push(self.executable.clone());
        argv.push("-p".to_string());
        argv.push(prompt.to_string());
        argv.push("--output-format".to_string());
        argv.push(format.as_str().to_string());
        argv.extend(extra);

        Ok(Command(argv))
    }

    /// Join `/<command> <args...>` into one prompt and build it as an agent command
    pub fn slash_command<S: AsRef<str>>(
        &self,
        command: &str,
        args: &[S],
        output_format: &str,
    ) -> Result<Command, SanitizationFailure> {
        let name = sanitize_command_name(command)?;
        let args = sanitize_command_args(args)?;

        let mut prompt = format!("/{name}");
        if !args.is_empty() {
            prompt.push(' ');
            prompt.push_str(&args.join(" "));
        }

        if prompt.chars().count() > MAX_CHAT_MESSAGE_LENGTH {
            return Err(SanitizationFailure::new(
                SanitizationKind::TooLong,
                "args",
                format!("Command with arguments exceeds maximum length of {MAX_CHAT_MESSAGE_LENGTH}"),
            ));
        }

        self.agent_command::<&str>(&prompt, output_format, &[])
    }
}

/// Build an agent command with the default executable
pub fn build_agent_command<S: AsRef<str>>(
    prompt: &str,
    output_format: &str,
    extra_args: &[S],
) -> Result<Command, SanitizationFailure> {
    CommandBuilder::default().agent_command(prompt, output_format, extra_args)
}

/// Build a slash command with the default executable
pub fn build_slash_command<S: AsRef<str>>(
    command: &str,
    args: &[S],
    output_format: &str,
) -> Result<Command, SanitizationFailure> {
    CommandBuilder::default().slash_command(command, args, output_format)
}
