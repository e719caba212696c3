//! Agent subprocess invocations: a sanitized argument vector paired with a
//! filtered environment.

use serde::Serialize;

use crate::env_filter::{agent_env, EnvMap, EnvProfile};
use crate::error::SanitizationFailure;
use crate::sanitize::{Command, CommandBuilder};

/// Everything needed to spawn one agent CLI process
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub command: Command,
    pub env: EnvMap,
}

/// Serializable view of an invocation that names env variables but never their values
#[derive(Debug, Clone, Serialize)]
pub struct InvocationPreview {
    pub command: Vec<String>,
    pub env_keys: Vec<String>,
}

impl AgentInvocation {
    pub fn new(command: Command, env: EnvMap) -> Self {
        Self { command, env }
    }

    /// Sanitize a chat prompt and pair it with the agent environment of this process
    pub fn chat<S: AsRef<str>>(
        builder: &CommandBuilder,
        prompt: &str,
        output_format: &str,
        extra_args: &[S],
        extra_env: &EnvMap,
    ) -> Result<Self, SanitizationFailure> {
        let command = builder.agent_command(prompt, output_format, extra_args)?;
        Ok(Self::new(command, agent_env(extra_env)))
    }

    /// Sanitize a slash command and pair it with the agent environment of this process
    pub fn slash<S: AsRef<str>>(
        builder: &CommandBuilder,
        command: &str,
        args: &[S],
        output_format: &str,
        extra_env: &EnvMap,
    ) -> Result<Self, SanitizationFailure> {
        let command = builder.slash_command(command, args, output_format)?;
        Ok(Self::new(command, agent_env(extra_env)))
    }

    /// Same as [`AgentInvocation::chat`] but against an explicit ambient environment
    pub fn chat_with_ambient<A, K, V>(
        builder: &CommandBuilder,
        prompt: &str,
        output_format: &str,
        ambient: A,
    ) -> Result<Self, SanitizationFailure>
    where
        A: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let command = builder.agent_command::<&str>(prompt, output_format, &[])?;
        Ok(Self::new(command, EnvProfile::Agent.build(ambient, &EnvMap::new())))
    }

    /// A process command that inherits nothing from the parent environment
    pub fn to_process_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(self.command.program());
        cmd.args(self.command.args());
        cmd.env_clear();
        cmd.envs(&self.env);
        cmd
    }

    pub fn preview(&self) -> InvocationPreview {
        InvocationPreview {
            command: self.command.as_slice().to_vec(),
            env_keys: self.env.keys().cloned().collect(),
        }
    }
}
