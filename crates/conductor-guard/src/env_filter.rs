//! Subprocess environment filtering
//!
//! Environments for agent and git subprocesses are built from an allow-list,
//! never by stripping the parent environment. The blocked set is applied on
//! top of the allow-list and to caller overrides, so the named credentials
//! cannot appear even if an allow rule is later widened by mistake.

use std::collections::BTreeMap;

/// A subprocess environment, sorted by variable name
pub type EnvMap = BTreeMap<String, String>;

/// Value forced into `TERM` for agent subprocesses
pub const AGENT_TERM: &str = "dumb";

/// Credentials that never reach a subprocess
pub const BLOCKED_VARS: &[&str] = &[
    // Database credentials
    "SURREAL_PASS",
    "SURREAL_PASSWORD",
    "DATABASE_URL",
    "DATABASE_PASSWORD",
    "DB_PASSWORD",
    "DB_PASS",
    "PGPASSWORD",
    "MYSQL_PWD",
    "MONGO_PASSWORD",
    "REDIS_PASSWORD",
    // Cloud secrets
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "AZURE_CLIENT_SECRET",
    "AZURE_TENANT_ID",
    "GCP_SERVICE_ACCOUNT_KEY",
    "GOOGLE_APPLICATION_CREDENTIALS",
    // Generic secrets
    "SECRET_KEY",
    "PRIVATE_KEY",
    "ENCRYPTION_KEY",
    "JWT_SECRET",
    "SESSION_SECRET",
    "COOKIE_SECRET",
];

/// LLM provider key prefixes forwarded to agent subprocesses
pub const AGENT_ALLOWED_PREFIXES: &[&str] = &[
    "ANTHROPIC_",
    "OPENAI_",
    "GOOGLE_AI_",
    "GEMINI_",
    "MISTRAL_",
    "CURSOR_",
    "CLAUDE_",
];

/// Runtime variables always forwarded to agent subprocesses
pub const AGENT_RUNTIME_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "SHELL",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TMPDIR",
    "TMP",
    "TEMP",
    "XDG_RUNTIME_DIR",
    "XDG_CONFIG_HOME",
    "XDG_DATA_HOME",
    "VIRTUAL_ENV",
    "CONDA_PREFIX",
    "PYTHONPATH",
    "NODE_PATH",
    // Connection address only; credentials live in SURREAL_PASS
    "SURREAL_URL",
    "ORCHESTRATOR_USE_LANGGRAPH",
    "USE_RALPH_LOOP",
    "PARALLEL_WORKERS",
];

pub const GIT_ALLOWED_PREFIXES: &[&str] = &["GIT_", "SSH_"];

pub const GIT_RUNTIME_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TMPDIR",
    "TMP",
    "TEMP",
    "EDITOR",
    "VISUAL",
    "GPG_AGENT_INFO",
    "GPG_TTY",
    "GNUPGHOME",
];

pub fn is_blocked(key: &str) -> bool {
    BLOCKED_VARS.contains(&key)
}

/// Which subprocess class an environment is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvProfile {
    Agent,
    Git,
}

impl EnvProfile {
    fn runtime_vars(self) -> &'static [&'static str] {
        match self {
            EnvProfile::Agent => AGENT_RUNTIME_VARS,
            EnvProfile::Git => GIT_RUNTIME_VARS,
        }
    }

    fn allowed_prefixes(self) -> &'static [&'static str] {
        match self {
            EnvProfile::Agent => AGENT_ALLOWED_PREFIXES,
            EnvProfile::Git => GIT_ALLOWED_PREFIXES,
        }
    }

    fn admits(self, key: &str) -> bool {
        self.runtime_vars().contains(&key)
            || self
                .allowed_prefixes()
                .iter()
                .any(|prefix| key.starts_with(prefix))
    }

    /// Build an environment for this profile from an explicit ambient set.
    ///
    /// `extra` is merged last, after its own blocked-set filtering.
    pub fn build<A, K, V>(self, ambient: A, extra: &EnvMap) -> EnvMap
    where
        A: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut env = EnvMap::new();
        let mut dropped = 0usize;

        for (key, value) in ambient {
            let key = key.into();
            if is_blocked(&key) {
                dropped += 1;
                continue;
            }
            if self.admits(&key) {
                env.insert(key, value.into());
            }
        }

        if self == EnvProfile::Agent {
            env.insert("TERM".to_string(), AGENT_TERM.to_string());
        }

        for (key, value) in extra {
            if is_blocked(key) {
                tracing::warn!(variable = %key, "blocked variable refused from environment override");
                continue;
            }
            env.insert(key.clone(), value.clone());
        }

        tracing::debug!(
            profile = ?self,
            forwarded = env.len(),
            blocked = dropped,
            "built subprocess environment"
        );
        env
    }
}

/// Current process environment, skipping entries that are not valid UTF-8
fn process_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

/// Environment for agent CLI subprocesses, built from the current process environment
pub fn agent_env(extra: &EnvMap) -> EnvMap {
    EnvProfile::Agent.build(process_vars(), extra)
}

/// Environment for git subprocesses, built from the current process environment
pub fn git_env(extra: &EnvMap) -> EnvMap {
    EnvProfile::Git.build(process_vars(), extra)
}
