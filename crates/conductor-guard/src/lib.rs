//! Conductor Guard - safety and arbitration for agent orchestration
//!
//! Everything that stands between untrusted input and a side effect lives
//! here:
//!
//! 1. **Command Sanitizer** (`sanitize`): chat text and slash commands become
//!    argument vectors, never shell strings
//! 2. **Environment Filter** (`env_filter`): allow-listed subprocess
//!    environments with a hard credential block-list
//! 3. **Deletion Confirmation** (`deletion`): single-use, time-limited
//!    tokens in front of project removal
//! 4. **Conflict Resolver** (`resolver`): weighted arbitration between the
//!    security and architecture reviewers, with domain authority vetoes
//!
//! Rate limiting of the HTTP surface sits in `conductor-gateway`.
//!
//! # Quick Start
//!
//! ```
//! use conductor_guard::sanitize::build_agent_command;
//! use conductor_guard::resolver::{ConflictResolver, ResolutionAction, ReviewPayload};
//!
//! let command = build_agent_command::<&str>("Explain the failing test", "json", &[]).unwrap();
//! assert_eq!(command.program(), "claude");
//!
//! let resolver = ConflictResolver::default();
//! let result = resolver.resolve(&ReviewPayload::new(true, 8.0), &ReviewPayload::new(true, 8.0));
//! assert_eq!(result.action, ResolutionAction::Approve);
//! ```

pub mod deletion;
pub mod env_filter;
pub mod error;
pub mod events;
pub mod invocation;
pub mod resolver;
pub mod sanitize;
pub mod validators;

pub use deletion::{DeletionConfirmation, DeletionManager, CONFIRMATION_TTL_SECS};
pub use env_filter::{agent_env, git_env, EnvMap, EnvProfile};
pub use error::{GuardError, Result, SanitizationFailure, SanitizationKind};
pub use events::{EventSink, MemorySink, NullSink, SafetyEvent};
pub use invocation::{AgentInvocation, InvocationPreview};
pub use resolver::{
    BlockingIssue, ConflictResolver, ResolutionAction, ResolutionResult, ResolverConfig,
    ReviewPayload, ReviewResult, Reviewer,
};
pub use sanitize::{
    build_agent_command, build_slash_command, sanitize_chat_message, sanitize_command_args,
    sanitize_command_name, Command, CommandBuilder, OutputFormat,
};
pub use validators::validate_project_name;

/// Guard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
