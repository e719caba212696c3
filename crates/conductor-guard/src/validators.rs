//! Identifier validation for names that end up in filesystem paths

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{GuardError, Result};

pub const MAX_PROJECT_NAME_LENGTH: usize = 64;

/// Names that collide with API routes or common sentinels
pub const RESERVED_PROJECT_NAMES: &[&str] = &["api", "admin", "system", "root", "null", "undefined"];

lazy_static! {
    static ref PROJECT_NAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{0,63}$").unwrap();
}

/// Validate a project name before it is joined onto a projects root.
pub fn validate_project_name(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(GuardError::InvalidProjectName(
            "Project name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_PROJECT_NAME_LENGTH {
        return Err(GuardError::InvalidProjectName(format!(
            "Project name cannot exceed {MAX_PROJECT_NAME_LENGTH} characters"
        )));
    }

    if !PROJECT_NAME.is_match(name) {
        return Err(GuardError::InvalidProjectName(
            "Project name must start with a letter and contain only letters, numbers, hyphens, and underscores"
                .to_string(),
        ));
    }

    let lowered = name.to_ascii_lowercase();
    if RESERVED_PROJECT_NAMES.contains(&lowered.as_str()) {
        return Err(GuardError::InvalidProjectName(format!(
            "Project name '{name}' is reserved"
        )));
    }

    Ok(name)
}
