//! Conflict resolution between the two reviewers of a change
//!
//! The security reviewer and the architecture reviewer score a change
//! independently. Their verdicts are reconciled in a fixed order:
//!
//! 1. authority veto: a reviewer's blocker in its own domain rejects outright
//! 2. any remaining blocker rejects
//! 3. a score outside `0..=MAX_SCORE` escalates to a human
//! 4. a score gap above the disagreement threshold escalates to a human
//! 5. otherwise the weighted score must reach the minimum
//!
//! Resolution never fails. Malformed verdicts normalize to an unapproved,
//! zero-score review with no blockers. Out-of-range scores are kept as
//! reported so they can never blend into an approval.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scale ceiling for reviewer scores
pub const MAX_SCORE: f64 = 10.0;

/// The two reviewer roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reviewer {
    Security,
    Architecture,
}

impl Reviewer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reviewer::Security => "security",
            Reviewer::Architecture => "architecture",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Reviewer::Security => "Security",
            Reviewer::Architecture => "Architecture",
        }
    }
}

impl std::fmt::Display for Reviewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn keyword(word: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word))).unwrap()
}

lazy_static! {
    /// (pattern, authority, domain)
    static ref DOMAIN_PATTERNS: Vec<(Regex, Reviewer, &'static str)> = {
        let security = [
            ("sql injection", "sql injection"),
            ("command injection", "command injection"),
            ("code injection", "code injection"),
            ("injection", "injection"),
            ("vulnerability", "vulnerability"),
            ("vulnerabilities", "vulnerability"),
            ("xss", "xss"),
            ("cross-site scripting", "xss"),
            ("csrf", "csrf"),
            ("cross-site request forgery", "csrf"),
            ("rce", "rce"),
            ("remote code execution", "rce"),
            ("authentication bypass", "authentication bypass"),
            ("auth bypass", "authentication bypass"),
            ("authorization bypass", "authorization bypass"),
            ("authz bypass", "authorization bypass"),
            ("privilege escalation", "privilege escalation"),
            ("privesc", "privilege escalation"),
            ("path traversal", "path traversal"),
            ("directory traversal", "directory traversal"),
            ("insecure deserialization", "deserialization"),
            ("ssrf", "ssrf"),
            ("server-side request forgery", "ssrf"),
            ("security", "security"),
        ];
        let architecture = [
            ("architecture", "architecture"),
            ("architectural", "architecture"),
            ("design pattern", "pattern"),
            ("anti-pattern", "pattern"),
            ("pattern", "pattern"),
            ("patterns", "pattern"),
            ("structure", "structure"),
            ("structural", "structure"),
            ("circular dependency", "structure"),
            ("layering violation", "structure"),
        ];

        security
            .iter()
            .map(|(word, domain)| (keyword(word), Reviewer::Security, *domain))
            .chain(
                architecture
                    .iter()
                    .map(|(word, domain)| (keyword(word), Reviewer::Architecture, *domain)),
            )
            .collect()
    };

    /// Wording that marks a documentation or process gap rather than a defect
    static ref PROCESS_GAP_PATTERNS: Vec<Regex> = [
        "no security requirements",
        "not specified",
        "missing documentation",
        "lacks documentation",
        "should include",
        "should add",
        "no mention of",
        "not defined",
        "unclear requirements",
        "missing requirements",
        "requirements unclear",
        "consider adding",
        "recommend adding",
        "suggest adding",
        "would benefit from",
        "needs documentation",
        "should document",
    ]
    .iter()
    .map(|phrase| keyword(phrase))
    .collect();
}

fn is_process_gap(issue: &str) -> bool {
    PROCESS_GAP_PATTERNS.iter().any(|p| p.is_match(issue))
}

/// A reviewer verdict as submitted.
///
/// Deserialization never fails: any JSON value normalizes, with missing or
/// ill-typed fields falling back to unapproved, zero score, no blockers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct ReviewPayload {
    pub approved: bool,
    pub score: f64,
    pub blocking_issues: Vec<String>,
}

impl ReviewPayload {
    pub fn new(approved: bool, score: f64) -> Self {
        Self {
            approved,
            score,
            blocking_issues: Vec::new(),
        }
    }

    pub fn with_blocker(mut self, issue: impl Into<String>) -> Self {
        self.blocking_issues.push(issue.into());
        self
    }
}

impl From<Value> for ReviewPayload {
    fn from(value: Value) -> Self {
        Self::from(&value)
    }
}

impl From<&Value> for ReviewPayload {
    fn from(value: &Value) -> Self {
        let approved = value
            .get("approved")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let score = value
            .get("score")
            .and_then(|score| match score {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            })
            .unwrap_or(0.0);

        let blocking_issues = value
            .get("blocking_issues")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            approved,
            score,
            blocking_issues,
        }
    }
}

/// A normalized verdict attributed to one reviewer
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewResult {
    pub approved: bool,
    pub score: f64,
    pub blocking_issues: Vec<String>,
    pub agent_id: String,
}

impl ReviewResult {
    pub fn parse(payload: &ReviewPayload, reviewer: Reviewer) -> Self {
        let score = if payload.score.is_finite() { payload.score } else { 0.0 };

        Self {
            approved: payload.approved,
            score,
            blocking_issues: payload.blocking_issues.clone(),
            agent_id: reviewer.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingIssue {
    pub agent: String,
    pub issue: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionAction {
    Approve,
    Reject,
    Escalate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub approved: bool,
    pub final_score: f64,
    pub decision_reason: String,
    pub blocking_issues: Vec<BlockingIssue>,
    pub action: ResolutionAction,
}

impl ResolutionResult {
    fn escalate(final_score: f64, reason: String) -> Self {
        Self {
            approved: false,
            final_score,
            decision_reason: reason,
            blocking_issues: Vec::new(),
            action: ResolutionAction::Escalate,
        }
    }

    fn reject(final_score: f64, reason: String, blocking_issues: Vec<BlockingIssue>) -> Self {
        Self {
            approved: false,
            final_score,
            decision_reason: reason,
            blocking_issues,
            action: ResolutionAction::Reject,
        }
    }
}

/// Resolver tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub security_weight: f64,
    pub architecture_weight: f64,
    /// Weighted score needed for approval
    pub min_score: f64,
    /// Score gap above which the decision goes to a human
    pub disagreement_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            security_weight: 0.6,
            architecture_weight: 0.4,
            min_score: 7.0,
            disagreement_threshold: 3.0,
        }
    }
}

fn in_scale(score: f64) -> bool {
    (0.0..=MAX_SCORE).contains(&score)
}

/// Scale two weights to sum to 1.0. Unusable input falls back to an even split.
pub fn normalize_weights(security: f64, architecture: f64) -> (f64, f64) {
    let usable = security.is_finite() && architecture.is_finite() && security >= 0.0 && architecture >= 0.0;
    let total = security + architecture;
    if !usable || total <= 0.0 {
        tracing::warn!(security, architecture, "unusable reviewer weights, splitting evenly");
        return (0.5, 0.5);
    }
    (security / total, architecture / total)
}

/// Reconciles the security and architecture verdicts on a change
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    config: ResolverConfig,
}

impl ConflictResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn resolve(&self, security: &ReviewPayload, architecture: &ReviewPayload) -> ResolutionResult {
        self.resolve_with_weights(security, architecture, None, None)
    }

    /// Resolve with per-call weight overrides, used when reviewer roles are
    /// dispatched to agents other than the defaults
    pub fn resolve_with_weights(
        &self,
        security: &ReviewPayload,
        architecture: &ReviewPayload,
        security_weight: Option<f64>,
        architecture_weight: Option<f64>,
    ) -> ResolutionResult {
        let r1 = ReviewResult::parse(security, Reviewer::Security);
        let r2 = ReviewResult::parse(architecture, Reviewer::Architecture);

        let blockers: Vec<BlockingIssue> = [&r1, &r2]
            .into_iter()
            .flat_map(|review| {
                review.blocking_issues.iter().map(move |issue| BlockingIssue {
                    agent: review.agent_id.clone(),
                    issue: issue.clone(),
                })
            })
            .collect();

        if let Some(reason) = check_authority_veto(&blockers) {
            tracing::info!(reason = %reason, "authority veto");
            return ResolutionResult::reject(0.0, format!("Authority Veto: {reason}"), blockers);
        }

        let (w1, w2) = normalize_weights(
            security_weight.unwrap_or(self.config.security_weight),
            architecture_weight.unwrap_or(self.config.architecture_weight),
        );
        let final_score = r1.score * w1 + r2.score * w2;

        let result = if !blockers.is_empty() {
            ResolutionResult::reject(
                final_score,
                format!("Rejected due to {} blocking issues", blockers.len()),
                blockers,
            )
        } else if !in_scale(r1.score) || !in_scale(r2.score) {
            ResolutionResult::escalate(
                final_score,
                format!(
                    "Score out of range 0-{}: {}={}, {}={}",
                    MAX_SCORE, r1.agent_id, r1.score, r2.agent_id, r2.score
                ),
            )
        } else if (r1.score - r2.score).abs() > self.config.disagreement_threshold {
            ResolutionResult::escalate(
                final_score,
                format!(
                    "High disagreement (diff {:.1}): {}={}, {}={}",
                    (r1.score - r2.score).abs(),
                    r1.agent_id,
                    r1.score,
                    r2.agent_id,
                    r2.score
                ),
            )
        } else if final_score < self.config.min_score {
            ResolutionResult::reject(
                final_score,
                format!(
                    "Score {:.1} below threshold {:.1}",
                    final_score, self.config.min_score
                ),
                Vec::new(),
            )
        } else {
            ResolutionResult {
                approved: true,
                final_score,
                decision_reason: "Approved by weighted consensus".to_string(),
                blocking_issues: Vec::new(),
                action: ResolutionAction::Approve,
            }
        };

        tracing::info!(
            action = ?result.action,
            final_score = result.final_score,
            security_score = r1.score,
            architecture_score = r2.score,
            "review conflict resolved"
        );
        result
    }
}

/// First blocker raised by the authority of the domain it names, if any
fn check_authority_veto(blockers: &[BlockingIssue]) -> Option<String> {
    for blocker in blockers {
        if is_process_gap(&blocker.issue) {
            continue;
        }

        for (pattern, authority, domain) in DOMAIN_PATTERNS.iter() {
            if authority.as_str() == blocker.agent && pattern.is_match(&blocker.issue) {
                return Some(format!(
                    "{} flagged {} issue: {}",
                    authority.title(),
                    domain.to_uppercase(),
                    blocker.issue
                ));
            }
        }
    }
    None
}
