//! Risk assessment for operations a tool is about to run.
//!
//! Tools consult an evaluator from `Tool::should_confirm`; the scheduler
//! stores the resulting [`RiskAssessment`] once per call and never
//! recomputes it.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::config::RheoConfig;

/// Coarse risk level, ordered from harmless to destructive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=9 => Self::Safe,
            10..=29 => Self::Low,
            30..=59 => Self::Medium,
            60..=89 => Self::High,
            _ => Self::Critical,
        }
    }
}

/// What kind of statement is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationType {
    Query,
    Modify,
    Schema,
    Permission,
    Transaction,
    Unknown,
}

impl OperationType {
    fn base_score(self) -> u32 {
        match self {
            Self::Query => 0,
            Self::Transaction => 10,
            Self::Unknown => 20,
            Self::Modify => 30,
            Self::Schema => 50,
            Self::Permission => 60,
        }
    }
}

/// Result of evaluating one operation. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: u32,
    pub reasons: Vec<String>,
    pub requires_confirmation: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<OperationType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_resources: Vec<String>,
}

impl RiskAssessment {
    /// Assessment for calls that need no gate.
    pub fn safe() -> Self {
        Self {
            level: RiskLevel::Safe,
            score: 0,
            reasons: Vec::new(),
            requires_confirmation: false,
            recommendations: Vec::new(),
            operation_type: None,
            affected_resources: Vec::new(),
        }
    }

    /// A gated assessment built from a level and reasons.
    pub fn gated(level: RiskLevel, reasons: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            level,
            score: 0,
            reasons: reasons.into_iter().map(Into::into).collect(),
            requires_confirmation: true,
            ..Self::safe()
        }
    }
}

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--[^\n]*").expect("line comment regex must compile"));
static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment regex must compile"));
static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("string literal regex must compile"));
static TABLE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:from|join|update|into|table)\s+",
        r"(?:if\s+(?:not\s+)?exists\s+)?([A-Za-z_][\w.]*)",
    ))
    .expect("table reference regex must compile")
});
static WHERE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwhere\b").expect("where regex must compile"));
static TAUTOLOGY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwhere\s+(?:1\s*=\s*1|true|'1'\s*=\s*'1')\b")
        .expect("tautology regex must compile")
});

/// Known-dangerous statement shapes and their score penalty.
static DANGEROUS_PATTERNS: LazyLock<Vec<(Regex, u32, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\bdrop\s+(?:database|schema)\b", 50, "drops an entire database"),
        (r"(?i)\bdrop\s+table\b", 30, "drops a table"),
        (r"(?i)\btruncate\b", 40, "truncates a table"),
        (r"(?i)\bgrant\s+all\b", 20, "grants all privileges"),
        (r"(?i)\balter\s+table\b[^;]*\bdrop\b", 20, "drops a column or constraint"),
    ]
    .into_iter()
    .map(|(pattern, penalty, reason)| {
        (
            Regex::new(pattern).expect("dangerous pattern regex must compile"),
            penalty,
            reason,
        )
    })
    .collect()
});

/// Scores SQL statements by operation type, unbounded write predicates,
/// table count and known-dangerous patterns.
#[derive(Debug, Clone, Default)]
pub struct SqlRiskEvaluator {
    allow_dangerous_operations: bool,
}

impl SqlRiskEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RheoConfig) -> Self {
        Self::new().with_allow_dangerous_operations(config.allow_dangerous_operations)
    }

    /// When set, only `critical` operations still require confirmation.
    pub fn with_allow_dangerous_operations(mut self, allow: bool) -> Self {
        self.allow_dangerous_operations = allow;
        self
    }

    pub fn evaluate(&self, sql: &str) -> RiskAssessment {
        let cleaned = strip_noise(sql);
        let statements: Vec<&str> = cleaned
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let mut score = 0u32;
        let mut reasons = Vec::new();
        let mut recommendations = Vec::new();

        let operation_type = statements
            .iter()
            .map(|s| classify(s))
            .max_by_key(|op| op.base_score())
            .unwrap_or(OperationType::Unknown);
        score += operation_type.base_score();
        if operation_type != OperationType::Query {
            reasons.push(format!("{operation_type} operation"));
        }

        for statement in &statements {
            let keyword = leading_keyword(statement);
            if matches!(keyword.as_str(), "update" | "delete")
                && !WHERE_CLAUSE.is_match(statement)
            {
                score += 40;
                reasons.push(format!("{} without WHERE affects every row", keyword.to_uppercase()));
                recommendations.push("add a WHERE clause to bound the affected rows".to_string());
            }
        }

        if TAUTOLOGY.is_match(&cleaned) {
            score += 30;
            reasons.push("WHERE clause is always true".to_string());
        }

        for (pattern, penalty, reason) in DANGEROUS_PATTERNS.iter() {
            if pattern.is_match(&cleaned) {
                score += penalty;
                reasons.push((*reason).to_string());
            }
        }

        if statements.len() > 1 {
            score += 15 * (statements.len() as u32 - 1);
            reasons.push(format!("{} statements in one call", statements.len()));
            recommendations.push("run statements one at a time".to_string());
        }

        let mut tables: Vec<String> = TABLE_REF
            .captures_iter(&cleaned)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_ascii_lowercase()))
            .collect();
        tables.sort();
        tables.dedup();
        if tables.len() > 3 && operation_type != OperationType::Query {
            score += 10;
            reasons.push(format!("touches {} tables", tables.len()));
        }

        let score = score.min(100);
        let level = RiskLevel::from_score(score);
        let requires_confirmation = if self.allow_dangerous_operations {
            level >= RiskLevel::Critical
        } else {
            level >= RiskLevel::Medium
        };
        if requires_confirmation {
            recommendations.push("take a backup before running".to_string());
        }

        RiskAssessment {
            level,
            score,
            reasons,
            requires_confirmation,
            recommendations,
            operation_type: Some(operation_type),
            affected_resources: tables,
        }
    }
}

fn strip_noise(sql: &str) -> String {
    let without_block = BLOCK_COMMENT.replace_all(sql, " ");
    let without_line = LINE_COMMENT.replace_all(&without_block, " ");
    STRING_LITERAL.replace_all(&without_line, "''").into_owned()
}

fn leading_keyword(statement: &str) -> String {
    statement
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn classify(statement: &str) -> OperationType {
    match leading_keyword(statement).as_str() {
        "select" | "show" | "describe" | "desc" | "explain" | "with" | "pragma" => {
            OperationType::Query
        }
        "insert" | "update" | "delete" | "merge" | "replace" | "upsert" => OperationType::Modify,
        "create" | "alter" | "drop" | "truncate" | "rename" => OperationType::Schema,
        "grant" | "revoke" => OperationType::Permission,
        "begin" | "commit" | "rollback" | "savepoint" | "start" => OperationType::Transaction,
        _ => OperationType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_select_is_safe() {
        let risk = SqlRiskEvaluator::new().evaluate("SELECT id FROM users WHERE id = 1");
        assert_eq!(risk.level, RiskLevel::Safe);
        assert!(!risk.requires_confirmation);
        assert_eq!(risk.operation_type, Some(OperationType::Query));
        assert_eq!(risk.affected_resources, vec!["users".to_string()]);
    }

    #[test]
    fn unbounded_delete_is_high_risk() {
        let risk = SqlRiskEvaluator::new().evaluate("DELETE FROM users");
        assert_eq!(risk.level, RiskLevel::High);
        assert!(risk.requires_confirmation);
        assert!(risk.reasons.iter().any(|r| r.contains("without WHERE")));
    }

    #[test]
    fn bounded_update_needs_confirmation_but_is_not_high() {
        let risk = SqlRiskEvaluator::new().evaluate("UPDATE users SET active = false WHERE id = 7");
        assert_eq!(risk.level, RiskLevel::Medium);
        assert!(risk.requires_confirmation);
    }

    #[test]
    fn drop_database_is_critical_even_when_dangerous_ops_allowed() {
        let evaluator = SqlRiskEvaluator::new().with_allow_dangerous_operations(true);
        let risk = evaluator.evaluate("DROP DATABASE prod");
        assert_eq!(risk.level, RiskLevel::Critical);
        assert!(risk.requires_confirmation);

        let update = evaluator.evaluate("UPDATE users SET a = 1 WHERE id = 2");
        assert!(!update.requires_confirmation);
    }

    #[test]
    fn keywords_inside_comments_and_strings_are_ignored() {
        let risk = SqlRiskEvaluator::new()
            .evaluate("SELECT 'drop table x' AS note FROM logs -- truncate later");
        assert_eq!(risk.level, RiskLevel::Safe);
    }

    #[test]
    fn tautology_and_multiple_statements_add_score() {
        let risk = SqlRiskEvaluator::new()
            .evaluate("UPDATE a SET x = 1 WHERE 1=1; DELETE FROM b WHERE id = 3");
        assert!(risk.reasons.iter().any(|r| r.contains("always true")));
        assert!(risk.reasons.iter().any(|r| r.contains("2 statements")));
        assert!(risk.level >= RiskLevel::High);
    }

    #[test]
    fn level_parses_from_snake_case() {
        assert_eq!("high".parse::<RiskLevel>().ok(), Some(RiskLevel::High));
        assert_eq!(RiskLevel::Critical.to_string(), "critical");
    }
}
