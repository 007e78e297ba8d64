//! Authorization of classified statements against the configured policy.

use crate::config::SecurityPolicy;
use crate::security::classifier::{Classification, StatementKind};
use std::collections::BTreeSet;

/// Outcome of [`authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decide whether a classified statement may run. Pure: same inputs, same decision.
///
/// `dangerous` is denied under every policy.
pub fn authorize(classification: &Classification, policy: &SecurityPolicy) -> Decision {
    let mode = if policy.is_read_only() {
        "in read-only mode"
    } else {
        "by the current policy"
    };

    match classification.kind {
        StatementKind::Dangerous => {
            let reasons = if classification.reasons.is_empty() {
                "statement is outside the permitted grammar".to_string()
            } else {
                classification.reasons.join("; ")
            };
            return Decision::Deny(format!("dangerous statement denied: {}", reasons));
        }
        StatementKind::Write if !policy.allow_write => {
            return Decision::Deny(format!("write statements are not permitted {}", mode));
        }
        StatementKind::Ddl if !policy.allow_ddl => {
            return Decision::Deny(format!("ddl statements are not permitted {}", mode));
        }
        _ => {}
    }

    if classification.system_catalog && !policy.allow_system_catalogs {
        return Decision::Deny("system catalog access is not permitted".to_string());
    }

    for table in &classification.tables {
        if let Decision::Deny(reason) = authorize_table(table, policy) {
            return Decision::Deny(reason);
        }
    }

    Decision::Allow
}

/// Apply the allow/block lists to one table name, bare or `schema.table`.
///
/// Also used for catalog lookups, which never pass through [`authorize`].
pub fn authorize_table(table: &str, policy: &SecurityPolicy) -> Decision {
    if matches_any(table, &policy.blocked_tables) {
        return Decision::Deny(format!("table '{}' is blocked", table));
    }
    if !policy.allowed_tables.is_empty() && !matches_any(table, &policy.allowed_tables) {
        return Decision::Deny(format!("table '{}' is not in the allowed table list", table));
    }
    Decision::Allow
}

/// A qualified name `schema.table` matches an entry for either the full name or the bare table.
fn matches_any(table: &str, entries: &BTreeSet<String>) -> bool {
    if entries.contains(table) {
        return true;
    }
    let bare = table.rsplit('.').next().unwrap_or(table);
    let bare = bare.trim_matches('"');
    entries.contains(bare)
}
