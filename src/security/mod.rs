//! Security validation for untrusted SQL.
//!
//! [`classify`] and [`authorize`] are pure functions; [`SecurityValidator`]
//! combines them with the configured policy and is the only place a
//! [`ValidatedStatement`] can be created. Connection leases accept untrusted
//! SQL only in that form.

pub mod classifier;
pub mod policy;

pub use classifier::{Classification, StatementKind, classify};
pub use policy::{Decision, authorize, authorize_table};

use crate::config::SecurityPolicy;
use crate::db::DatabaseType;
use crate::error::{DbError, DbResult};
use tracing::{debug, warn};

/// SQL text that passed classification and authorization.
#[derive(Debug, Clone)]
pub struct ValidatedStatement {
    sql: String,
    classification: Classification,
}

impl ValidatedStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn kind(&self) -> StatementKind {
        self.classification.kind
    }

    /// Whether the statement produces a result set when executed.
    pub fn returns_rows(&self) -> bool {
        self.classification.kind == StatementKind::Read
            || self.sql.to_lowercase().contains("returning")
    }
}

/// Gate between tool arguments and the database.
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    policy: SecurityPolicy,
    database_type: DatabaseType,
}

impl SecurityValidator {
    pub fn new(policy: SecurityPolicy, database_type: DatabaseType) -> Self {
        Self {
            policy,
            database_type,
        }
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Apply the table allow/block lists to a catalog lookup of `schema.table`.
    pub fn check_table(&self, schema: &str, table: &str) -> DbResult<()> {
        let qualified = format!("{}.{}", schema, table);
        match authorize_table(&qualified, &self.policy) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                warn!(table = %qualified, reason = %reason, "Catalog access denied by security policy");
                Err(DbError::policy_denied(StatementKind::Read.as_str(), reason))
            }
        }
    }

    /// Whether a catalog listing may include `schema.table`.
    pub fn table_visible(&self, schema: &str, table: &str) -> bool {
        authorize_table(&format!("{}.{}", schema, table), &self.policy).is_allowed()
    }

    /// Classify `sql` without authorizing it.
    pub fn classify(&self, sql: &str) -> Classification {
        classify(sql, self.database_type)
    }

    /// Classify and authorize `sql`. Denials are logged as security events.
    pub fn validate(&self, sql: &str) -> DbResult<ValidatedStatement> {
        let classification = self.classify(sql);

        match authorize(&classification, &self.policy) {
            Decision::Allow => {
                debug!(
                    kind = %classification.kind,
                    statement = %classification.statement,
                    tables = ?classification.tables,
                    "Statement authorized"
                );
                Ok(ValidatedStatement {
                    sql: sql.trim().to_string(),
                    classification,
                })
            }
            Decision::Deny(reason) => {
                warn!(
                    kind = %classification.kind,
                    statement = %classification.statement,
                    reasons = ?classification.reasons,
                    reason = %reason,
                    "Statement denied by security policy"
                );
                Err(DbError::policy_denied(
                    classification.kind.as_str(),
                    reason,
                ))
            }
        }
    }
}
