//! Stateless SQL statement classification.
//!
//! [`classify`] assigns every input exactly one [`StatementKind`]. The grammar
//! recognised here is deliberately narrow; anything outside it is `dangerous`.
//!
//! Rules, applied in order:
//! 1. The input is tokenized with the backend dialect. Tokenization happens
//!    outside string literals, quoted identifiers and dollar-quoted bodies, so
//!    their contents never trigger a rule.
//! 2. Any comment (`--` or `/* */`) is `dangerous`.
//! 3. A `;` followed by any further token is `dangerous`. A single trailing `;`
//!    is accepted.
//! 4. A call to a server-side function that touches the filesystem, the
//!    network, other sessions or server settings is `dangerous`, as is
//!    `COPY ... PROGRAM`.
//! 5. The input must parse as exactly one statement; otherwise `dangerous`.
//! 6. The statement verb decides the kind: queries, `SHOW` and `EXPLAIN` of a
//!    read are `read`; `INSERT`/`UPDATE`/`DELETE`/`MERGE` are `write`;
//!    `CREATE`/`ALTER`/`DROP`/`TRUNCATE`/`COMMENT` are `ddl`; everything else
//!    (transaction control, `COPY`, `CALL`, `SET`, `GRANT`, `PRAGMA`, `ATTACH`,
//!    `VACUUM`, ...) is `dangerous`.
//! 7. `DELETE` or `UPDATE` without `WHERE` is `dangerous`.
//! 8. A `read` containing `INSERT`/`UPDATE`/`DELETE`/`MERGE` (data-modifying
//!    CTE) becomes `write`; `SELECT ... INTO` becomes `ddl`.
//!
//! Referenced tables are the relations of the parsed statement (every table
//! factor, DML target and DDL object, wherever it is nested), and
//! `system_catalog` is set when any name refers to `information_schema`,
//! `pg_catalog`, a `pg_*` relation or the SQLite schema tables. Input that
//! does not parse references no tables; it is already `dangerous`.

use crate::db::DatabaseType;
use serde::Serialize;
use sqlparser::ast::{ObjectName, ObjectType, Statement, Visit, Visitor};
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use std::collections::BTreeSet;
use std::ops::ControlFlow;

/// Classification of one SQL input. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Read,
    Write,
    Ddl,
    Dangerous,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Ddl => "ddl",
            Self::Dangerous => "dangerous",
        }
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub kind: StatementKind,
    /// Why the statement received its kind. Empty for plain reads.
    pub reasons: Vec<String>,
    /// Statement verb, e.g. `SELECT` or `DROP`.
    pub statement: String,
    /// Lowercased relation names as written (possibly schema-qualified).
    pub tables: Vec<String>,
    pub system_catalog: bool,
}

impl Classification {
    fn dangerous(statement: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: StatementKind::Dangerous,
            reasons: vec![reason.into()],
            statement: statement.into(),
            tables: Vec::new(),
            system_catalog: false,
        }
    }

    fn escalate(&mut self, kind: StatementKind, reason: impl Into<String>) {
        self.kind = self.kind.max(kind);
        self.reasons.push(reason.into());
    }
}

/// Functions that reach outside the query: files, sessions, network, settings.
const DANGEROUS_FUNCTIONS: &[&str] = &[
    "pg_sleep",
    "pg_sleep_for",
    "pg_sleep_until",
    "pg_read_file",
    "pg_read_binary_file",
    "pg_ls_dir",
    "pg_stat_file",
    "pg_file_write",
    "pg_terminate_backend",
    "pg_cancel_backend",
    "pg_reload_conf",
    "pg_rotate_logfile",
    "pg_promote",
    "lo_import",
    "lo_export",
    "lo_unlink",
    "dblink",
    "dblink_exec",
    "dblink_connect",
    "load_extension",
    "set_config",
    "current_setting",
];

const SYSTEM_SCHEMAS: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "pg_toast",
    "sqlite_master",
    "sqlite_schema",
    "sqlite_temp_master",
    "sqlite_temp_schema",
];

fn dialect_for(database_type: DatabaseType) -> Box<dyn Dialect> {
    match database_type {
        DatabaseType::Postgres => Box::new(PostgreSqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Classify `sql` for the given backend dialect. Pure and deterministic.
pub fn classify(sql: &str, database_type: DatabaseType) -> Classification {
    if sql.trim().is_empty() {
        return Classification::dangerous("EMPTY", "empty statement");
    }

    let dialect = dialect_for(database_type);
    let tokens = match Tokenizer::new(dialect.as_ref(), sql).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            return Classification::dangerous("UNKNOWN", format!("unable to tokenize: {}", e));
        }
    };

    let scan = LexicalScan::run(&tokens);
    let parsed = Parser::parse_sql(dialect.as_ref(), sql);
    let tables = match &parsed {
        Ok(statements) => referenced_relations(statements),
        Err(_) => Vec::new(),
    };
    let system_catalog = scan.system_catalog || tables.iter().any(|t| is_system_relation(t));

    if !scan.reasons.is_empty() {
        return Classification {
            kind: StatementKind::Dangerous,
            reasons: scan.reasons,
            statement: scan.verb,
            tables,
            system_catalog,
        };
    }

    let statements = match parsed {
        Ok(statements) => statements,
        Err(e) => {
            return Classification::dangerous(scan.verb, format!("unable to parse statement: {}", e));
        }
    };
    let [statement] = statements.as_slice() else {
        let mut c = Classification::dangerous(scan.verb, "exactly one statement is required");
        c.tables = tables;
        c.system_catalog = system_catalog;
        return c;
    };

    let (kind, label) = statement_kind(statement);
    let mut classification = Classification {
        kind,
        reasons: Vec::new(),
        statement: label.to_string(),
        tables,
        system_catalog,
    };

    match kind {
        StatementKind::Read => {}
        StatementKind::Dangerous => classification
            .reasons
            .push(format!("{} statements are not permitted", label)),
        _ => classification
            .reasons
            .push(format!("{} is a {} statement", label, kind)),
    }

    if let Some(verb) = unconditional_mutation(statement) {
        classification.escalate(
            StatementKind::Dangerous,
            format!("{} without WHERE clause", verb),
        );
    }

    if classification.kind == StatementKind::Read {
        if scan.modifies_data {
            classification.escalate(
                StatementKind::Write,
                "query contains a data-modifying statement",
            );
        }
        if scan.select_into {
            classification.escalate(StatementKind::Ddl, "SELECT INTO creates a table");
        }
    }

    classification
}

/// Collects every relation named in a statement tree.
#[derive(Default)]
struct RelationCollector {
    names: BTreeSet<String>,
}

impl RelationCollector {
    fn insert(&mut self, name: &ObjectName) {
        let parts: Vec<String> = name
            .0
            .iter()
            .map(|part| match part.as_ident() {
                Some(ident) => ident.value.to_lowercase(),
                None => part.to_string().to_lowercase(),
            })
            .collect();
        self.names.insert(parts.join("."));
    }
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<()> {
        self.insert(relation);
        ControlFlow::Continue(())
    }

    // `DROP` names its objects outside any relation position.
    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<()> {
        if let Statement::Drop {
            object_type: ObjectType::Table | ObjectType::View | ObjectType::MaterializedView,
            names,
            ..
        } = statement
        {
            for name in names {
                self.insert(name);
            }
        }
        ControlFlow::Continue(())
    }
}

/// Lowercased relation names referenced anywhere in `statements`, sorted.
fn referenced_relations(statements: &[Statement]) -> Vec<String> {
    let mut collector = RelationCollector::default();
    for statement in statements {
        let _ = statement.visit(&mut collector);
    }
    collector.names.into_iter().collect()
}

/// `DELETE` or `UPDATE` lacking a `WHERE` clause, including under `EXPLAIN`.
fn unconditional_mutation(statement: &Statement) -> Option<&'static str> {
    match statement {
        Statement::Delete(delete) if delete.selection.is_none() => Some("DELETE"),
        Statement::Update(update) if update.selection.is_none() => Some("UPDATE"),
        Statement::Explain { statement, .. } => unconditional_mutation(statement),
        _ => None,
    }
}

/// Map a parsed statement to its kind and verb label.
fn statement_kind(statement: &Statement) -> (StatementKind, &'static str) {
    use StatementKind::*;

    match statement {
        Statement::Query(_) => (Read, "SELECT"),
        Statement::ShowTables { .. } => (Read, "SHOW TABLES"),
        Statement::ShowColumns { .. } => (Read, "SHOW COLUMNS"),
        Statement::ShowDatabases { .. } => (Read, "SHOW DATABASES"),
        Statement::ShowSchemas { .. } => (Read, "SHOW SCHEMAS"),
        Statement::ShowCreate { .. } => (Read, "SHOW CREATE"),
        Statement::ShowVariable { .. } => (Read, "SHOW"),
        Statement::ShowVariables { .. } => (Read, "SHOW VARIABLES"),
        Statement::ExplainTable { .. } => (Read, "EXPLAIN TABLE"),

        // EXPLAIN ANALYZE executes its statement, so it inherits the inner kind.
        Statement::Explain { statement, .. } => match statement_kind(statement) {
            (Read, _) => (Read, "EXPLAIN"),
            inner => inner,
        },

        Statement::Insert(_) => (Write, "INSERT"),
        Statement::Update { .. } => (Write, "UPDATE"),
        Statement::Delete(_) => (Write, "DELETE"),
        Statement::Merge { .. } => (Write, "MERGE"),

        Statement::CreateTable { .. } => (Ddl, "CREATE TABLE"),
        Statement::CreateView { .. } => (Ddl, "CREATE VIEW"),
        Statement::CreateIndex(_) => (Ddl, "CREATE INDEX"),
        Statement::CreateSchema { .. } => (Ddl, "CREATE SCHEMA"),
        Statement::CreateDatabase { .. } => (Ddl, "CREATE DATABASE"),
        Statement::CreateSequence { .. } => (Ddl, "CREATE SEQUENCE"),
        Statement::CreateType { .. } => (Ddl, "CREATE TYPE"),
        Statement::CreateVirtualTable { .. } => (Ddl, "CREATE VIRTUAL TABLE"),
        Statement::AlterTable { .. } => (Ddl, "ALTER TABLE"),
        Statement::AlterView { .. } => (Ddl, "ALTER VIEW"),
        Statement::AlterIndex { .. } => (Ddl, "ALTER INDEX"),
        Statement::AlterType { .. } => (Ddl, "ALTER TYPE"),
        Statement::Drop { .. } => (Ddl, "DROP"),
        Statement::Truncate { .. } => (Ddl, "TRUNCATE"),
        Statement::Comment { .. } => (Ddl, "COMMENT"),

        // Functions, triggers, extensions and roles run or grant code: dangerous.
        Statement::CreateFunction { .. } => (Dangerous, "CREATE FUNCTION"),
        Statement::CreateProcedure { .. } => (Dangerous, "CREATE PROCEDURE"),
        Statement::CreateTrigger { .. } => (Dangerous, "CREATE TRIGGER"),
        Statement::CreateExtension { .. } => (Dangerous, "CREATE EXTENSION"),
        Statement::CreateRole { .. } => (Dangerous, "CREATE ROLE"),
        Statement::AlterRole { .. } => (Dangerous, "ALTER ROLE"),
        Statement::StartTransaction { .. } => (Dangerous, "BEGIN"),
        Statement::Commit { .. } => (Dangerous, "COMMIT"),
        Statement::Rollback { .. } => (Dangerous, "ROLLBACK"),
        Statement::Savepoint { .. } => (Dangerous, "SAVEPOINT"),
        Statement::ReleaseSavepoint { .. } => (Dangerous, "RELEASE SAVEPOINT"),
        Statement::Copy { .. } => (Dangerous, "COPY"),
        Statement::Call { .. } => (Dangerous, "CALL"),
        Statement::Execute { .. } => (Dangerous, "EXECUTE"),
        Statement::Prepare { .. } => (Dangerous, "PREPARE"),
        Statement::Deallocate { .. } => (Dangerous, "DEALLOCATE"),
        Statement::Grant { .. } => (Dangerous, "GRANT"),
        Statement::Revoke { .. } => (Dangerous, "REVOKE"),
        Statement::Set(_) => (Dangerous, "SET"),
        Statement::Discard { .. } => (Dangerous, "DISCARD"),
        Statement::Vacuum { .. } => (Dangerous, "VACUUM"),
        Statement::Analyze { .. } => (Dangerous, "ANALYZE"),
        Statement::Pragma { .. } => (Dangerous, "PRAGMA"),
        Statement::AttachDatabase { .. } => (Dangerous, "ATTACH"),
        Statement::Load { .. } => (Dangerous, "LOAD"),
        Statement::LISTEN { .. } => (Dangerous, "LISTEN"),
        Statement::UNLISTEN { .. } => (Dangerous, "UNLISTEN"),
        Statement::NOTIFY { .. } => (Dangerous, "NOTIFY"),
        _ => (Dangerous, "UNKNOWN"),
    }
}

/// Token-level facts gathered before parsing.
#[derive(Debug, Default)]
struct LexicalScan {
    verb: String,
    reasons: Vec<String>,
    system_catalog: bool,
    modifies_data: bool,
    select_into: bool,
}

/// Lowercased word value, or `None` for non-word tokens.
fn word(token: &Token) -> Option<String> {
    match token {
        Token::Word(w) => Some(w.value.to_lowercase()),
        _ => None,
    }
}

/// Unquoted lowercased word value; quoted identifiers are never keywords.
fn keyword(token: &Token) -> Option<String> {
    match token {
        Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_lowercase()),
        _ => None,
    }
}

impl LexicalScan {
    fn run(tokens: &[Token]) -> Self {
        let mut scan = Self::default();
        let mut seen_comment = false;
        let mut seen_semicolon = false;
        let mut trailing_after_semicolon = false;
        let mut significant: Vec<&Token> = Vec::with_capacity(tokens.len());

        for token in tokens {
            match token {
                Token::Whitespace(Whitespace::SingleLineComment { .. })
                | Token::Whitespace(Whitespace::MultiLineComment(_)) => seen_comment = true,
                Token::Whitespace(_) | Token::EOF => {}
                Token::SemiColon if !seen_semicolon => seen_semicolon = true,
                _ => {
                    if seen_semicolon {
                        trailing_after_semicolon = true;
                    }
                    significant.push(token);
                }
            }
        }

        scan.verb = significant
            .iter()
            .find_map(|t| keyword(t))
            .map(|w| w.to_uppercase())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        if seen_comment {
            scan.reasons.push("comments are not permitted".to_string());
        }
        if trailing_after_semicolon {
            scan.reasons
                .push("multiple statements not permitted".to_string());
        }

        let mut dangerous_calls = BTreeSet::new();
        let mut has_copy = false;

        for (i, token) in significant.iter().enumerate() {
            let Some(value) = word(token) else {
                continue;
            };

            if DANGEROUS_FUNCTIONS.contains(&value.as_str()) {
                dangerous_calls.insert(value.clone());
            }
            if SYSTEM_SCHEMAS.contains(&value.as_str()) {
                scan.system_catalog = true;
            }

            let Some(kw) = keyword(token) else {
                continue;
            };
            match kw.as_str() {
                "copy" => has_copy = true,
                "program" if has_copy => {
                    scan.reasons
                        .push("COPY ... PROGRAM is not permitted".to_string());
                }
                "insert" | "update" | "delete" | "merge" if i > 0 => {
                    // `FOR UPDATE` / `DO UPDATE` lock or upsert inside their own statement kind.
                    let prev = keyword(significant[i - 1]);
                    if !matches!(prev.as_deref(), Some("for") | Some("do") | Some("no")) {
                        scan.modifies_data = true;
                    }
                }
                "into" => {
                    let prev = i.checked_sub(1).and_then(|p| keyword(significant[p]));
                    if !matches!(prev.as_deref(), Some("insert") | Some("merge")) {
                        scan.select_into = true;
                    }
                }
                _ => {}
            }
        }

        if !dangerous_calls.is_empty() {
            let names: Vec<String> = dangerous_calls.into_iter().collect();
            scan.reasons.push(format!(
                "dangerous function not permitted: {}",
                names.join(", ")
            ));
        }

        // `INSERT INTO` / `UPDATE` as the leading verb are the statement itself.
        if matches!(scan.verb.as_str(), "INSERT" | "UPDATE" | "DELETE" | "MERGE") {
            scan.modifies_data = false;
        }
        if scan.verb != "SELECT" && scan.verb != "WITH" {
            scan.select_into = false;
        }

        scan
    }
}

fn is_system_relation(name: &str) -> bool {
    name.split('.')
        .any(|part| SYSTEM_SCHEMAS.contains(&part) || part.starts_with("pg_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PG: DatabaseType = DatabaseType::Postgres;

    fn kind(sql: &str) -> StatementKind {
        classify(sql, PG).kind
    }

    #[test]
    fn test_plain_select_is_read() {
        let c = classify("SELECT id, name FROM users WHERE id = $1", PG);
        assert_eq!(c.kind, StatementKind::Read);
        assert_eq!(c.statement, "SELECT");
        assert_eq!(c.tables, vec!["users".to_string()]);
        assert!(c.reasons.is_empty());
        assert!(!c.system_catalog);
    }

    #[test]
    fn test_single_trailing_semicolon_allowed() {
        assert_eq!(kind("SELECT 1;"), StatementKind::Read);
    }

    #[test]
    fn test_write_statements() {
        assert_eq!(kind("INSERT INTO users (name) VALUES ('a')"), StatementKind::Write);
        assert_eq!(kind("UPDATE users SET name = 'b' WHERE id = 1"), StatementKind::Write);
        assert_eq!(kind("DELETE FROM users WHERE id = 1"), StatementKind::Write);
    }

    #[test]
    fn test_ddl_statements() {
        let c = classify("DROP TABLE users", PG);
        assert_eq!(c.kind, StatementKind::Ddl);
        assert!(c.reasons[0].contains("ddl"));
        assert_eq!(kind("CREATE TABLE t (id INT)"), StatementKind::Ddl);
        assert_eq!(kind("ALTER TABLE t ADD COLUMN x INT"), StatementKind::Ddl);
        assert_eq!(kind("TRUNCATE users"), StatementKind::Ddl);
    }

    #[test]
    fn test_stacked_statements_are_dangerous() {
        let c = classify("SELECT 1; DROP TABLE users", PG);
        assert_eq!(c.kind, StatementKind::Dangerous);
        assert!(
            c.reasons
                .iter()
                .any(|r| r.contains("multiple statements"))
        );
    }

    #[test]
    fn test_comments_are_dangerous() {
        assert_eq!(kind("SELECT 1 -- trailing"), StatementKind::Dangerous);
        assert_eq!(kind("SELECT /* hidden */ 1"), StatementKind::Dangerous);
    }

    #[test]
    fn test_comment_markers_inside_literals_are_ignored() {
        assert_eq!(kind("SELECT '-- not a comment; DROP TABLE x'"), StatementKind::Read);
        assert_eq!(kind("SELECT $$ /* body */ $$"), StatementKind::Read);
    }

    #[test]
    fn test_dangerous_functions() {
        let c = classify("SELECT pg_sleep(10)", PG);
        assert_eq!(c.kind, StatementKind::Dangerous);
        assert!(c.reasons[0].contains("pg_sleep"));
        assert_eq!(kind("SELECT pg_read_file('/etc/passwd')"), StatementKind::Dangerous);
        assert_eq!(kind("SELECT \"pg_sleep\"(1)"), StatementKind::Dangerous);
    }

    #[test]
    fn test_unconditional_delete_and_update_are_dangerous() {
        assert_eq!(kind("DELETE FROM users"), StatementKind::Dangerous);
        assert_eq!(kind("UPDATE users SET active = false"), StatementKind::Dangerous);
    }

    #[test]
    fn test_transaction_and_admin_are_dangerous() {
        assert_eq!(kind("BEGIN"), StatementKind::Dangerous);
        assert_eq!(kind("COMMIT"), StatementKind::Dangerous);
        assert_eq!(kind("GRANT SELECT ON users TO bob"), StatementKind::Dangerous);
        assert_eq!(kind("SET search_path TO evil"), StatementKind::Dangerous);
        assert_eq!(kind("COPY users TO PROGRAM 'sh'"), StatementKind::Dangerous);
    }

    #[test]
    fn test_unparseable_and_empty_are_dangerous() {
        assert_eq!(kind(""), StatementKind::Dangerous);
        assert_eq!(kind("   "), StatementKind::Dangerous);
        assert_eq!(kind("SELEKT * FRM users"), StatementKind::Dangerous);
    }

    #[test]
    fn test_data_modifying_cte_escalates_to_write() {
        let c = classify(
            "WITH moved AS (DELETE FROM users WHERE id = 1 RETURNING *) SELECT * FROM moved",
            PG,
        );
        assert!(c.kind >= StatementKind::Write);
    }

    #[test]
    fn test_select_into_escalates_to_ddl() {
        assert_eq!(kind("SELECT * INTO backup FROM users"), StatementKind::Ddl);
    }

    #[test]
    fn test_select_for_update_stays_read() {
        assert_eq!(
            kind("SELECT * FROM users WHERE id = 1 FOR UPDATE"),
            StatementKind::Read
        );
    }

    #[test]
    fn test_explain_inherits_inner_kind() {
        assert_eq!(kind("EXPLAIN SELECT * FROM users"), StatementKind::Read);
        assert_eq!(
            kind("EXPLAIN ANALYZE DELETE FROM users WHERE id = 1"),
            StatementKind::Write
        );
    }

    #[test]
    fn test_system_catalog_detection() {
        assert!(classify("SELECT * FROM information_schema.tables", PG).system_catalog);
        assert!(classify("SELECT * FROM pg_catalog.pg_class", PG).system_catalog);
        assert!(classify("SELECT usename FROM pg_shadow", PG).system_catalog);
        assert!(
            classify("SELECT name FROM sqlite_master", DatabaseType::SQLite).system_catalog
        );
        assert!(!classify("SELECT * FROM users", PG).system_catalog);
    }

    #[test]
    fn test_table_extraction() {
        let c = classify(
            "SELECT u.id FROM public.users AS u, items JOIN orders o ON o.user_id = u.id",
            PG,
        );
        assert_eq!(
            c.tables,
            vec![
                "items".to_string(),
                "orders".to_string(),
                "public.users".to_string()
            ]
        );
    }

    #[test]
    fn test_insert_column_list_keeps_table() {
        let c = classify("INSERT INTO audit (id, note) VALUES (1, 'x')", PG);
        assert_eq!(c.tables, vec!["audit".to_string()]);
        let c = classify("TRUNCATE TABLE sessions", PG);
        assert_eq!(c.tables, vec!["sessions".to_string()]);
    }

    #[test]
    fn test_explain_of_unconditional_delete_is_dangerous() {
        assert_eq!(kind("EXPLAIN ANALYZE DELETE FROM users"), StatementKind::Dangerous);
    }

    #[test]
    fn test_extract_from_is_not_a_table() {
        let c = classify("SELECT EXTRACT(YEAR FROM created_at) FROM events", PG);
        assert_eq!(c.tables, vec!["events".to_string()]);
    }

    #[test]
    fn test_relations_after_parenthesized_factors() {
        for sql in [
            "SELECT * FROM (SELECT 1) AS x, secrets",
            "SELECT * FROM generate_series(1, 2) g, secrets",
            "SELECT * FROM users AS u(a, b), secrets",
            "SELECT * FROM users WHERE id IN (SELECT user_id FROM secrets)",
            "SELECT * FROM users JOIN LATERAL (SELECT * FROM secrets) s ON true",
        ] {
            let c = classify(sql, PG);
            assert!(c.tables.contains(&"secrets".to_string()), "{}: {:?}", sql, c.tables);
        }
    }

    #[test]
    fn test_unqualified_pg_relation_after_subquery_is_system() {
        let c = classify("SELECT * FROM (SELECT 1) AS x, pg_stat_activity", PG);
        assert!(c.system_catalog);
        assert!(c.tables.contains(&"pg_stat_activity".to_string()));
    }

    #[test]
    fn test_drop_records_dropped_tables() {
        let c = classify("DROP TABLE IF EXISTS secrets, public.logs", PG);
        assert_eq!(c.tables, vec!["public.logs".to_string(), "secrets".to_string()]);
    }

    #[test]
    fn test_sqlite_dialect() {
        let c = classify("SELECT * FROM notes WHERE id = ?", DatabaseType::SQLite);
        assert_eq!(c.kind, StatementKind::Read);
        assert_eq!(kind("PRAGMA table_info(users)"), StatementKind::Dangerous);
    }

    #[test]
    fn test_classification_is_idempotent() {
        for sql in [
            "SELECT 1",
            "DROP TABLE users",
            "SELECT 1; SELECT 2",
            "DELETE FROM users",
            "garbage input",
        ] {
            assert_eq!(classify(sql, PG), classify(sql, PG));
        }
    }
}
