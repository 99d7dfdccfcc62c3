use sqlx::{PgConnection, PgPool, Row};
use thiserror::Error;

use super::schema::{
    self, COLUMNS, CONSTRAINTS, ColumnInfo, INDEXES, LOANS_TABLE, STATUS_TYPE,
};
use crate::domain::LoanStatus;

/// Advisory lock key serializing schema sync across processes.
const SCHEMA_LOCK_KEY: i64 = 0x6c6f_616e_7321;

/// Errors from `ensure_loan_schema`.
///
/// Any of these leaves the database untouched: the whole sync runs in one
/// transaction.
#[derive(Debug, Error)]
pub enum SchemaSyncError {
    /// Connection or catalog query failure.
    #[error("loan schema sync failed")]
    Database(#[from] sqlx::Error),

    /// An alteration was rejected by the database (for example `SET NOT NULL`
    /// over existing nulls, or a CHECK constraint violated by stored rows).
    #[error("loan schema sync failed while running `{statement}`")]
    Statement {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    /// The live structure cannot be converged without destroying data.
    #[error("column {column} cannot be converged: {reason}")]
    Incompatible { column: String, reason: String },
}

/// What a sync run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSyncReport {
    pub created_status_type: bool,
    pub added_status_values: Vec<String>,
    pub created_table: bool,
    pub added_columns: Vec<String>,
    pub altered_columns: Vec<String>,
    pub added_constraints: Vec<String>,
    pub created_indexes: Vec<String>,
    /// Columns present in the table but not declared. Left untouched.
    pub unknown_columns: Vec<String>,
    /// Declared constraints whose existing definition differs. Left untouched.
    pub mismatched_constraints: Vec<String>,
}

impl SchemaSyncReport {
    /// True when the run made no structural change.
    ///
    /// Unknown columns and mismatched constraints are reported but never
    /// changed, so they do not count.
    pub fn is_noop(&self) -> bool {
        !self.created_status_type
            && self.added_status_values.is_empty()
            && !self.created_table
            && self.added_columns.is_empty()
            && self.altered_columns.is_empty()
            && self.added_constraints.is_empty()
            && self.created_indexes.is_empty()
    }
}

/// Ensure the `loans` table matches the declared schema.
///
/// Idempotent. Existing structure is altered in place: missing pieces are
/// added, column types, nullability and defaults are converged. Nothing is
/// dropped. Runs inside a single transaction holding a transaction-scoped
/// advisory lock, so concurrent callers serialize and a failure applies
/// nothing.
pub async fn ensure_loan_schema(pool: &PgPool) -> Result<SchemaSyncReport, SchemaSyncError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    let mut report = SchemaSyncReport::default();

    sync_status_type(&mut tx, &mut report).await?;

    if table_exists(&mut tx).await? {
        sync_columns(&mut tx, &mut report).await?;
        sync_constraints(&mut tx, &mut report).await?;
    } else {
        execute(&mut tx, &schema::create_table_sql()).await?;
        report.created_table = true;
    }

    sync_indexes(&mut tx, &mut report).await?;

    tx.commit().await?;

    if report.is_noop() {
        tracing::info!("Loan schema already up to date");
    } else {
        tracing::info!(
            created_table = report.created_table,
            added_columns = ?report.added_columns,
            altered_columns = ?report.altered_columns,
            added_constraints = ?report.added_constraints,
            created_indexes = ?report.created_indexes,
            "Loan schema synchronized"
        );
    }

    Ok(report)
}

async fn execute(conn: &mut PgConnection, statement: &str) -> Result<(), SchemaSyncError> {
    tracing::debug!(statement, "Applying loan schema change");
    sqlx::query(statement)
        .execute(&mut *conn)
        .await
        .map_err(|source| SchemaSyncError::Statement {
            statement: statement.to_string(),
            source,
        })?;
    Ok(())
}

async fn sync_status_type(
    conn: &mut PgConnection,
    report: &mut SchemaSyncReport,
) -> Result<(), SchemaSyncError> {
    let kind: Option<String> = sqlx::query_scalar(
        r#"
        SELECT t.typtype::text
        FROM pg_type t
        JOIN pg_namespace n ON n.oid = t.typnamespace
        WHERE t.typname = $1 AND n.nspname = current_schema()
        "#,
    )
    .bind(STATUS_TYPE)
    .fetch_optional(&mut *conn)
    .await?;

    match kind.as_deref() {
        None => {
            execute(conn, &schema::create_status_type_sql()).await?;
            report.created_status_type = true;
        }
        Some("e") => {
            let labels: Vec<String> = sqlx::query_scalar(
                r#"
                SELECT e.enumlabel::text
                FROM pg_enum e
                JOIN pg_type t ON t.oid = e.enumtypid
                JOIN pg_namespace n ON n.oid = t.typnamespace
                WHERE t.typname = $1 AND n.nspname = current_schema()
                ORDER BY e.enumsortorder
                "#,
            )
            .bind(STATUS_TYPE)
            .fetch_all(&mut *conn)
            .await?;

            for status in LoanStatus::ALL {
                if !labels.iter().any(|label| label == status.as_str()) {
                    execute(conn, &schema::add_status_value_sql(status)).await?;
                    report.added_status_values.push(status.as_str().to_string());
                }
            }

            // Extra labels are kept: removing an enum value is destructive.
            for label in labels
                .iter()
                .filter(|label| label.parse::<LoanStatus>().is_err())
            {
                tracing::warn!(label = %label, "Undeclared loan_status value; leaving it in place");
            }
        }
        Some(_) => {
            return Err(SchemaSyncError::Incompatible {
                column: "status".to_string(),
                reason: format!("type {STATUS_TYPE} exists but is not an enum"),
            });
        }
    }

    Ok(())
}

async fn table_exists(conn: &mut PgConnection) -> Result<bool, SchemaSyncError> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = $1
        )
        "#,
    )
    .bind(LOANS_TABLE)
    .fetch_one(&mut *conn)
    .await?;

    Ok(exists)
}

async fn load_columns(conn: &mut PgConnection) -> Result<Vec<ColumnInfo>, SchemaSyncError> {
    let rows = sqlx::query(
        r#"
        SELECT
            column_name::text AS name,
            udt_name::text AS udt_name,
            numeric_precision::int4 AS numeric_precision,
            numeric_scale::int4 AS numeric_scale,
            is_nullable::text AS is_nullable,
            column_default::text AS column_default,
            is_identity::text AS is_identity
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1
        ORDER BY ordinal_position
        "#,
    )
    .bind(LOANS_TABLE)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let is_nullable: String = row.try_get("is_nullable")?;
            let is_identity: String = row.try_get("is_identity")?;
            Ok(ColumnInfo {
                name: row.try_get("name")?,
                udt_name: row.try_get("udt_name")?,
                numeric_precision: row.try_get("numeric_precision")?,
                numeric_scale: row.try_get("numeric_scale")?,
                nullable: is_nullable == "YES",
                default: row.try_get("column_default")?,
                identity: is_identity == "YES",
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(SchemaSyncError::from)
}

async fn sync_columns(
    conn: &mut PgConnection,
    report: &mut SchemaSyncReport,
) -> Result<(), SchemaSyncError> {
    let existing = load_columns(conn).await?;

    for declared in COLUMNS.iter() {
        let Some(actual) = existing.iter().find(|column| column.name == declared.name) else {
            execute(conn, &schema::add_column_sql(declared)).await?;
            report.added_columns.push(declared.name.to_string());
            continue;
        };

        if declared.identity && !actual.is_generated() {
            return Err(SchemaSyncError::Incompatible {
                column: declared.name.to_string(),
                reason: "existing column has no identity or sequence default".to_string(),
            });
        }

        let mut actual_default = actual.default.clone();
        let mut altered = false;

        if !declared.column_type.matches(actual) {
            // A default of the old type blocks the conversion.
            if actual_default.is_some() && !declared.identity {
                execute(conn, &schema::drop_default_sql(declared)).await?;
                actual_default = None;
            }
            execute(conn, &schema::alter_column_type_sql(declared)).await?;
            altered = true;
        }

        if actual.nullable != declared.nullable {
            execute(conn, &schema::alter_nullability_sql(declared)).await?;
            altered = true;
        }

        if !declared.identity && !declared.default_matches(actual_default.as_deref()) {
            execute(conn, &schema::alter_default_sql(declared)).await?;
            altered = true;
        }

        if altered {
            report.altered_columns.push(declared.name.to_string());
        }
    }

    for unknown in existing
        .iter()
        .filter(|column| schema::declared_column(&column.name).is_none())
    {
        tracing::warn!(column = %unknown.name, "Undeclared column in loans; leaving it in place");
        report.unknown_columns.push(unknown.name.clone());
    }

    Ok(())
}

async fn sync_constraints(
    conn: &mut PgConnection,
    report: &mut SchemaSyncReport,
) -> Result<(), SchemaSyncError> {
    let rows = sqlx::query(
        r#"
        SELECT
            conname::text AS name,
            contype::text AS kind,
            pg_get_constraintdef(oid) AS definition
        FROM pg_constraint
        WHERE conrelid = $1::text::regclass
        "#,
    )
    .bind(LOANS_TABLE)
    .fetch_all(&mut *conn)
    .await?;

    let mut existing = Vec::with_capacity(rows.len());
    let mut has_primary_key = false;
    for row in &rows {
        let name: String = row.try_get("name")?;
        let kind: String = row.try_get("kind")?;
        let definition: String = row.try_get("definition")?;
        has_primary_key |= kind == "p";
        existing.push((name, definition));
    }

    if !has_primary_key {
        execute(conn, &schema::add_primary_key_sql()).await?;
        report.added_constraints.push("loans_pkey".to_string());
    }

    for constraint in CONSTRAINTS.iter() {
        match existing.iter().find(|(name, _)| name == constraint.name) {
            None => {
                execute(conn, &schema::add_constraint_sql(constraint)).await?;
                report.added_constraints.push(constraint.name.to_string());
            }
            Some((_, definition))
                if !schema::constraint_definition_matches(constraint.definition, definition) =>
            {
                tracing::warn!(
                    constraint = constraint.name,
                    expected = constraint.definition,
                    actual = %definition,
                    "Constraint on loans differs from its declaration; leaving it in place"
                );
                report.mismatched_constraints.push(constraint.name.to_string());
            }
            Some(_) => {}
        }
    }

    Ok(())
}

async fn sync_indexes(
    conn: &mut PgConnection,
    report: &mut SchemaSyncReport,
) -> Result<(), SchemaSyncError> {
    let existing: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT indexname::text
        FROM pg_indexes
        WHERE schemaname = current_schema() AND tablename = $1
        "#,
    )
    .bind(LOANS_TABLE)
    .fetch_all(&mut *conn)
    .await?;

    for index in INDEXES.iter() {
        if !existing.iter().any(|name| name == index.name) {
            execute(conn, &schema::create_index_sql(index)).await?;
            report.created_indexes.push(index.name.to_string());
        }
    }

    Ok(())
}
