//! Canonical declaration of the `loans` table.
//!
//! The table shape is plain data. DDL is rendered from it by the functions
//! below, and `schema_sync` compares it against the live catalog.

use crate::domain::LoanStatus;

/// Table name.
pub const LOANS_TABLE: &str = "loans";

/// Name of the PostgreSQL enum type backing `loans.status`.
pub const STATUS_TYPE: &str = "loan_status";

/// Storage type of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    TimestampTz,
    LoanStatus,
    Numeric { precision: i32, scale: i32 },
}

impl ColumnType {
    /// Type as written in DDL.
    pub fn sql(&self) -> String {
        match self {
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::TimestampTz => "TIMESTAMPTZ".to_string(),
            ColumnType::LoanStatus => STATUS_TYPE.to_string(),
            ColumnType::Numeric { precision, scale } => format!("NUMERIC({precision},{scale})"),
        }
    }

    /// Whether a column reported by `information_schema.columns` already has this type.
    pub fn matches(&self, actual: &ColumnInfo) -> bool {
        match self {
            ColumnType::BigInt => actual.udt_name == "int8",
            ColumnType::TimestampTz => actual.udt_name == "timestamptz",
            ColumnType::LoanStatus => actual.udt_name == STATUS_TYPE,
            ColumnType::Numeric { precision, scale } => {
                actual.udt_name == "numeric"
                    && actual.numeric_precision == Some(*precision)
                    && actual.numeric_scale == Some(*scale)
            }
        }
    }
}

/// One declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Default expression, if any.
    pub default: Option<&'static str>,
    /// Values assigned by storage (`GENERATED BY DEFAULT AS IDENTITY`).
    pub identity: bool,
}

impl ColumnDef {
    const fn required(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
            default: None,
            identity: false,
        }
    }

    /// Column definition as used in `CREATE TABLE` / `ADD COLUMN`.
    pub fn sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.column_type.sql());
        if self.identity {
            sql.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        }
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }

    /// Whether the live default expression already matches the declared one.
    ///
    /// PostgreSQL reports defaults with an explicit cast (`'borrowed'::loan_status`),
    /// so a prefix match is enough.
    pub fn default_matches(&self, actual: Option<&str>) -> bool {
        match (self.default, actual) {
            (None, None) => true,
            (Some(declared), Some(actual)) => actual.starts_with(declared),
            _ => false,
        }
    }
}

/// Columns of `loans`, in declaration order. No audit timestamp columns.
pub static COLUMNS: [ColumnDef; 8] = [
    ColumnDef {
        name: "loan_id",
        column_type: ColumnType::BigInt,
        nullable: false,
        default: None,
        identity: true,
    },
    ColumnDef::required("book_id", ColumnType::BigInt),
    ColumnDef::required("user_id", ColumnType::BigInt),
    ColumnDef::required("borrow_date", ColumnType::TimestampTz),
    ColumnDef::required("due_date", ColumnType::TimestampTz),
    ColumnDef {
        name: "return_date",
        column_type: ColumnType::TimestampTz,
        nullable: true,
        default: None,
        identity: false,
    },
    ColumnDef {
        name: "status",
        column_type: ColumnType::LoanStatus,
        nullable: false,
        default: Some("'borrowed'"),
        identity: false,
    },
    ColumnDef {
        name: "fine_amount",
        column_type: ColumnType::Numeric {
            precision: 10,
            scale: 2,
        },
        nullable: false,
        default: Some("0.00"),
        identity: false,
    },
];

/// Primary key column.
pub const PRIMARY_KEY: &str = "loan_id";

/// A named table constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintDef {
    pub name: &'static str,
    pub definition: &'static str,
}

/// Foreign keys into the external catalogs and the record invariants.
pub static CONSTRAINTS: [ConstraintDef; 6] = [
    ConstraintDef {
        name: "loans_book_id_fkey",
        definition: "FOREIGN KEY (book_id) REFERENCES books (book_id)",
    },
    ConstraintDef {
        name: "loans_user_id_fkey",
        definition: "FOREIGN KEY (user_id) REFERENCES users (user_id)",
    },
    ConstraintDef {
        name: "loans_fine_amount_non_negative",
        definition: "CHECK (fine_amount >= 0)",
    },
    ConstraintDef {
        name: "loans_due_after_borrow",
        definition: "CHECK (due_date >= borrow_date)",
    },
    ConstraintDef {
        name: "loans_return_after_borrow",
        definition: "CHECK (return_date IS NULL OR return_date >= borrow_date)",
    },
    ConstraintDef {
        name: "loans_return_matches_status",
        definition: "CHECK ((return_date IS NULL) = (status <> 'returned'))",
    },
];

/// Whether a definition from `pg_get_constraintdef` is the declared one.
///
/// PostgreSQL re-renders expressions with extra parentheses and casts
/// (`CHECK ((fine_amount >= (0)::numeric))`), so both sides are reduced to
/// a canonical form first.
pub fn constraint_definition_matches(declared: &str, actual: &str) -> bool {
    canonical_definition(declared) == canonical_definition(actual)
}

fn canonical_definition(definition: &str) -> String {
    let mut out = String::with_capacity(definition.len());
    let mut chars = definition.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' | ')' => {}
            c if c.is_whitespace() => {}
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                while chars
                    .peek()
                    .is_some_and(|next| next.is_alphanumeric() || *next == '_')
                {
                    chars.next();
                }
            }
            c => out.extend(c.to_lowercase()),
        }
    }
    out
}

/// A secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub columns: &'static str,
}

pub static INDEXES: [IndexDef; 3] = [
    // overdue sweep
    IndexDef {
        name: "idx_loans_status_due_date",
        columns: "status, due_date",
    },
    IndexDef {
        name: "idx_loans_user_id",
        columns: "user_id",
    },
    IndexDef {
        name: "idx_loans_book_id",
        columns: "book_id",
    },
];

/// A column as it currently exists in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub udt_name: String,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub nullable: bool,
    pub default: Option<String>,
    pub identity: bool,
}

impl ColumnInfo {
    /// Whether storage assigns values for this column (identity or serial).
    pub fn is_generated(&self) -> bool {
        self.identity
            || self
                .default
                .as_deref()
                .is_some_and(|default| default.starts_with("nextval("))
    }
}

pub fn declared_column(name: &str) -> Option<&'static ColumnDef> {
    COLUMNS.iter().find(|column| column.name == name)
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn create_status_type_sql() -> String {
    let labels: Vec<String> = LoanStatus::ALL
        .iter()
        .map(|status| quote_literal(status.as_str()))
        .collect();
    format!("CREATE TYPE {STATUS_TYPE} AS ENUM ({})", labels.join(", "))
}

pub fn add_status_value_sql(status: LoanStatus) -> String {
    format!(
        "ALTER TYPE {STATUS_TYPE} ADD VALUE IF NOT EXISTS {}",
        quote_literal(status.as_str())
    )
}

pub fn create_table_sql() -> String {
    let mut parts: Vec<String> = COLUMNS.iter().map(ColumnDef::sql).collect();
    parts.push(format!("CONSTRAINT loans_pkey PRIMARY KEY ({PRIMARY_KEY})"));
    parts.extend(
        CONSTRAINTS
            .iter()
            .map(|constraint| format!("CONSTRAINT {} {}", constraint.name, constraint.definition)),
    );
    format!("CREATE TABLE {LOANS_TABLE} (\n    {}\n)", parts.join(",\n    "))
}

pub fn add_column_sql(column: &ColumnDef) -> String {
    format!("ALTER TABLE {LOANS_TABLE} ADD COLUMN IF NOT EXISTS {}", column.sql())
}

/// Type conversion in place.
///
/// Enum columns go through `text`: PostgreSQL has no cast between two enum
/// types (for example a legacy `enum_loans_status`).
pub fn alter_column_type_sql(column: &ColumnDef) -> String {
    let sql_type = column.column_type.sql();
    let using = match column.column_type {
        ColumnType::LoanStatus => format!("{}::text::{sql_type}", column.name),
        _ => format!("{}::{sql_type}", column.name),
    };
    format!(
        "ALTER TABLE {LOANS_TABLE} ALTER COLUMN {} TYPE {sql_type} USING {using}",
        column.name
    )
}

pub fn alter_nullability_sql(column: &ColumnDef) -> String {
    let action = if column.nullable {
        "DROP NOT NULL"
    } else {
        "SET NOT NULL"
    };
    format!("ALTER TABLE {LOANS_TABLE} ALTER COLUMN {} {action}", column.name)
}

pub fn alter_default_sql(column: &ColumnDef) -> String {
    match column.default {
        Some(default) => format!(
            "ALTER TABLE {LOANS_TABLE} ALTER COLUMN {} SET DEFAULT {default}",
            column.name
        ),
        None => format!(
            "ALTER TABLE {LOANS_TABLE} ALTER COLUMN {} DROP DEFAULT",
            column.name
        ),
    }
}

pub fn drop_default_sql(column: &ColumnDef) -> String {
    format!(
        "ALTER TABLE {LOANS_TABLE} ALTER COLUMN {} DROP DEFAULT",
        column.name
    )
}

pub fn add_primary_key_sql() -> String {
    format!("ALTER TABLE {LOANS_TABLE} ADD CONSTRAINT loans_pkey PRIMARY KEY ({PRIMARY_KEY})")
}

pub fn add_constraint_sql(constraint: &ConstraintDef) -> String {
    format!(
        "ALTER TABLE {LOANS_TABLE} ADD CONSTRAINT {} {}",
        constraint.name, constraint.definition
    )
}

pub fn create_index_sql(index: &IndexDef) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {LOANS_TABLE} ({})",
        index.name, index.columns
    )
}
