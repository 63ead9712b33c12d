use anyhow::Result;
use rusqlite::Connection;

/// Column definition for schema management.
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub not_null: bool,
    pub primary_key: bool,
    pub default_val: Option<&'static str>,
}

/// Table definition for schema management.
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

/// Index created alongside a table.
pub struct IndexDef {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static str,
}

/// Ensure table exists with all defined columns.
///
/// - If table doesn't exist, CREATE TABLE with all columns.
/// - If table exists but missing columns, ALTER TABLE ADD COLUMN.
pub fn ensure_table(conn: &Connection, table: &TableDef) -> Result<()> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE name = ?1 AND type = 'table'",
        [table.name],
        |row| row.get(0),
    )?;

    if !table_exists {
        let mut sql = format!("CREATE TABLE [{}] (", table.name);
        let mut pk_columns = Vec::new();

        for (i, col) in table.columns.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(&column_sql(col));
            if col.primary_key {
                pk_columns.push(col.name);
            }
        }

        if !pk_columns.is_empty() {
            sql.push_str(&format!(",PRIMARY KEY({})", pk_columns.join(",")));
        }
        sql.push_str(");");

        conn.execute_batch(&sql)?;
        log::debug!("created table {}", table.name);
    } else {
        let mut existing: Vec<String> = Vec::new();
        let mut stmt = conn.prepare(&format!("PRAGMA table_info('{}')", table.name))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for name in rows {
            existing.push(name?);
        }

        for col in table.columns {
            if !existing.iter().any(|e| e == col.name) {
                conn.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    table.name,
                    column_sql(col)
                ))?;
                log::info!("added column {}.{}", table.name, col.name);
            }
        }
    }

    Ok(())
}

pub fn ensure_index(conn: &Connection, index: &IndexDef) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON {}({});",
        index.name, index.table, index.columns
    ))?;
    Ok(())
}

fn column_sql(col: &ColumnDef) -> String {
    let mut sql = format!("[{}] {}", col.name, col.sql_type);
    if col.not_null {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = col.default_val {
        sql.push_str(&format!(" DEFAULT {default}"));
    }
    sql
}

const fn column(
    name: &'static str,
    sql_type: &'static str,
    default_val: Option<&'static str>,
) -> ColumnDef {
    ColumnDef {
        name,
        sql_type,
        not_null: true,
        primary_key: false,
        default_val,
    }
}

const fn key_column(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        sql_type: "TEXT",
        not_null: true,
        primary_key: true,
        default_val: None,
    }
}

// ============================================================
// Table definitions
// ============================================================

pub static STREAM_TABLE: TableDef = TableDef {
    name: "stream",
    columns: &[
        key_column("id"),
        column("counterparty_id", "TEXT", None),
        column("price", "INTEGER", Some("0")),
        column("delay", "INTEGER", Some("0")),
        column("total_parts", "INTEGER", Some("0")),
        column("parts_paid", "INTEGER", Some("0")),
        column("fee", "INTEGER", Some("0")),
        column("memo", "TEXT", Some("''")),
        column("name", "TEXT", Some("''")),
        column("created_at", "INTEGER", Some("0")),
        column("status", "TEXT", Some("'paused'")),
    ],
};

pub static STREAM_PART_TABLE: TableDef = TableDef {
    name: "stream_part",
    columns: &[
        key_column("payment_hash"),
        column("stream_id", "TEXT", None),
    ],
};

pub static STREAM_INDEXES: &[IndexDef] = &[
    IndexDef {
        name: "idx_stream_status",
        table: "stream",
        columns: "status",
    },
    IndexDef {
        name: "idx_stream_part_stream_id",
        table: "stream_part",
        columns: "stream_id",
    },
];
