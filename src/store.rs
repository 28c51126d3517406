use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use duckdb::{Connection, params_from_iter};

use crate::table::{TableName, quote_ident};

pub const NPI_COLUMN: &str = "TargetList_HCP_NPI_ID";

/// Enriched field name -> destination column.
const FIELD_COLUMNS: &[(&str, &str)] = &[
    ("first_name", "TargetList_FirstName"),
    ("middle_name", "TargetList_MiddleName"),
    ("last_name", "TargetList_LastName"),
    ("primary_specialty", "TargetList_PrimarySpecialty"),
    ("contact_type", "TargetList_ContactType"),
    ("addr1", "TargetList_AddressLine1"),
    ("addr2", "TargetList_AddressLine2"),
    ("city", "TargetList_City"),
    ("state", "TargetList_State"),
    ("zip", "TargetList_ZIP"),
];

/// A row needs enrichment when any of these is null.
const TRACKED_COLUMNS: &[&str] = &[
    "TargetList_FirstName",
    "TargetList_LastName",
    "TargetList_PrimarySpecialty",
    "TargetList_ContactType",
    "TargetList_AddressLine1",
    "TargetList_City",
    "TargetList_State",
    "TargetList_ZIP",
];

pub fn column_for_field(field: &str) -> Option<&'static str> {
    FIELD_COLUMNS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, column)| *column)
}

pub fn open_database(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(anyhow!("DuckDB database not found at {}", path.display()));
    }
    Connection::open(path).with_context(|| format!("open duckdb at {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// Statement ran; `rows` is how many destination rows matched the NPI.
    Updated { columns: usize, rows: usize },
    /// Nothing in the field map maps to a column.
    NoColumns,
    /// Statement failed; the batch carries on without it.
    Failed(String),
}

#[derive(Debug, Clone)]
struct FillStatement {
    npi: String,
    sql: String,
    params: Vec<String>,
    columns: usize,
}

/// Fill-if-null writer over one connection.
///
/// DuckDB refuses further statements in a transaction once one has failed,
/// so successful updates of the open batch are journaled and replayed after
/// a rollback. A single commit still finalizes the whole batch.
pub struct DuckDbStore<'c> {
    conn: &'c mut Connection,
    in_batch: bool,
    journal: Vec<FillStatement>,
}

impl<'c> DuckDbStore<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self {
            conn,
            in_batch: false,
            journal: Vec::new(),
        }
    }

    pub fn candidate_npis(&mut self, source: &TableName) -> Result<Vec<String>> {
        let npi = quote_ident(NPI_COLUMN);
        let any_null = TRACKED_COLUMNS
            .iter()
            .map(|c| format!("{} IS NULL", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT TRIM(CAST({npi} AS VARCHAR)) FROM {} WHERE {npi} IS NOT NULL AND ({any_null})",
            source.quoted()
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Failed preparing candidate query for {source}"))?;
        let rows = stmt
            .query_map([], |row| row.get::<usize, Option<String>>(0))
            .with_context(|| format!("Failed running candidate query for {source}"))?;

        let mut npis = Vec::new();
        for row in rows {
            let value = row.context("Failed reading candidate NPI row")?;
            if let Some(npi) = value.filter(|v| !v.is_empty()) {
                npis.push(npi);
            }
        }
        Ok(npis)
    }

    pub fn begin_batch(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN TRANSACTION")
            .context("Failed starting enrichment transaction")?;
        self.in_batch = true;
        self.journal.clear();
        Ok(())
    }

    /// Sets each mapped column to its new value only where it is currently
    /// null. Rows are matched on the trimmed NPI, the same key the candidate
    /// scan returns. Unknown field names are ignored. `Err` is reserved for losing
    /// the batch transaction itself.
    pub fn fill_empty(
        &mut self,
        destination: &TableName,
        npi: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<FillOutcome> {
        let Some(statement) = build_fill_statement(destination, npi, fields) else {
            return Ok(FillOutcome::NoColumns);
        };

        match self
            .conn
            .execute(&statement.sql, params_from_iter(statement.params.iter()))
        {
            Ok(rows) => {
                let columns = statement.columns;
                if self.in_batch {
                    self.journal.push(statement);
                }
                Ok(FillOutcome::Updated { columns, rows })
            }
            Err(err) => {
                tracing::warn!(npi = %npi, table = %destination, error = %err, "Failed to update record");
                if self.in_batch {
                    // losing the transaction itself is batch-fatal
                    self.restore_batch()?;
                }
                Ok(FillOutcome::Failed(err.to_string()))
            }
        }
    }

    pub fn commit_batch(&mut self) -> Result<()> {
        if !self.in_batch {
            return Ok(());
        }
        self.in_batch = false;
        self.journal.clear();
        self.conn
            .execute_batch("COMMIT")
            .context("Failed committing enrichment transaction")
    }

    fn restore_batch(&mut self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .context("Failed rolling back enrichment transaction")?;
        self.in_batch = false;
        self.conn
            .execute_batch("BEGIN TRANSACTION")
            .context("Failed restarting enrichment transaction")?;
        self.in_batch = true;

        for statement in &self.journal {
            self.conn
                .execute(&statement.sql, params_from_iter(statement.params.iter()))
                .with_context(|| format!("Failed replaying update for NPI {}", statement.npi))?;
        }
        tracing::debug!(replayed = self.journal.len(), "Restored enrichment transaction");
        Ok(())
    }
}

impl Drop for DuckDbStore<'_> {
    fn drop(&mut self) {
        if self.in_batch {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %err, "Failed rolling back abandoned enrichment batch");
            }
        }
    }
}

fn build_fill_statement(
    destination: &TableName,
    npi: &str,
    fields: &BTreeMap<String, String>,
) -> Option<FillStatement> {
    let mut set_clauses = Vec::new();
    let mut params = Vec::new();
    for (field, value) in fields {
        let Some(column) = column_for_field(field) else {
            continue;
        };
        let column = quote_ident(column);
        set_clauses.push(format!("{column} = COALESCE({column}, ?)"));
        params.push(value.clone());
    }

    if set_clauses.is_empty() {
        return None;
    }

    let columns = set_clauses.len();
    params.push(npi.to_string());
    let sql = format!(
        "UPDATE {} SET {} WHERE TRIM(CAST({} AS VARCHAR)) = ?",
        destination.quoted(),
        set_clauses.join(", "),
        quote_ident(NPI_COLUMN)
    );
    Some(FillStatement {
        npi: npi.to_string(),
        sql,
        params,
        columns,
    })
}
