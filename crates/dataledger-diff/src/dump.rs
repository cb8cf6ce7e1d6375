// SPDX-License-Identifier: Apache-2.0

//! Canonical textual rendering of a SQLite file: schema objects ordered by
//! name, then each table's rows ordered by every column. Two dumps of
//! byte-identical databases are identical, and row order never depends on
//! insertion order.

use crate::DiffError;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::Path;

pub(crate) fn canonical_dump(path: &Path) -> Result<Vec<String>, DiffError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| DiffError(format!("cannot open '{}': {e}", path.display())))?;

    let mut lines = Vec::new();

    let mut schema_stmt = conn
        .prepare(
            "SELECT name, sql FROM sqlite_master \
             WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%' \
             ORDER BY type DESC, name",
        )
        .map_err(|e| DiffError(e.to_string()))?;
    let schema_rows = schema_stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| DiffError(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DiffError(e.to_string()))?;
    for (_, sql) in &schema_rows {
        lines.push(format!("{};", sql.trim()));
    }

    let mut table_stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .map_err(|e| DiffError(e.to_string()))?;
    let tables = table_stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| DiffError(e.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DiffError(e.to_string()))?;

    for table in tables {
        dump_table_rows(&conn, &table, &mut lines)?;
    }
    Ok(lines)
}

fn dump_table_rows(
    conn: &Connection,
    table: &str,
    lines: &mut Vec<String>,
) -> Result<(), DiffError> {
    let quoted = quote_identifier(table);
    let mut probe = conn
        .prepare(&format!("SELECT * FROM {quoted} LIMIT 0"))
        .map_err(|e| DiffError(format!("table '{table}': {e}")))?;
    let column_count = probe.column_count();
    drop(probe);
    if column_count == 0 {
        return Ok(());
    }

    let order_by = (1..=column_count)
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {quoted} ORDER BY {order_by}"))
        .map_err(|e| DiffError(format!("table '{table}': {e}")))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| DiffError(format!("table '{table}': {e}")))?;
    while let Some(row) = rows.next().map_err(|e| DiffError(e.to_string()))? {
        let mut rendered = Vec::with_capacity(column_count);
        for index in 0..column_count {
            let value = row
                .get_ref(index)
                .map_err(|e| DiffError(format!("table '{table}': {e}")))?;
            rendered.push(render_value(value));
        }
        lines.push(format!("INSERT INTO {quoted} VALUES({});", rendered.join(",")));
    }
    Ok(())
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(r) => {
            if r.fract() == 0.0 && r.is_finite() {
                format!("{r:.1}")
            } else {
                r.to_string()
            }
        }
        ValueRef::Text(text) => {
            let text = String::from_utf8_lossy(text);
            format!("'{}'", text.replace('\'', "''"))
        }
        ValueRef::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!("X'{hex}'")
        }
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Multiset difference between two canonical dumps, preserving each side's
/// dump order: lines over-represented in `old` are removals, lines
/// over-represented in `new` are additions.
pub(crate) fn line_difference(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let mut balance: BTreeMap<&str, i64> = BTreeMap::new();
    for line in old {
        *balance.entry(line.as_str()).or_default() += 1;
    }
    for line in new {
        *balance.entry(line.as_str()).or_default() -= 1;
    }

    let mut removed_budget: BTreeMap<&str, i64> = balance
        .iter()
        .filter(|(_, surplus)| **surplus > 0)
        .map(|(line, surplus)| (*line, *surplus))
        .collect();
    let mut added_budget: BTreeMap<&str, i64> = balance
        .iter()
        .filter(|(_, surplus)| **surplus < 0)
        .map(|(line, surplus)| (*line, -*surplus))
        .collect();

    let mut removed = Vec::new();
    for line in old {
        if let Some(budget) = removed_budget.get_mut(line.as_str()) {
            if *budget > 0 {
                *budget -= 1;
                removed.push(line.clone());
            }
        }
    }
    let mut added = Vec::new();
    for line in new {
        if let Some(budget) = added_budget.get_mut(line.as_str()) {
            if *budget > 0 {
                *budget -= 1;
                added.push(line.clone());
            }
        }
    }
    (removed, added)
}
