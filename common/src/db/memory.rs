//! In-memory SQL backend for tests.
//!
//! Understands exactly the statement shapes the pipeline and the gateway
//! emit: `CREATE TABLE IF NOT EXISTS` (auto-increment, NOT NULL, unique and
//! foreign keys), `SET FOREIGN_KEY_CHECKS`, `TRUNCATE TABLE`, single-row
//! parameterised `INSERT`, and `SELECT [DISTINCT] cols FROM t [ORDER BY c
//! [ASC|DESC]] [LIMIT n]`. Uniqueness, NOT NULL and foreign keys are
//! enforced the way InnoDB reports them, including the refusal to truncate a
//! referenced table while checks are on.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{ResultSet, SqlConnection, SqlValue};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct Column {
    name: String,
    auto_increment: bool,
    unique: bool,
    not_null: bool,
}

#[derive(Debug, Clone)]
struct ForeignKey {
    column: String,
    references_table: String,
    references_column: String,
}

#[derive(Debug, Clone)]
struct Table {
    name: String,
    columns: Vec<Column>,
    rows: Vec<Vec<SqlValue>>,
    next_id: i64,
    foreign_keys: Vec<ForeignKey>,
}

impl Table {
    fn column_index(&self, name: &str) -> Option<usize> {
        let name = unquote(name);
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn unknown_column(&self, name: &str) -> Error {
        Error::Execution(format!(
            "Unknown column '{}' in '{}'",
            unquote(name),
            self.name
        ))
    }
}

struct Database {
    tables: BTreeMap<String, Table>,
    foreign_key_checks: bool,
    statements: Vec<String>,
    failures: Vec<String>,
    connected: bool,
}

enum Outcome {
    Affected(u64),
    Rows(ResultSet),
}

/// A session against an in-memory database.
pub struct MemoryConnection {
    name: String,
    state: Mutex<Database>,
}

impl MemoryConnection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(Database {
                tables: BTreeMap::new(),
                foreign_key_checks: true,
                statements: Vec::new(),
                failures: Vec::new(),
                connected: true,
            }),
        }
    }

    /// Seeds a plain table (no keys, no constraints) with rows.
    pub fn with_table(self, name: &str, columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        {
            let mut db = self.lock();
            db.tables.insert(
                name.to_string(),
                Table {
                    name: name.to_string(),
                    columns: columns
                        .iter()
                        .map(|c| Column {
                            name: c.to_string(),
                            auto_increment: false,
                            unique: false,
                            not_null: false,
                        })
                        .collect(),
                    rows,
                    next_id: 1,
                    foreign_keys: Vec::new(),
                },
            );
        }
        self
    }

    /// Makes every later statement containing `pattern` fail.
    pub fn fail_on(&self, pattern: &str) {
        self.lock().failures.push(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Drops the session: every later ping and statement fails.
    pub fn disconnect(&self) {
        self.lock().connected = false;
    }

    /// Every statement received so far, failed ones included.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.lock().tables.contains_key(name)
    }

    /// Rows of `name` in insertion order; empty when the table is missing.
    pub fn rows(&self, name: &str) -> Vec<Vec<SqlValue>> {
        self.lock()
            .tables
            .get(name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn foreign_key_checks(&self) -> bool {
        self.lock().foreign_key_checks
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, sql: &str, params: &[SqlValue]) -> Result<Outcome> {
        let mut db = self.lock();
        db.statements.push(sql.to_string());

        if !db.connected {
            return Err(gone_away());
        }
        if let Some(pattern) = db.failures.iter().find(|p| sql.contains(p.as_str())) {
            return Err(Error::Execution(format!("injected failure on '{}'", pattern)));
        }

        let compact = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        let upper = compact.to_ascii_uppercase();

        if upper.starts_with("CREATE TABLE IF NOT EXISTS ") {
            db.create_table(&compact).map(Outcome::Affected)
        } else if upper.starts_with("SET FOREIGN_KEY_CHECKS") {
            let value = compact.rsplit('=').next().unwrap_or("1").trim();
            db.foreign_key_checks = value != "0";
            Ok(Outcome::Affected(0))
        } else if upper.starts_with("TRUNCATE TABLE ") {
            db.truncate(unquote(&compact["TRUNCATE TABLE ".len()..]))
                .map(Outcome::Affected)
        } else if upper.starts_with("INSERT INTO ") {
            db.insert(&compact, params).map(Outcome::Affected)
        } else if upper.starts_with("SELECT ") {
            db.select(&compact).map(Outcome::Rows)
        } else {
            Err(syntax_error(&compact))
        }
    }
}

fn gone_away() -> Error {
    Error::Execution("MySQL server has gone away".to_string())
}

fn syntax_error(sql: &str) -> Error {
    Error::Execution(format!(
        "You have an error in your SQL syntax near '{}'",
        sql.chars().take(40).collect::<String>()
    ))
}

fn unquote(name: &str) -> &str {
    name.trim().trim_matches('`')
}

fn no_such_table(name: &str) -> Error {
    Error::Execution(format!("Table '{}' doesn't exist", name))
}

/// Contents of the first parenthesised group at or after `from`.
fn paren_group(text: &str, from: usize) -> Option<&str> {
    let open = text[from..].find('(')? + from;
    let close = text[open..].find(')')? + open;
    Some(&text[open + 1..close])
}

/// Splits on commas that are not nested inside parentheses.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in body.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

fn compare_values(a: &SqlValue, b: &SqlValue) -> Ordering {
    match (a, b) {
        (SqlValue::Null, SqlValue::Null) => Ordering::Equal,
        (SqlValue::Null, _) => Ordering::Less,
        (_, SqlValue::Null) => Ordering::Greater,
        (SqlValue::Date(x), SqlValue::Date(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

fn same_value(a: &SqlValue, b: &SqlValue) -> bool {
    !a.is_null() && !b.is_null() && compare_values(a, b) == Ordering::Equal
}

impl Database {
    fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| no_such_table(name))
    }

    fn create_table(&mut self, sql: &str) -> Result<u64> {
        let rest = &sql["CREATE TABLE IF NOT EXISTS ".len()..];
        let name_end = rest
            .find(|c: char| c == '(' || c.is_whitespace())
            .ok_or_else(|| syntax_error(sql))?;
        let name = unquote(&rest[..name_end]).to_string();
        if self.tables.contains_key(&name) {
            return Ok(0);
        }

        let open = sql.find('(').ok_or_else(|| syntax_error(sql))?;
        let close = sql.rfind(')').ok_or_else(|| syntax_error(sql))?;
        let mut table = Table {
            name: name.clone(),
            columns: Vec::new(),
            rows: Vec::new(),
            next_id: 1,
            foreign_keys: Vec::new(),
        };
        let mut unique_columns = Vec::new();

        for item in split_top_level(&sql[open + 1..close]) {
            let upper = item.to_ascii_uppercase();
            if upper.starts_with("UNIQUE") {
                let cols = paren_group(item, 0).ok_or_else(|| syntax_error(item))?;
                unique_columns.extend(cols.split(',').map(|c| unquote(c).to_string()));
            } else if upper.starts_with("CONSTRAINT") || upper.starts_with("FOREIGN KEY") {
                let fk_at = upper.find("FOREIGN KEY").ok_or_else(|| syntax_error(item))?;
                let refs_at = upper.find("REFERENCES").ok_or_else(|| syntax_error(item))?;
                let column = paren_group(item, fk_at).ok_or_else(|| syntax_error(item))?;
                let target = &item[refs_at + "REFERENCES".len()..];
                let target_name = target.split('(').next().unwrap_or_default();
                let target_column = paren_group(target, 0).ok_or_else(|| syntax_error(item))?;
                table.foreign_keys.push(ForeignKey {
                    column: unquote(column).to_string(),
                    references_table: unquote(target_name).to_string(),
                    references_column: unquote(target_column).to_string(),
                });
            } else if upper.starts_with("KEY ")
                || upper.starts_with("INDEX ")
                || upper.starts_with("PRIMARY KEY")
            {
                continue;
            } else {
                let column_name = item.split_whitespace().next().unwrap_or_default();
                table.columns.push(Column {
                    name: unquote(column_name).to_string(),
                    auto_increment: upper.contains("AUTO_INCREMENT"),
                    unique: upper.contains("PRIMARY KEY") || upper.contains(" UNIQUE"),
                    not_null: upper.contains("NOT NULL") || upper.contains("PRIMARY KEY"),
                });
            }
        }

        for col in unique_columns {
            let idx = table
                .column_index(&col)
                .ok_or_else(|| table.unknown_column(&col))?;
            table.columns[idx].unique = true;
        }

        self.tables.insert(name, table);
        Ok(0)
    }

    fn truncate(&mut self, name: &str) -> Result<u64> {
        if !self.tables.contains_key(name) {
            return Err(no_such_table(name));
        }
        if self.foreign_key_checks {
            let referenced = self.tables.values().any(|t| {
                t.name != name && t.foreign_keys.iter().any(|fk| fk.references_table == name)
            });
            if referenced {
                return Err(Error::Execution(format!(
                    "Cannot truncate a table referenced in a foreign key constraint ({})",
                    name
                )));
            }
        }
        if let Some(table) = self.tables.get_mut(name) {
            table.rows.clear();
            table.next_id = 1;
        }
        Ok(0)
    }

    fn insert(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let rest = &sql["INSERT INTO ".len()..];
        let name_end = rest
            .find(|c: char| c == '(' || c.is_whitespace())
            .ok_or_else(|| syntax_error(sql))?;
        let name = unquote(&rest[..name_end]).to_string();

        let columns = paren_group(rest, 0).ok_or_else(|| syntax_error(sql))?;
        let values_at = rest
            .to_ascii_uppercase()
            .find("VALUES")
            .ok_or_else(|| syntax_error(sql))?;
        let values = paren_group(rest, values_at).ok_or_else(|| syntax_error(sql))?;

        let columns: Vec<&str> = columns.split(',').map(unquote).collect();
        let placeholders: Vec<&str> = values.split(',').map(str::trim).collect();
        if placeholders.iter().any(|p| *p != "?") || placeholders.len() != columns.len() {
            return Err(syntax_error(sql));
        }
        if params.len() != columns.len() {
            return Err(Error::Execution(format!(
                "Incorrect arguments to mysqld_stmt_execute: expected {}, got {}",
                columns.len(),
                params.len()
            )));
        }

        let table = self.table(&name)?;
        let mut row = vec![SqlValue::Null; table.columns.len()];
        for (col, value) in columns.iter().zip(params) {
            let idx = table
                .column_index(col)
                .ok_or_else(|| table.unknown_column(col))?;
            row[idx] = value.clone();
        }

        let mut next_id = table.next_id;
        for (idx, column) in table.columns.iter().enumerate() {
            if column.auto_increment {
                match row[idx].as_i64() {
                    Some(explicit) => next_id = next_id.max(explicit + 1),
                    None => {
                        row[idx] = SqlValue::Int(next_id);
                        next_id += 1;
                    }
                }
            }
            if column.not_null && row[idx].is_null() {
                return Err(Error::Execution(format!(
                    "Column '{}' cannot be null",
                    column.name
                )));
            }
            if column.unique && table.rows.iter().any(|r| same_value(&r[idx], &row[idx])) {
                return Err(Error::Execution(format!(
                    "Duplicate entry '{}' for key '{}.{}'",
                    row[idx], table.name, column.name
                )));
            }
        }

        if self.foreign_key_checks {
            for fk in &table.foreign_keys {
                let idx = table
                    .column_index(&fk.column)
                    .ok_or_else(|| table.unknown_column(&fk.column))?;
                let parent = self.table(&fk.references_table)?;
                let parent_idx = parent
                    .column_index(&fk.references_column)
                    .ok_or_else(|| parent.unknown_column(&fk.references_column))?;
                let exists = parent
                    .rows
                    .iter()
                    .any(|r| same_value(&r[parent_idx], &row[idx]));
                if !exists {
                    return Err(Error::Execution(format!(
                        "Cannot add or update a child row: a foreign key constraint fails \
                         ({}.{} references {}.{})",
                        table.name, fk.column, fk.references_table, fk.references_column
                    )));
                }
            }
        }

        if let Some(table) = self.tables.get_mut(&name) {
            table.next_id = next_id;
            table.rows.push(row);
        }
        Ok(1)
    }

    fn select(&self, sql: &str) -> Result<ResultSet> {
        let upper = sql.to_ascii_uppercase();
        let from_at = upper.find(" FROM ").ok_or_else(|| syntax_error(sql))?;
        let mut projection = sql["SELECT ".len()..from_at].trim();
        let distinct = projection.to_ascii_uppercase().starts_with("DISTINCT ");
        if distinct {
            projection = projection["DISTINCT ".len()..].trim();
        }

        let mut tokens = sql[from_at + " FROM ".len()..].split_whitespace();
        let name = unquote(tokens.next().ok_or_else(|| syntax_error(sql))?);
        let table = self.table(name)?;

        let mut order_by: Option<(usize, bool)> = None;
        let mut limit: Option<usize> = None;
        while let Some(token) = tokens.next() {
            match token.to_ascii_uppercase().as_str() {
                "ORDER" => {
                    if !tokens.next().is_some_and(|t| t.eq_ignore_ascii_case("BY")) {
                        return Err(syntax_error(sql));
                    }
                    let col = tokens.next().ok_or_else(|| syntax_error(sql))?;
                    let idx = table
                        .column_index(col)
                        .ok_or_else(|| table.unknown_column(col))?;
                    order_by = Some((idx, false));
                }
                "ASC" if order_by.is_some() => {}
                "DESC" => match order_by.as_mut() {
                    Some(order) => order.1 = true,
                    None => return Err(syntax_error(sql)),
                },
                "LIMIT" => {
                    let n = tokens.next().ok_or_else(|| syntax_error(sql))?;
                    limit = Some(n.parse().map_err(|_| syntax_error(sql))?);
                }
                _ => return Err(syntax_error(sql)),
            }
        }

        let (columns, indexes): (Vec<String>, Vec<usize>) = if projection == "*" {
            table
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| (c.name.clone(), i))
                .unzip()
        } else {
            let mut names = Vec::new();
            let mut idxs = Vec::new();
            for col in projection.split(',') {
                let idx = table
                    .column_index(col)
                    .ok_or_else(|| table.unknown_column(col))?;
                names.push(unquote(col).to_string());
                idxs.push(idx);
            }
            (names, idxs)
        };

        let mut source: Vec<&Vec<SqlValue>> = table.rows.iter().collect();
        if let Some((idx, descending)) = order_by {
            source.sort_by(|a, b| {
                let ord = compare_values(&a[idx], &b[idx]);
                if descending { ord.reverse() } else { ord }
            });
        }

        let mut rows: Vec<Vec<SqlValue>> = Vec::new();
        for row in source {
            let projected: Vec<SqlValue> = indexes.iter().map(|&i| row[i].clone()).collect();
            if distinct && rows.contains(&projected) {
                continue;
            }
            rows.push(projected);
        }
        if let Some(n) = limit {
            rows.truncate(n);
        }

        Ok(ResultSet { columns, rows })
    }
}

#[async_trait]
impl SqlConnection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    /// Fails once disconnected, or when a `fail_on` pattern matches `PING`.
    async fn ping(&self) -> Result<()> {
        let db = self.lock();
        if !db.connected {
            return Err(gone_away());
        }
        match db.failures.iter().find(|p| "PING".contains(p.as_str())) {
            Some(pattern) => Err(Error::Execution(format!("injected failure on '{}'", pattern))),
            None => Ok(()),
        }
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        match self.apply(sql, params)? {
            Outcome::Affected(n) => Ok(n),
            Outcome::Rows(rs) => Ok(rs.len() as u64),
        }
    }

    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        match self.apply(sql, params)? {
            Outcome::Rows(rs) => Ok(rs),
            Outcome::Affected(_) => Ok(ResultSet::default()),
        }
    }

    async fn run_text(&self, sql: &str) -> Result<Option<ResultSet>> {
        match self.apply(sql, &[])? {
            Outcome::Rows(rs) => Ok(Some(rs)),
            Outcome::Affected(_) => Ok(None),
        }
    }
}
