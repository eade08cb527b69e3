use crate::memory::{KvStore, TableStore};
use crate::model::{ResultSet, Row, Value};
use crate::sql::{Aggregate, CaseTest, Condition, OrderBy, Projection, Select, Slot, Statement};
use regex::Regex;
use std::cmp::Ordering;
use tracing::{debug, warn};

/// What a statement changed, so an adapter can persist exactly that.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    None,
    /// One row written at `key`, replacing whatever was there.
    Upserted { table: String, key: String },
    /// Rows changed in place.
    Rewritten { table: String, keys: Vec<String> },
    /// Rows removed.
    Removed { table: String, keys: Vec<String> },
    /// Every row removed.
    Cleared { table: String },
}

impl Mutation {
    pub fn table(&self) -> Option<&str> {
        match self {
            Mutation::None => None,
            Mutation::Upserted { table, .. }
            | Mutation::Rewritten { table, .. }
            | Mutation::Removed { table, .. }
            | Mutation::Cleared { table } => Some(table),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub result: ResultSet,
    pub mutation: Mutation,
}

impl Execution {
    fn read(result: ResultSet) -> Self {
        Self {
            result,
            mutation: Mutation::None,
        }
    }

    fn empty() -> Self {
        Self::read(ResultSet::empty())
    }
}

/// Run `stmt` against `store`, mutating it for writes. Statements against
/// tables outside the store's schema yield an empty result.
pub fn execute(store: &mut KvStore, stmt: &Statement, params: &[Value]) -> Execution {
    debug!(kind = stmt.kind(), table = stmt.table(), params = params.len(), "execute");
    match stmt {
        // Schema is implicit and every query is a full scan.
        Statement::CreateTable { .. } | Statement::CreateIndex { .. } => Execution::empty(),
        Statement::Insert {
            table,
            columns,
            values,
        } => with_table(store, table, |t| insert(t, table, columns, values, params)),
        Statement::Update {
            table,
            assignments,
            filter,
        } => with_table(store, table, |t| update(t, table, assignments, filter, params)),
        Statement::Delete { table, filter } => {
            with_table(store, table, |t| delete(t, table, filter, params))
        }
        Statement::Select(select) => match store.table(&select.table) {
            Some(t) => Execution::read(run_select(t, select, params)),
            None => {
                warn!(table = %select.table, "select from unknown table");
                Execution::empty()
            }
        },
    }
}

fn with_table(
    store: &mut KvStore,
    table: &str,
    f: impl FnOnce(&mut TableStore) -> Execution,
) -> Execution {
    match store.table_mut(table) {
        Some(t) => f(t),
        None => {
            warn!(table, "write to unknown table ignored");
            Execution::empty()
        }
    }
}

fn resolve(slot: &Slot, params: &[Value]) -> Value {
    match slot {
        Slot::Param(i) => params.get(*i).cloned().unwrap_or(Value::Null),
        Slot::Literal(v) => v.clone(),
    }
}

fn insert(
    t: &mut TableStore,
    table: &str,
    columns: &[String],
    values: &[Slot],
    params: &[Value],
) -> Execution {
    let row: Row = columns
        .iter()
        .zip(values)
        .map(|(col, slot)| (col.clone(), resolve(slot, params)))
        .collect();
    let Some(key) = t.key_of(&row) else {
        warn!(table, primary_key = t.primary_key(), "insert without primary key ignored");
        return Execution::empty();
    };
    t.upsert(key.clone(), row);
    Execution {
        result: ResultSet::affected(1),
        mutation: Mutation::Upserted {
            table: table.to_string(),
            key,
        },
    }
}

fn update(
    t: &mut TableStore,
    table: &str,
    assignments: &[(String, Slot)],
    filter: &[Condition],
    params: &[Value],
) -> Execution {
    let filter = Filter::new(filter, params);
    let primary_key = t.primary_key().to_string();
    let assignments: Vec<(&str, Value)> = assignments
        .iter()
        // The key column is never rewritten; rows stay under their key.
        .filter(|(col, _)| *col != primary_key)
        .map(|(col, slot)| (col.as_str(), resolve(slot, params)))
        .collect();

    let mut keys = Vec::new();
    for (key, row) in t.iter_mut() {
        if !filter.matches(row) {
            continue;
        }
        for (col, value) in &assignments {
            row.set(*col, value.clone());
        }
        keys.push(key.clone());
    }
    Execution {
        result: ResultSet::affected(keys.len() as u64),
        mutation: Mutation::Rewritten {
            table: table.to_string(),
            keys,
        },
    }
}

fn delete(t: &mut TableStore, table: &str, filter: &[Condition], params: &[Value]) -> Execution {
    if filter.is_empty() {
        let removed = t.clear();
        return Execution {
            result: ResultSet::affected(removed as u64),
            mutation: Mutation::Cleared {
                table: table.to_string(),
            },
        };
    }

    let filter = Filter::new(filter, params);
    // Collect first, then remove.
    let keys: Vec<String> = t
        .iter()
        .filter(|(_, row)| filter.matches(row))
        .map(|(k, _)| k.clone())
        .collect();
    for key in &keys {
        t.remove(key);
    }
    Execution {
        result: ResultSet::affected(keys.len() as u64),
        mutation: Mutation::Removed {
            table: table.to_string(),
            keys,
        },
    }
}

fn run_select(t: &TableStore, select: &Select, params: &[Value]) -> ResultSet {
    let filter = Filter::new(&select.filter, params);
    let mut rows: Vec<&Row> = t.rows().filter(|row| filter.matches(row)).collect();

    if let Some(aggregate) = &select.aggregate {
        return ResultSet::with_rows(vec![aggregate_row(aggregate, &rows)]);
    }

    if !select.order_by.is_empty() {
        rows.sort_by(|a, b| compare_rows(a, b, &select.order_by));
    }
    if let Some(limit) = select.limit {
        rows.truncate(limit);
    }

    let out: Vec<Row> = match &select.projection {
        Projection::All => rows.into_iter().cloned().collect(),
        Projection::Columns(columns) => rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                    .collect::<Row>()
            })
            .collect(),
    };
    ResultSet::with_rows(out)
}

fn aggregate_row(aggregate: &Aggregate, rows: &[&Row]) -> Row {
    match aggregate {
        Aggregate::Count { alias } => Row::new().with(alias.clone(), rows.len() as f64),
        Aggregate::Sum { column, alias } => {
            let sum: f64 = rows
                .iter()
                .map(|row| row.get(column).map_or(0.0, Value::to_number))
                .filter(|n| n.is_finite())
                .sum();
            Row::new().with(alias.clone(), sum)
        }
        Aggregate::Compound { count_alias, cases } => {
            let mut out = Row::new().with(count_alias.clone(), rows.len() as f64);
            // Each case counts over the whole filtered set independently.
            for case in cases {
                let hits = rows
                    .iter()
                    .filter(|row| case.tests.iter().all(|test| case_holds(row, test)))
                    .count();
                out.set(case.alias.clone(), hits as f64);
            }
            out
        }
    }
}

fn case_holds(row: &Row, test: &CaseTest) -> bool {
    match test {
        CaseTest::Equals(col, expected) => cell(row, col).loose_eq(expected),
        CaseTest::IsNull(col) => cell(row, col).is_null(),
        CaseTest::IsNotNull(col) => !cell(row, col).is_null(),
    }
}

fn cell<'r>(row: &'r Row, column: &str) -> &'r Value {
    const NULL: &Value = &Value::Null;
    row.get(column).unwrap_or(NULL)
}

fn compare_rows(a: &Row, b: &Row, order_by: &[OrderBy]) -> Ordering {
    for key in order_by {
        let ord = compare_values(cell(a, &key.column), cell(b, &key.column));
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Total order for ORDER BY: nulls, then numbers (numerically, NaN last),
/// then everything else by its string form.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Number(_) => 1,
            Value::Bool(_) | Value::Text(_) => 2,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
        _ => rank(a)
            .cmp(&rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

/// A WHERE clause with its parameters bound and LIKE patterns compiled.
struct Filter<'s> {
    conditions: Vec<Bound<'s>>,
}

enum Bound<'s> {
    Eq(&'s str, Value),
    Like(&'s str, Option<Regex>),
    IsNull(&'s str),
    IsNotNull(&'s str),
}

impl<'s> Filter<'s> {
    fn new(conditions: &'s [Condition], params: &[Value]) -> Self {
        let conditions = conditions
            .iter()
            .map(|c| match c {
                Condition::Eq(col, slot) => Bound::Eq(col, resolve(slot, params)),
                Condition::Like(col, slot) => {
                    let pattern = resolve(slot, params);
                    let re = if pattern.is_null() {
                        None
                    } else {
                        like_regex(&pattern.to_string())
                    };
                    Bound::Like(col, re)
                }
                Condition::IsNull(col) => Bound::IsNull(col),
                Condition::IsNotNull(col) => Bound::IsNotNull(col),
            })
            .collect();
        Self { conditions }
    }

    /// True when every condition holds; stops at the first that fails.
    fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| match c {
            Bound::Eq(col, expected) => cell(row, col).loose_eq(expected),
            Bound::Like(col, re) => {
                let value = cell(row, col);
                match re {
                    Some(re) if !value.is_null() => re.is_match(&value.to_string()),
                    _ => false,
                }
            }
            Bound::IsNull(col) => cell(row, col).is_null(),
            Bound::IsNotNull(col) => !cell(row, col).is_null(),
        })
    }
}

/// `%` matches any run and `_` any single character; case-insensitive and
/// anchored at both ends.
fn like_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("(?is)^");
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).ok()
}
