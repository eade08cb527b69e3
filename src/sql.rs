//! Statement recognizer for the small SQL dialect the repositories issue.
//!
//! Each accepted statement shape has its own matcher; [`parse`] tries them in
//! a fixed order and returns the first hit. There is no grammar or AST beyond
//! [`Statement`]: anything outside the six shapes is simply not recognized.

use crate::model::Value;
use regex::Regex;
use std::sync::OnceLock;

/// Where a value comes from at execution time.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Index into the bound parameters.
    Param(usize),
    /// Inline literal. Tokens that are not a recognizable literal resolve
    /// to null.
    Literal(Value),
}

/// One conjunct of a WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Slot),
    Like(String, Slot),
    IsNull(String),
    IsNotNull(String),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(c, _) | Condition::Like(c, _) => c,
            Condition::IsNull(c) | Condition::IsNotNull(c) => c,
        }
    }
}

/// One test inside `SUM(CASE WHEN ... THEN 1 ELSE 0 END)`.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseTest {
    Equals(String, Value),
    IsNull(String),
    IsNotNull(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseCount {
    pub alias: String,
    pub tests: Vec<CaseTest>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Count {
        alias: String,
    },
    Sum {
        column: String,
        alias: String,
    },
    /// An overall `COUNT(*)` plus independent conditional counts.
    Compound {
        count_alias: String,
        cases: Vec<CaseCount>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub projection: Projection,
    pub aggregate: Option<Aggregate>,
    pub filter: Vec<Condition>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable {
        table: String,
    },
    CreateIndex {
        name: String,
        table: String,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Slot>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Slot)>,
        filter: Vec<Condition>,
    },
    Select(Select),
    Delete {
        table: String,
        filter: Vec<Condition>,
    },
}

impl Statement {
    pub fn table(&self) -> &str {
        match self {
            Statement::CreateTable { table }
            | Statement::CreateIndex { table, .. }
            | Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. } => table,
            Statement::Select(select) => &select.table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Statement::CreateTable { .. } => "CREATE TABLE",
            Statement::CreateIndex { .. } => "CREATE INDEX",
            Statement::Insert { .. } => "INSERT",
            Statement::Update { .. } => "UPDATE",
            Statement::Select(_) => "SELECT",
            Statement::Delete { .. } => "DELETE",
        }
    }
}

/// Recognize `sql`, or `None` when it is not one of the supported shapes.
/// Case-insensitive; whitespace, newlines, leading block comments and a
/// trailing `;` are tolerated.
pub fn parse(sql: &str) -> Option<Statement> {
    let sql = strip_trailing_semicolon(strip_leading_comments(sql));
    let text = Text::new(sql);
    parse_create_table(&text)
        .or_else(|| parse_create_index(&text))
        .or_else(|| parse_insert(&text))
        .or_else(|| parse_update(&text))
        .or_else(|| parse_select(&text))
        .or_else(|| parse_delete(&text))
}

/// Statement text plus a copy with quoted literal contents blanked out, so
/// keywords and delimiters inside string literals never match. Both have
/// identical byte offsets.
struct Text<'a> {
    raw: &'a str,
    masked: String,
}

impl<'a> Text<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            masked: mask_quoted(raw),
        }
    }

    fn captures(&self, re: &Regex) -> Option<Vec<Option<&'a str>>> {
        let raw: &'a str = self.raw;
        let caps = re.captures(&self.masked)?;
        Some(
            caps.iter()
                .map(|m| m.map(|m| raw[m.range()].trim()))
                .collect(),
        )
    }
}

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid statement regex"))
}

fn strip_trailing_semicolon(s: &str) -> &str {
    let s = s.trim();
    if let Some(stripped) = s.strip_suffix(';') {
        stripped.trim()
    } else {
        s
    }
}

fn strip_leading_comments(mut s: &str) -> &str {
    loop {
        let t = s.trim_start();
        if let Some(rest) = t.strip_prefix("/*") {
            if let Some(end) = rest.find("*/") {
                s = &rest[end + 2..];
                continue;
            }
        }
        return t;
    }
}

fn mask_quoted(s: &str) -> String {
    let mut out = Vec::with_capacity(s.len());
    let mut in_sq = false;
    for b in s.bytes() {
        if b == b'\'' {
            in_sq = !in_sq;
            out.push(b);
        } else if in_sq {
            out.push(b'x');
        } else {
            out.push(b);
        }
    }
    // Only ASCII bytes were written in place of masked ones.
    String::from_utf8(out).unwrap_or_default()
}

/// Split on `sep` outside quotes and parentheses.
fn split_top_level(s: &str, sep: u8) -> Vec<&str> {
    let masked = mask_quoted(s);
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut last = 0;
    for (i, b) in masked.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ if b == sep && depth == 0 => {
                out.push(s[last..i].trim());
                last = i + 1;
            }
            _ => {}
        }
    }
    out.push(s[last..].trim());
    out
}

/// Split a conjunction on `AND` outside quotes.
fn split_and(s: &str) -> Vec<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = cached(&RE, r"(?i)\s+and\s+");
    let masked = mask_quoted(s);
    let mut out = Vec::new();
    let mut last = 0;
    for m in re.find_iter(&masked) {
        out.push(s[last..m.start()].trim());
        last = m.end();
    }
    out.push(s[last..].trim());
    out
}

fn unquote_identifier(token: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = cached(&RE, r#"^[`"]?(\w+)[`"]?$"#);
    re.captures(token.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// `NULL`, `TRUE`/`FALSE`, a finite number or a single-quoted string.
fn parse_literal(token: &str) -> Option<Value> {
    let t = token.trim();
    if t.eq_ignore_ascii_case("null") {
        return Some(Value::Null);
    }
    if t.eq_ignore_ascii_case("true") {
        return Some(Value::Bool(true));
    }
    if t.eq_ignore_ascii_case("false") {
        return Some(Value::Bool(false));
    }
    if t.len() >= 2 && t.starts_with('\'') && t.ends_with('\'') {
        let inner = &t[1..t.len() - 1];
        return Some(Value::Text(inner.replace("''", "'")));
    }
    let numeric_start = t
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if numeric_start {
        if let Ok(n) = t.parse::<f64>() {
            if n.is_finite() {
                return Some(Value::Number(n));
            }
        }
    }
    None
}

/// Hands out parameter indexes in textual order.
#[derive(Default)]
struct Slots {
    next: usize,
}

impl Slots {
    fn take(&mut self, token: &str) -> Option<Slot> {
        if token.trim() == "?" {
            let slot = Slot::Param(self.next);
            self.next += 1;
            return Some(slot);
        }
        parse_literal(token).map(Slot::Literal)
    }
}

fn parse_conditions(clause: Option<&str>, slots: &mut Slots) -> Option<Vec<Condition>> {
    static IS_NOT_NULL: OnceLock<Regex> = OnceLock::new();
    static IS_NULL: OnceLock<Regex> = OnceLock::new();
    static LIKE: OnceLock<Regex> = OnceLock::new();
    static EQ: OnceLock<Regex> = OnceLock::new();

    let Some(clause) = clause else {
        return Some(Vec::new());
    };
    let is_not_null = cached(&IS_NOT_NULL, r#"(?is)^[`"]?(\w+)[`"]?\s+is\s+not\s+null$"#);
    let is_null = cached(&IS_NULL, r#"(?is)^[`"]?(\w+)[`"]?\s+is\s+null$"#);
    let like = cached(&LIKE, r#"(?is)^[`"]?(\w+)[`"]?\s+like\s+(.+)$"#);
    let eq = cached(&EQ, r#"(?is)^[`"]?(\w+)[`"]?\s*=\s*(.+)$"#);

    let mut out = Vec::new();
    for atom in split_and(clause) {
        let text = Text::new(atom);
        let cond = if let Some(c) = text.captures(is_not_null) {
            Condition::IsNotNull(c[1]?.to_string())
        } else if let Some(c) = text.captures(is_null) {
            Condition::IsNull(c[1]?.to_string())
        } else if let Some(c) = text.captures(like) {
            Condition::Like(c[1]?.to_string(), slots.take(c[2]?)?)
        } else if let Some(c) = text.captures(eq) {
            Condition::Eq(c[1]?.to_string(), slots.take(c[2]?)?)
        } else {
            return None;
        };
        out.push(cond);
    }
    Some(out)
}

fn parse_create_table(text: &Text<'_>) -> Option<Statement> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = cached(
        &RE,
        r#"(?is)^create\s+table\s+if\s+not\s+exists\s+[`"]?(\w+)[`"]?\s*\(.*\)$"#,
    );
    let c = text.captures(re)?;
    Some(Statement::CreateTable {
        table: c[1]?.to_string(),
    })
}

fn parse_create_index(text: &Text<'_>) -> Option<Statement> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = cached(
        &RE,
        r#"(?is)^create\s+index\s+if\s+not\s+exists\s+[`"]?(\w+)[`"]?\s+on\s+[`"]?(\w+)[`"]?\s*\(.*\)$"#,
    );
    let c = text.captures(re)?;
    Some(Statement::CreateIndex {
        name: c[1]?.to_string(),
        table: c[2]?.to_string(),
    })
}

fn parse_insert(text: &Text<'_>) -> Option<Statement> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = cached(
        &RE,
        r#"(?is)^insert\s+or\s+replace\s+into\s+[`"]?(\w+)[`"]?\s*\(([^)]*)\)\s*values\s*\((.*)\)$"#,
    );
    let c = text.captures(re)?;
    let columns = split_top_level(c[2]?, b',')
        .into_iter()
        .map(unquote_identifier)
        .collect::<Option<Vec<_>>>()?;
    let mut slots = Slots::default();
    let values: Vec<Slot> = split_top_level(c[3]?, b',')
        .into_iter()
        .map(|tok| slots.take(tok).unwrap_or(Slot::Literal(Value::Null)))
        .collect();
    if columns.len() != values.len() {
        return None;
    }
    Some(Statement::Insert {
        table: c[1]?.to_string(),
        columns,
        values,
    })
}

fn parse_update(text: &Text<'_>) -> Option<Statement> {
    static RE: OnceLock<Regex> = OnceLock::new();
    static ASSIGN: OnceLock<Regex> = OnceLock::new();
    let re = cached(
        &RE,
        r#"(?is)^update\s+[`"]?(\w+)[`"]?\s+set\s+(.+?)(?:\s+where\s+(.+))?$"#,
    );
    let assign = cached(&ASSIGN, r#"(?is)^[`"]?(\w+)[`"]?\s*=\s*(.+)$"#);
    let c = text.captures(re)?;

    // SET slots come before WHERE slots.
    let mut slots = Slots::default();
    let mut assignments = Vec::new();
    for item in split_top_level(c[2]?, b',') {
        let a = Text::new(item).captures(assign)?;
        assignments.push((a[1]?.to_string(), slots.take(a[2]?)?));
    }
    let filter = parse_conditions(c[3], &mut slots)?;
    Some(Statement::Update {
        table: c[1]?.to_string(),
        assignments,
        filter,
    })
}

fn parse_select(text: &Text<'_>) -> Option<Statement> {
    static RE: OnceLock<Regex> = OnceLock::new();
    static ORDER: OnceLock<Regex> = OnceLock::new();
    let re = cached(
        &RE,
        r#"(?is)^select\s+(.+?)\s+from\s+[`"]?(\w+)[`"]?(?:\s+where\s+(.+?))?(?:\s+order\s+by\s+(.+?))?(?:\s+limit\s+(\d+))?$"#,
    );
    let order = cached(&ORDER, r#"(?is)^[`"]?(\w+)[`"]?(?:\s+(asc|desc))?$"#);
    let c = text.captures(re)?;

    let (projection, aggregate) = parse_projection(c[1]?)?;
    let mut slots = Slots::default();
    let filter = parse_conditions(c[3], &mut slots)?;

    let mut order_by = Vec::new();
    if let Some(clause) = c[4] {
        for item in split_top_level(clause, b',') {
            let o = Text::new(item).captures(order)?;
            order_by.push(OrderBy {
                column: o[1]?.to_string(),
                descending: o[2].is_some_and(|d| d.eq_ignore_ascii_case("desc")),
            });
        }
    }
    let limit = match c[5] {
        Some(n) => Some(n.parse::<usize>().ok()?),
        None => None,
    };

    Some(Statement::Select(Select {
        table: c[2]?.to_string(),
        projection,
        aggregate,
        filter,
        order_by,
        limit,
    }))
}

fn parse_projection(list: &str) -> Option<(Projection, Option<Aggregate>)> {
    static COUNT: OnceLock<Regex> = OnceLock::new();
    static SUM: OnceLock<Regex> = OnceLock::new();
    static CASE: OnceLock<Regex> = OnceLock::new();
    let count = cached(
        &COUNT,
        r#"(?is)^count\s*\(\s*\*\s*\)(?:\s+as\s+[`"]?(\w+)[`"]?)?$"#,
    );
    let sum = cached(
        &SUM,
        r#"(?is)^sum\s*\(\s*[`"]?(\w+)[`"]?\s*\)(?:\s+as\s+[`"]?(\w+)[`"]?)?$"#,
    );
    let case = cached(
        &CASE,
        r#"(?is)^sum\s*\(\s*case\s+when\s+(.+?)\s+then\s+1\s+else\s+0\s+end\s*\)\s+as\s+[`"]?(\w+)[`"]?$"#,
    );

    if list.trim() == "*" {
        return Some((Projection::All, None));
    }
    let items = split_top_level(list, b',');

    if let [only] = items.as_slice() {
        let text = Text::new(only);
        if let Some(c) = text.captures(count) {
            let alias = c[1].unwrap_or("count").to_string();
            return Some((Projection::All, Some(Aggregate::Count { alias })));
        }
        if let Some(c) = text.captures(sum) {
            let aggregate = Aggregate::Sum {
                column: c[1]?.to_string(),
                alias: c[2].unwrap_or("sum").to_string(),
            };
            return Some((Projection::All, Some(aggregate)));
        }
    }

    let has_case = items.iter().any(|i| Text::new(i).captures(case).is_some());
    if has_case {
        let mut count_alias = None;
        let mut cases = Vec::new();
        for item in &items {
            let text = Text::new(item);
            if let Some(c) = text.captures(count) {
                if count_alias.is_some() {
                    return None;
                }
                count_alias = Some(c[1].unwrap_or("count").to_string());
            } else if let Some(c) = text.captures(case) {
                cases.push(CaseCount {
                    alias: c[2]?.to_string(),
                    tests: parse_case_tests(c[1]?)?,
                });
            } else {
                return None;
            }
        }
        let aggregate = Aggregate::Compound {
            count_alias: count_alias?,
            cases,
        };
        return Some((Projection::All, Some(aggregate)));
    }

    let columns = items
        .into_iter()
        .map(unquote_identifier)
        .collect::<Option<Vec<_>>>()?;
    Some((Projection::Columns(columns), None))
}

fn parse_case_tests(clause: &str) -> Option<Vec<CaseTest>> {
    let mut slots = Slots::default();
    parse_conditions(Some(clause), &mut slots)?
        .into_iter()
        .map(|cond| match cond {
            Condition::Eq(col, Slot::Literal(v)) => Some(CaseTest::Equals(col, v)),
            Condition::IsNull(col) => Some(CaseTest::IsNull(col)),
            Condition::IsNotNull(col) => Some(CaseTest::IsNotNull(col)),
            _ => None,
        })
        .collect()
}

fn parse_delete(text: &Text<'_>) -> Option<Statement> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = cached(
        &RE,
        r#"(?is)^delete\s+from\s+[`"]?(\w+)[`"]?(?:\s+where\s+(.+))?$"#,
    );
    let c = text.captures(re)?;
    let mut slots = Slots::default();
    let filter = parse_conditions(c[2], &mut slots)?;
    Some(Statement::Delete {
        table: c[1]?.to_string(),
        filter,
    })
}
