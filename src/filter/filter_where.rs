use std::collections::HashMap;

use serde_json::Value;

use super::compile::{Condition, Predicate};

/// Renders a compiled [`Condition`] as a PostgreSQL boolean expression with
/// `$n` placeholders.
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
    casts: HashMap<String, &'static str>,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
            casts: HashMap::new(),
        }
    }

    /// Returns `("1=1", [])` when there is no condition.
    pub fn generate(condition: Option<&Condition>, starting_param_index: usize) -> (String, Vec<Value>) {
        Self::new(starting_param_index).render(condition)
    }

    /// Like [`FilterWhere::generate`], but comparison placeholders for the
    /// given columns are cast (`$1::uuid`), since parameters bind as text.
    pub fn generate_with_casts(
        condition: Option<&Condition>,
        starting_param_index: usize,
        casts: HashMap<String, &'static str>,
    ) -> (String, Vec<Value>) {
        let mut filter_where = Self::new(starting_param_index);
        filter_where.casts = casts;
        filter_where.render(condition)
    }

    fn render(mut self, condition: Option<&Condition>) -> (String, Vec<Value>) {
        let sql = match condition {
            Some(condition) => self.build(condition),
            None => "1=1".to_string(),
        };
        (sql, self.param_values)
    }

    fn build(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::And(children) => self.join(children, " AND "),
            Condition::Or(children) => self.join(children, " OR "),
            Condition::Column { column, predicate } => self.build_predicate(column, predicate),
        }
    }

    fn join(&mut self, children: &[Condition], joiner: &str) -> String {
        let parts: Vec<String> = children.iter().map(|c| format!("({})", self.build(c))).collect();
        parts.join(joiner)
    }

    fn build_predicate(&mut self, column: &str, predicate: &Predicate) -> String {
        let quoted_column = quote_ident(column);
        match predicate {
            Predicate::Eq(v) => {
                if v.is_null() { format!("{} IS NULL", quoted_column) }
                else { format!("{} = {}", quoted_column, self.typed_param(column, v.clone())) }
            }
            Predicate::Ne(v) => {
                if v.is_null() { format!("{} IS NOT NULL", quoted_column) }
                else { format!("{} <> {}", quoted_column, self.typed_param(column, v.clone())) }
            }
            Predicate::Gt(v) => format!("{} > {}", quoted_column, self.typed_param(column, v.clone())),
            Predicate::Gte(v) => format!("{} >= {}", quoted_column, self.typed_param(column, v.clone())),
            Predicate::Lt(v) => format!("{} < {}", quoted_column, self.typed_param(column, v.clone())),
            Predicate::Lte(v) => format!("{} <= {}", quoted_column, self.typed_param(column, v.clone())),
            Predicate::In(values) => {
                if values.is_empty() { return "1=0".to_string(); }
                let params: Vec<String> = values.iter().map(|v| self.typed_param(column, v.clone())).collect();
                format!("{} IN ({})", quoted_column, params.join(", "))
            }
            Predicate::NotIn(values) => {
                if values.is_empty() { return "1=1".to_string(); }
                let params: Vec<String> = values.iter().map(|v| self.typed_param(column, v.clone())).collect();
                format!("{} NOT IN ({})", quoted_column, params.join(", "))
            }
            Predicate::Contains { needle, case_insensitive } => {
                let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
                let p = self.param(Value::String(format!("%{}%", escape_like(needle))));
                format!("{}::text {} {}", quoted_column, op, p)
            }
            Predicate::NotContains(needle) => {
                let p = self.param(Value::String(format!("%{}%", escape_like(needle))));
                format!("{}::text NOT LIKE {}", quoted_column, p)
            }
            Predicate::StartsWith(prefix) => {
                let p = self.param(Value::String(format!("{}%", escape_like(prefix))));
                format!("{}::text LIKE {}", quoted_column, p)
            }
            Predicate::EndsWith(suffix) => {
                let p = self.param(Value::String(format!("%{}", escape_like(suffix))));
                format!("{}::text LIKE {}", quoted_column, p)
            }
            Predicate::IsNull => format!("{} IS NULL", quoted_column),
            Predicate::IsNotNull => format!("{} IS NOT NULL", quoted_column),
            Predicate::Between(low, high) => {
                let low = self.typed_param(column, low.clone());
                let high = self.typed_param(column, high.clone());
                format!("{} BETWEEN {} AND {}", quoted_column, low, high)
            }
        }
    }

    fn typed_param(&mut self, column: &str, value: Value) -> String {
        let placeholder = self.param(value);
        match self.casts.get(column) {
            Some(cast) => format!("{}::{}", placeholder, cast),
            None => placeholder,
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
