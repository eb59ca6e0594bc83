//! # In-Memory Executor
//!
//! Reference [`CrudExecutor`] over JSON rows. It evaluates the full
//! operator grammar (including registered custom operators, which the SQL
//! adapter cannot express), multi-key sorting, soft-delete visibility,
//! projection, and offset/limit pagination. Useful as executable
//! documentation of the grammar's semantics and as the storage layer in
//! tests.

use crate::condition::{FieldCondition, SearchCondition};
use crate::errors::CrudError;
use crate::normalize::NormalizedQuery;
use crate::operators::{self, CondOperator, CustomOperators};
use crate::traits::{CrudExecutor, ListResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Default)]
pub struct MemoryExecutor {
    rows: Vec<Value>,
    operators: CustomOperators,
    /// Column whose truthy value marks a row as soft-deleted
    deleted_flag: Option<String>,
}

impl MemoryExecutor {
    #[must_use]
    pub fn new(rows: Vec<Value>) -> Self {
        Self {
            rows,
            operators: CustomOperators::default(),
            deleted_flag: None,
        }
    }

    #[must_use]
    pub fn with_operators(mut self, operators: CustomOperators) -> Self {
        self.operators = operators;
        self
    }

    /// Treat rows with a truthy `column` as soft-deleted.
    #[must_use]
    pub fn with_deleted_flag(mut self, column: impl Into<String>) -> Self {
        self.deleted_flag = Some(column.into());
        self
    }

    /// Synchronous core of [`CrudExecutor::execute`].
    pub fn run(&self, query: &NormalizedQuery) -> Result<ListResult<Value>, CrudError> {
        let mut matched: Vec<&Value> = Vec::new();
        for row in &self.rows {
            if !query.include_deleted && self.is_deleted(row) {
                continue;
            }
            let keep = match &query.condition {
                Some(condition) => self.eval_tree(condition, row)?,
                None => true,
            };
            if keep {
                matched.push(row);
            }
        }

        sort_rows(&mut matched, &query.sort);

        let total = matched.len() as u64;
        let data: Vec<Value> = matched
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(
                query
                    .limit
                    .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX)),
            )
            .map(|row| project(row, &query.fields))
            .collect();

        Ok(ListResult {
            data,
            total: Some(total),
        })
    }

    fn is_deleted(&self, row: &Value) -> bool {
        let Some(flag) = &self.deleted_flag else {
            return false;
        };
        match lookup(row, flag) {
            Value::Bool(b) => b,
            Value::Null => false,
            _ => true,
        }
    }

    fn eval_tree(&self, tree: &SearchCondition, row: &Value) -> Result<bool, CrudError> {
        match tree {
            SearchCondition::And(children) => {
                for child in children {
                    if !self.eval_tree(child, row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            SearchCondition::Or(children) => {
                for child in children {
                    if self.eval_tree(child, row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            SearchCondition::Not(children) => {
                for child in children {
                    if self.eval_tree(child, row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            SearchCondition::Leaf(leaf) => self.eval_leaf(leaf, row),
        }
    }

    fn eval_leaf(&self, leaf: &FieldCondition, row: &Value) -> Result<bool, CrudError> {
        let row_value = lookup(row, &leaf.field);
        for (op, cond_value) in &leaf.all {
            if !self.eval_predicate(op, &row_value, cond_value)? {
                return Ok(false);
            }
        }
        if leaf.any.is_empty() {
            return Ok(true);
        }
        for (op, cond_value) in &leaf.any {
            if self.eval_predicate(op, &row_value, cond_value)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn eval_predicate(
        &self,
        op: &CondOperator,
        row_value: &Value,
        cond_value: &Value,
    ) -> Result<bool, CrudError> {
        match op {
            CondOperator::Custom(name) => {
                let custom = self
                    .operators
                    .get(name)
                    .ok_or_else(|| CrudError::unsupported_operator(op.token()))?;
                Ok((custom.predicate)(row_value, cond_value))
            }
            _ => Ok(operators::matches(op, row_value, cond_value)),
        }
    }
}

#[async_trait]
impl CrudExecutor for MemoryExecutor {
    type Item = Value;

    async fn execute(&self, query: &NormalizedQuery) -> Result<ListResult<Value>, CrudError> {
        self.run(query)
    }
}

/// Resolve a possibly dotted field path against a row; missing paths are
/// null (so `$isnull` matches absent fields).
fn lookup(row: &Value, path: &str) -> Value {
    let mut current = row;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn sort_rows(rows: &mut [&Value], sort: &[crate::models::QuerySort]) {
    if sort.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in sort {
            let va = lookup(a, &key.field);
            let vb = lookup(b, &key.field);
            let ordering = operators::compare(&va, &vb).unwrap_or(Ordering::Equal);
            let ordering = match key.direction {
                crate::models::SortDirection::Asc => ordering,
                crate::models::SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn project(row: &Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return row.clone();
    }
    let Value::Object(source) = row else {
        return row.clone();
    };
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = source.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    Value::Object(out)
}
