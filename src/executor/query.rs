use super::{ExecutionContext, Executor};
use crate::core::{DbError, Result, Row, Schema, Value};
use crate::evaluator::EvaluationContext;
use crate::parser::ast::{QueryStmt, SelectItem, Statement};
use crate::result::QueryResult;
use std::cmp::Ordering;

pub struct QueryExecutor;

impl Executor for QueryExecutor {
    fn name(&self) -> &'static str {
        "QUERY"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Query(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Query(query) = stmt else {
            unreachable!();
        };

        match &query.from {
            None => self.execute_without_table(query, ctx.params),
            Some(table_name) => {
                let table = ctx.storage.get_table(table_name)?;
                let rows: Vec<&Row> = table.scan().collect();
                self.execute_on_rows(query, table.schema(), rows, ctx.params)
            }
        }
    }
}

impl QueryExecutor {
    fn execute_without_table(&self, query: &QueryStmt, params: &[Value]) -> Result<QueryResult> {
        let evaluator = EvaluationContext::new(params);
        if let Some(selection) = &query.selection
            && !evaluator.matches(selection)?
        {
            return Ok(QueryResult::new(output_columns(query, None), Vec::new()));
        }

        let mut row = Vec::with_capacity(query.projection.len());
        for item in &query.projection {
            match item {
                SelectItem::Wildcard => {
                    return Err(DbError::ParseError("SELECT * requires a FROM clause".into()));
                }
                SelectItem::Expr { expr, .. } => row.push(evaluator.evaluate(expr)?),
            }
        }

        let rows = match query.limit {
            Some(0) => Vec::new(),
            _ => vec![row],
        };
        Ok(QueryResult::new(output_columns(query, None), rows))
    }

    fn execute_on_rows(
        &self,
        query: &QueryStmt,
        schema: &Schema,
        rows: Vec<&Row>,
        params: &[Value],
    ) -> Result<QueryResult> {
        // WHERE
        let mut selected = Vec::with_capacity(rows.len());
        for row in rows {
            let keep = match &query.selection {
                Some(predicate) => EvaluationContext::with_row(schema, row, params).matches(predicate)?,
                None => true,
            };
            if keep {
                selected.push(row);
            }
        }

        // ORDER BY (stable, so ties keep insertion order)
        if !query.order_by.is_empty() {
            let mut keyed = selected
                .into_iter()
                .map(|row| {
                    let ctx = EvaluationContext::with_row(schema, row, params);
                    let keys = query
                        .order_by
                        .iter()
                        .map(|order| ctx.evaluate(&order.expr))
                        .collect::<Result<Vec<_>>>()?;
                    Ok((keys, row))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut sort_error = None;
            keyed.sort_by(|(a, _), (b, _)| {
                for (idx, order) in query.order_by.iter().enumerate() {
                    let ordering = match a[idx].compare(&b[idx]) {
                        Ok(ordering) => ordering,
                        Err(err) => {
                            sort_error.get_or_insert(err);
                            Ordering::Equal
                        }
                    };
                    let ordering = if order.descending { ordering.reverse() } else { ordering };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
            if let Some(err) = sort_error {
                return Err(err);
            }
            selected = keyed.into_iter().map(|(_, row)| row).collect();
        }

        // LIMIT
        if let Some(limit) = query.limit {
            selected.truncate(limit);
        }

        // Projection
        let output = selected
            .into_iter()
            .map(|row| project(query, schema, row, params))
            .collect::<Result<Vec<_>>>()?;

        Ok(QueryResult::new(output_columns(query, Some(schema)), output))
    }
}

fn project(query: &QueryStmt, schema: &Schema, row: &Row, params: &[Value]) -> Result<Row> {
    let ctx = EvaluationContext::with_row(schema, row, params);
    let mut projected = Vec::new();
    for item in &query.projection {
        match item {
            SelectItem::Wildcard => projected.extend(row.iter().cloned()),
            SelectItem::Expr { expr, .. } => projected.push(ctx.evaluate(expr)?),
        }
    }
    Ok(projected)
}

fn output_columns(query: &QueryStmt, schema: Option<&Schema>) -> Vec<String> {
    let mut columns = Vec::new();
    for item in &query.projection {
        match item {
            SelectItem::Wildcard => {
                if let Some(schema) = schema {
                    columns.extend(schema.column_names());
                }
            }
            SelectItem::Expr { expr, alias } => {
                columns.push(alias.clone().unwrap_or_else(|| expr.label()));
            }
        }
    }
    columns
}
