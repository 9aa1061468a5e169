use super::{ExecutionContext, Executor};
use crate::core::{DbError, Result, Row, Schema, Value};
use crate::evaluator::EvaluationContext;
use crate::parser::ast::{Expr, InsertStmt, Statement};
use crate::result::QueryResult;

pub struct InsertExecutor;

impl Executor for InsertExecutor {
    fn name(&self) -> &'static str {
        "INSERT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Insert(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Insert(insert) = stmt else {
            unreachable!();
        };

        self.execute_insert(insert, ctx)
    }
}

impl InsertExecutor {
    fn execute_insert(&self, insert: &InsertStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let schema = ctx.storage.get_table(&insert.table_name)?.schema().clone();
        let positions = column_positions(&schema, insert)?;

        let evaluator = EvaluationContext::new(ctx.params);
        let rows: Vec<Row> = insert
            .values
            .iter()
            .map(|row_exprs| evaluate_row(&evaluator, &schema, &positions, row_exprs))
            .collect::<Result<Vec<_>>>()?;

        let table = ctx.storage.get_table_mut(&insert.table_name)?;
        let count = rows.len();
        for row in rows {
            table.insert(row)?;
        }

        Ok(QueryResult::affected(count))
    }
}

/// Maps each VALUES position to its column index in the table.
fn column_positions(schema: &Schema, insert: &InsertStmt) -> Result<Vec<usize>> {
    match &insert.columns {
        None => Ok((0..schema.column_count()).collect()),
        Some(names) => names
            .iter()
            .map(|name| {
                schema
                    .find_column_index(name)
                    .ok_or_else(|| DbError::ColumnNotFound(name.clone(), insert.table_name.clone()))
            })
            .collect(),
    }
}

fn evaluate_row(
    evaluator: &EvaluationContext<'_>,
    schema: &Schema,
    positions: &[usize],
    exprs: &[Expr],
) -> Result<Row> {
    if exprs.len() != positions.len() {
        return Err(DbError::ExecutionError(format!(
            "{} values for {} columns",
            exprs.len(),
            positions.len()
        )));
    }

    let mut row = vec![Value::Null; schema.column_count()];
    for (expr, &idx) in exprs.iter().zip(positions) {
        row[idx] = evaluator.evaluate(expr)?;
    }
    Ok(row)
}
