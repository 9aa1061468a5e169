use super::{ExecutionContext, Executor};
use crate::core::Result;
use crate::evaluator::EvaluationContext;
use crate::parser::ast::Statement;
use crate::result::QueryResult;

pub struct DeleteExecutor;

impl Executor for DeleteExecutor {
    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Delete(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Delete(delete) = stmt else {
            unreachable!();
        };

        let params = ctx.params;
        let table = ctx.storage.get_table_mut(&delete.table_name)?;

        let removed = match &delete.selection {
            None => table.clear(),
            Some(predicate) => {
                let schema = table.schema().clone();
                table.delete_where(|row| {
                    EvaluationContext::with_row(&schema, row, params).matches(predicate)
                })?
            }
        };

        Ok(QueryResult::affected(removed))
    }
}
