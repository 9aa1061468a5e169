use super::{ExecutionContext, Executor};
use crate::core::{Column, Result, Schema};
use crate::parser::ast::{CreateTableStmt, Statement};
use crate::result::QueryResult;

pub struct CreateTableExecutor;

impl Executor for CreateTableExecutor {
    fn name(&self) -> &'static str {
        "CREATE_TABLE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::CreateTable(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::CreateTable(create) = stmt else {
            unreachable!();
        };

        let schema = build_schema(create);
        ctx.storage
            .create_table(&create.table_name, schema, create.if_not_exists)?;
        Ok(QueryResult::empty())
    }
}

fn build_schema(create: &CreateTableStmt) -> Schema {
    let columns = create
        .columns
        .iter()
        .map(|col| {
            let mut column = Column::new(col.name.clone(), col.data_type.clone());
            if !col.nullable {
                column = column.not_null();
            }
            if col.primary_key {
                column = column.primary_key();
            }
            if col.autoincrement {
                column = column.autoincrement();
            }
            column
        })
        .collect();
    Schema::new(columns)
}

pub struct DropTableExecutor;

impl Executor for DropTableExecutor {
    fn name(&self) -> &'static str {
        "DROP_TABLE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::DropTable(_))
    }

    fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::DropTable(drop) = stmt else {
            unreachable!();
        };

        ctx.storage.drop_table(&drop.table_name, drop.if_exists)?;
        Ok(QueryResult::empty())
    }
}
