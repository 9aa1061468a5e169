// ============================================================================
// src/parser/adapter.rs - sqlparser (SQLite dialect) -> internal AST
// ============================================================================

use sqlparser::ast as sql_ast;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use crate::core::{DbError, Result, DataType, Value};
use crate::parser::ast::*;

pub struct SqlParserAdapter {
    dialect: SQLiteDialect,
}

impl SqlParserAdapter {
    pub fn new() -> Self {
        Self {
            dialect: SQLiteDialect {},
        }
    }

    pub fn parse(&self, sql: &str) -> Result<Vec<Statement>> {
        // Transaction control is matched textually, the dialects disagree on it
        let trimmed = sql.trim().trim_end_matches(';').trim().to_uppercase();
        if trimmed == "BEGIN" || trimmed == "BEGIN TRANSACTION" || trimmed == "START TRANSACTION" {
            return Ok(vec![Statement::Begin]);
        }
        if trimmed == "COMMIT" || trimmed == "COMMIT TRANSACTION" || trimmed == "END" {
            return Ok(vec![Statement::Commit]);
        }
        if trimmed == "ROLLBACK" || trimmed == "ROLLBACK TRANSACTION" {
            return Ok(vec![Statement::Rollback]);
        }

        let external_stmts = Parser::parse_sql(&self.dialect, sql)
            .map_err(|e| DbError::ParseError(e.to_string()))?;

        // Placeholders are numbered across the whole batch
        let mut converter = StatementConverter::default();
        external_stmts
            .into_iter()
            .map(|stmt| converter.convert_statement(stmt))
            .collect()
    }
}

impl Default for SqlParserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct StatementConverter {
    next_param: usize,
}

impl StatementConverter {
    fn convert_statement(&mut self, stmt: sql_ast::Statement) -> Result<Statement> {
        match stmt {
            sql_ast::Statement::CreateTable(create) => {
                Ok(Statement::CreateTable(self.convert_create_table(create)?))
            }
            sql_ast::Statement::Drop { object_type, names, if_exists, .. } => {
                if let sql_ast::ObjectType::Table = object_type {
                    Ok(Statement::DropTable(self.convert_drop_table(names, if_exists)?))
                } else {
                    Err(DbError::UnsupportedOperation(format!(
                        "Only DROP TABLE supported, got: {:?}",
                        object_type
                    )))
                }
            }
            sql_ast::Statement::Insert(insert) => {
                Ok(Statement::Insert(self.convert_insert(insert)?))
            }
            sql_ast::Statement::Query(query) => {
                Ok(Statement::Query(self.convert_query(*query)?))
            }
            sql_ast::Statement::Delete(delete) => {
                Ok(Statement::Delete(self.convert_delete(delete)?))
            }
            _ => Err(DbError::UnsupportedOperation(format!(
                "Statement type not supported: {}",
                stmt
            ))),
        }
    }

    fn convert_create_table(&mut self, create: sql_ast::CreateTable) -> Result<CreateTableStmt> {
        let table_name = extract_table_name(&create.name)?;
        let columns = create
            .columns
            .into_iter()
            .map(|col| self.convert_column_def(col))
            .collect::<Result<Vec<_>>>()?;

        if columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(DbError::UnsupportedOperation(
                "Composite primary keys are not supported".into(),
            ));
        }

        Ok(CreateTableStmt {
            table_name,
            columns,
            if_not_exists: create.if_not_exists,
        })
    }

    fn convert_drop_table(&mut self, names: Vec<sql_ast::ObjectName>, if_exists: bool) -> Result<DropTableStmt> {
        if names.len() != 1 {
            return Err(DbError::UnsupportedOperation(
                "Only single table DROP supported".into()
            ));
        }

        let table_name = extract_table_name(&names[0])?;

        Ok(DropTableStmt {
            table_name,
            if_exists,
        })
    }

    fn convert_column_def(&mut self, col: sql_ast::ColumnDef) -> Result<ColumnDef> {
        let data_type = convert_data_type(&col.data_type)?;

        let mut nullable = true;
        let mut primary_key = false;
        let mut autoincrement = false;
        for opt in &col.options {
            if matches!(opt.option, sql_ast::ColumnOption::NotNull) {
                nullable = false;
                continue;
            }
            // Matched on the rendered option, its AST shape moves between releases
            let rendered = opt.option.to_string().to_uppercase();
            if rendered.contains("PRIMARY KEY") {
                primary_key = true;
            }
            if rendered.contains("AUTOINCREMENT") || rendered.contains("AUTO_INCREMENT") {
                autoincrement = true;
            }
        }

        if autoincrement && !(primary_key && data_type == DataType::Integer) {
            return Err(DbError::ParseError(format!(
                "AUTOINCREMENT is only allowed on an INTEGER PRIMARY KEY (column '{}')",
                col.name.value
            )));
        }

        Ok(ColumnDef {
            name: col.name.value,
            data_type,
            nullable,
            primary_key,
            autoincrement,
        })
    }

    fn convert_insert(&mut self, insert: sql_ast::Insert) -> Result<InsertStmt> {
        let table_name = unquote(&insert.table.to_string());

        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.into_iter().map(|id| id.value).collect())
        };

        let values = if let Some(source) = insert.source {
            if let sql_ast::SetExpr::Values(vals) = *source.body {
                vals.rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|expr| self.convert_expr(expr))
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()?
            } else {
                return Err(DbError::UnsupportedOperation(
                    "Only VALUES clause supported".into()
                ));
            }
        } else {
            return Err(DbError::UnsupportedOperation(
                "INSERT requires a VALUES clause".into()
            ));
        };

        Ok(InsertStmt {
            table_name,
            columns,
            values,
        })
    }

    fn convert_delete(&mut self, delete: sql_ast::Delete) -> Result<DeleteStmt> {
        let tables = match delete.from {
            sql_ast::FromTable::WithFromKeyword(tables) => tables,
            sql_ast::FromTable::WithoutKeyword(tables) => tables,
        };
        if tables.len() != 1 {
            return Err(DbError::ParseError("DELETE requires exactly one table".into()));
        }
        let table_name = match &tables[0].relation {
            sql_ast::TableFactor::Table { name, .. } => extract_table_name(name)?,
            _ => return Err(DbError::UnsupportedOperation(
                "Complex table references not supported in DELETE".into()
            )),
        };

        let selection = delete
            .selection
            .map(|expr| self.convert_expr(expr))
            .transpose()?;

        Ok(DeleteStmt {
            table_name,
            selection,
        })
    }

    fn convert_query(&mut self, query: sql_ast::Query) -> Result<QueryStmt> {
        let sql_ast::SetExpr::Select(select) = *query.body else {
            return Err(DbError::UnsupportedOperation(
                "Only SELECT queries supported".into()
            ));
        };
        let select = *select;

        let projection = select
            .projection
            .into_iter()
            .map(|item| self.convert_select_item(item))
            .collect::<Result<Vec<_>>>()?;

        let from = match select.from.len() {
            0 => None,
            1 => {
                let table = &select.from[0];
                if !table.joins.is_empty() {
                    return Err(DbError::UnsupportedOperation("JOIN is not supported".into()));
                }
                match &table.relation {
                    sql_ast::TableFactor::Table { name, .. } => Some(extract_table_name(name)?),
                    _ => return Err(DbError::UnsupportedOperation(
                        "Complex table references not supported".into()
                    )),
                }
            }
            _ => return Err(DbError::UnsupportedOperation(
                "Multiple FROM tables not supported".into()
            )),
        };

        let selection = select
            .selection
            .map(|expr| self.convert_expr(expr))
            .transpose()?;

        let order_by = self.convert_order_by(query.order_by)?;
        let limit = self.convert_limit_clause(&query.limit_clause)?;

        Ok(QueryStmt {
            projection,
            from,
            selection,
            order_by,
            limit,
        })
    }

    fn convert_select_item(&mut self, item: sql_ast::SelectItem) -> Result<SelectItem> {
        match item {
            sql_ast::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
            sql_ast::SelectItem::UnnamedExpr(expr) => {
                Ok(SelectItem::Expr {
                    expr: self.convert_expr(expr)?,
                    alias: None,
                })
            }
            sql_ast::SelectItem::ExprWithAlias { expr, alias } => {
                Ok(SelectItem::Expr {
                    expr: self.convert_expr(expr)?,
                    alias: Some(alias.value),
                })
            }
            _ => Err(DbError::UnsupportedOperation(
                "Unsupported select item".into()
            )),
        }
    }

    fn convert_order_by(&mut self, order_by: Option<sql_ast::OrderBy>) -> Result<Vec<OrderByExpr>> {
        let Some(order_by) = order_by else {
            return Ok(Vec::new());
        };

        match order_by.kind {
            sql_ast::OrderByKind::Expressions(exprs) => {
                exprs
                    .into_iter()
                    .map(|order| {
                        let descending = order.options.asc.map(|asc| !asc).unwrap_or(false);
                        Ok(OrderByExpr {
                            expr: self.convert_expr(order.expr)?,
                            descending,
                        })
                    })
                    .collect()
            }
            sql_ast::OrderByKind::All(_) => Err(DbError::UnsupportedOperation(
                "ORDER BY ALL not supported".into()
            )),
        }
    }

    fn convert_limit_clause(&self, limit_clause: &Option<sql_ast::LimitClause>) -> Result<Option<usize>> {
        let Some(clause) = limit_clause else {
            return Ok(None);
        };

        let limit = match clause {
            sql_ast::LimitClause::LimitOffset { limit, .. } => limit.as_ref(),
            sql_ast::LimitClause::OffsetCommaLimit { limit, .. } => Some(limit),
        };

        match limit {
            Some(sql_ast::Expr::Value(value_with_span)) => match &value_with_span.value {
                sql_ast::Value::Number(n, _) => n
                    .parse::<usize>()
                    .map(Some)
                    .map_err(|_| DbError::ParseError(format!("Invalid LIMIT value: {}", n))),
                other => Err(DbError::UnsupportedOperation(format!(
                    "Only numeric LIMIT supported, got: {}",
                    other
                ))),
            },
            Some(_) => Err(DbError::UnsupportedOperation(
                "Only numeric LIMIT supported".into()
            )),
            None => Ok(None),
        }
    }

    fn convert_expr(&mut self, expr: sql_ast::Expr) -> Result<Expr> {
        match expr {
            sql_ast::Expr::Identifier(ident) => Ok(Expr::Column(ident.value)),
            sql_ast::Expr::CompoundIdentifier(idents) => idents
                .into_iter()
                .last()
                .map(|ident| Expr::Column(ident.value))
                .ok_or_else(|| DbError::ParseError("Empty identifier".into())),
            sql_ast::Expr::Value(val) => self.convert_value(val.value),
            sql_ast::Expr::Nested(inner) => self.convert_expr(*inner),
            sql_ast::Expr::IsNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.convert_expr(*inner)?),
                negated: false,
            }),
            sql_ast::Expr::IsNotNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.convert_expr(*inner)?),
                negated: true,
            }),
            sql_ast::Expr::UnaryOp { op, expr } => {
                let op = match op {
                    sql_ast::UnaryOperator::Not => UnaryOp::Not,
                    sql_ast::UnaryOperator::Minus => UnaryOp::Minus,
                    sql_ast::UnaryOperator::Plus => return self.convert_expr(*expr),
                    other => {
                        return Err(DbError::UnsupportedOperation(format!(
                            "Unsupported unary operator: {}",
                            other
                        )))
                    }
                };
                Ok(Expr::UnaryOp {
                    op,
                    expr: Box::new(self.convert_expr(*expr)?),
                })
            }
            sql_ast::Expr::BinaryOp { left, op, right } => {
                let op = convert_binary_op(&op)?;
                Ok(Expr::BinaryOp {
                    left: Box::new(self.convert_expr(*left)?),
                    op,
                    right: Box::new(self.convert_expr(*right)?),
                })
            }
            other => Err(DbError::UnsupportedOperation(format!(
                "Unsupported expression: {}",
                other
            ))),
        }
    }

    fn convert_value(&mut self, val: sql_ast::Value) -> Result<Expr> {
        let value = match val {
            sql_ast::Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Value::Integer(i)
                } else if let Ok(f) = n.parse::<f64>() {
                    Value::Float(f)
                } else {
                    return Err(DbError::TypeMismatch(format!("Invalid number: {}", n)));
                }
            }
            sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
                Value::Text(s)
            }
            sql_ast::Value::Boolean(b) => Value::Integer(i64::from(b)),
            sql_ast::Value::Null => Value::Null,
            sql_ast::Value::Placeholder(p) => return self.convert_placeholder(&p),
            other => {
                return Err(DbError::UnsupportedOperation(format!(
                    "Unsupported value: {}",
                    other
                )))
            }
        };
        Ok(Expr::Literal(value))
    }

    fn convert_placeholder(&mut self, placeholder: &str) -> Result<Expr> {
        if placeholder == "?" {
            let idx = self.next_param;
            self.next_param += 1;
            return Ok(Expr::Parameter(idx));
        }
        // ?NNN is one-based
        if let Some(n) = placeholder.strip_prefix('?') {
            let position = n
                .parse::<usize>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| DbError::ParseError(format!("Invalid placeholder: {}", placeholder)))?;
            self.next_param = self.next_param.max(position);
            return Ok(Expr::Parameter(position - 1));
        }
        Err(DbError::UnsupportedOperation(format!(
            "Only positional placeholders are supported, got: {}",
            placeholder
        )))
    }
}

fn convert_data_type(dt: &sql_ast::DataType) -> Result<DataType> {
    match dt {
        sql_ast::DataType::Int(_)
        | sql_ast::DataType::Integer(_)
        | sql_ast::DataType::BigInt(_) => Ok(DataType::Integer),

        sql_ast::DataType::Float(_)
        | sql_ast::DataType::Double(_)
        | sql_ast::DataType::Real => Ok(DataType::Float),

        sql_ast::DataType::Text
        | sql_ast::DataType::Varchar(_)
        | sql_ast::DataType::Char(_)
        | sql_ast::DataType::String(_) => Ok(DataType::Text),

        _ => Err(DbError::TypeMismatch(format!(
            "Unsupported data type: {}",
            dt
        ))),
    }
}

fn convert_binary_op(op: &sql_ast::BinaryOperator) -> Result<BinaryOp> {
    use sql_ast::BinaryOperator as SqlOp;

    match op {
        SqlOp::Eq => Ok(BinaryOp::Eq),
        SqlOp::NotEq => Ok(BinaryOp::NotEq),
        SqlOp::Lt => Ok(BinaryOp::Lt),
        SqlOp::LtEq => Ok(BinaryOp::LtEq),
        SqlOp::Gt => Ok(BinaryOp::Gt),
        SqlOp::GtEq => Ok(BinaryOp::GtEq),
        SqlOp::And => Ok(BinaryOp::And),
        SqlOp::Or => Ok(BinaryOp::Or),
        _ => Err(DbError::UnsupportedOperation(format!(
            "Unsupported binary operator: {}",
            op
        ))),
    }
}

fn extract_table_name(name: &sql_ast::ObjectName) -> Result<String> {
    name.0
        .last()
        .map(|ident| unquote(&ident.to_string()))
        .ok_or_else(|| DbError::ParseError("Invalid table name".into()))
}

fn unquote(name: &str) -> String {
    let trimmed = name.trim();
    let inner = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
        .unwrap_or(trimmed);
    inner.to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schema_batch() {
        let adapter = SqlParserAdapter::new();
        let stmts = adapter
            .parse(
                "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, data TEXT);
                 CREATE TABLE IF NOT EXISTS contract_types (id INTEGER PRIMARY KEY AUTOINCREMENT, data TEXT);",
            )
            .unwrap();

        assert_eq!(stmts.len(), 2);
        let Statement::CreateTable(users) = &stmts[0] else {
            panic!("Expected CreateTable");
        };
        assert!(users.if_not_exists);
        assert!(users.columns[0].primary_key);
        assert!(!users.columns[0].autoincrement);
        assert_eq!(users.columns[1].data_type, DataType::Text);

        let Statement::CreateTable(types) = &stmts[1] else {
            panic!("Expected CreateTable");
        };
        assert!(types.columns[0].autoincrement);
    }

    #[test]
    fn test_parse_insert_placeholders() {
        let adapter = SqlParserAdapter::new();
        let stmts = adapter
            .parse("INSERT INTO contracts (id, data) VALUES (?, ?)")
            .unwrap();

        let Statement::Insert(insert) = &stmts[0] else {
            panic!("Expected Insert");
        };
        assert_eq!(insert.table_name, "contracts");
        assert_eq!(insert.columns.as_deref(), Some(&["id".to_string(), "data".to_string()][..]));
        assert_eq!(insert.values[0], vec![Expr::Parameter(0), Expr::Parameter(1)]);
    }

    #[test]
    fn test_parse_select_with_order_and_limit() {
        let adapter = SqlParserAdapter::new();
        let stmts = adapter
            .parse("SELECT data FROM audit_log WHERE id > 10 ORDER BY id DESC LIMIT 5")
            .unwrap();

        let Statement::Query(query) = &stmts[0] else {
            panic!("Expected Query");
        };
        assert_eq!(query.from.as_deref(), Some("audit_log"));
        assert!(query.selection.is_some());
        assert_eq!(query.order_by.len(), 1);
        assert!(query.order_by[0].descending);
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_parse_transaction_control() {
        let adapter = SqlParserAdapter::new();
        assert_eq!(adapter.parse("BEGIN TRANSACTION").unwrap(), vec![Statement::Begin]);
        assert_eq!(adapter.parse("commit;").unwrap(), vec![Statement::Commit]);
        assert_eq!(adapter.parse("ROLLBACK").unwrap(), vec![Statement::Rollback]);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let adapter = SqlParserAdapter::new();
        let err = adapter.parse("SELEC data FROM users").unwrap_err();
        assert!(matches!(err, DbError::ParseError(_)));
    }
}
