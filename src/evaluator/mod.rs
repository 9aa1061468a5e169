use crate::core::{DbError, Result, Row, Schema, Value};
use crate::parser::ast::{BinaryOp, Expr, UnaryOp};
use std::cmp::Ordering;

/// Scope an expression is evaluated in: an optional current row plus the
/// bound statement parameters.
pub struct EvaluationContext<'a> {
    row: Option<(&'a Schema, &'a Row)>,
    params: &'a [Value],
}

impl<'a> EvaluationContext<'a> {
    pub fn new(params: &'a [Value]) -> Self {
        Self { row: None, params }
    }

    pub fn with_row(schema: &'a Schema, row: &'a Row, params: &'a [Value]) -> Self {
        Self {
            row: Some((schema, row)),
            params,
        }
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(val) => Ok(val.clone()),
            Expr::Parameter(idx) => self.params.get(*idx).cloned().ok_or_else(|| {
                DbError::ExecutionError(format!(
                    "Missing value for parameter {} ({} bound)",
                    idx + 1,
                    self.params.len()
                ))
            }),
            Expr::Column(name) => {
                let (schema, row) = self.row.ok_or_else(|| {
                    DbError::ColumnNotFound(name.clone(), "<no table>".into())
                })?;
                let idx = schema
                    .find_column_index(name)
                    .ok_or_else(|| DbError::ColumnNotFound(name.clone(), "table".into()))?;
                row.get(idx).cloned().ok_or_else(|| {
                    DbError::ExecutionError(format!(
                        "Row has {} values, column '{}' is at {}",
                        row.len(),
                        name,
                        idx
                    ))
                })
            }
            Expr::IsNull { expr, negated } => {
                let is_null = self.evaluate(expr)?.is_null();
                Ok(truth(is_null != *negated))
            }
            Expr::UnaryOp { op, expr } => {
                let value = self.evaluate(expr)?;
                match (op, value) {
                    (_, Value::Null) => Ok(Value::Null),
                    (UnaryOp::Not, v) => Ok(truth(!v.as_bool())),
                    (UnaryOp::Minus, Value::Integer(i)) => Ok(Value::Integer(-i)),
                    (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Minus, v) => Err(DbError::TypeMismatch(format!(
                        "Cannot negate {}",
                        v.type_name()
                    ))),
                }
            }
            Expr::BinaryOp { left, op, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                evaluate_binary(&left, *op, &right)
            }
        }
    }

    /// WHERE semantics: NULL counts as false.
    pub fn matches(&self, expr: &Expr) -> Result<bool> {
        Ok(self.evaluate(expr)?.as_bool())
    }
}

fn truth(b: bool) -> Value {
    Value::Integer(i64::from(b))
}

fn evaluate_binary(left: &Value, op: BinaryOp, right: &Value) -> Result<Value> {
    match op {
        BinaryOp::And => {
            if (!left.is_null() && !left.as_bool()) || (!right.is_null() && !right.as_bool()) {
                return Ok(truth(false));
            }
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            Ok(truth(true))
        }
        BinaryOp::Or => {
            if left.as_bool() || right.as_bool() {
                return Ok(truth(true));
            }
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            Ok(truth(false))
        }
        _ => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            let ordering = left.compare(right)?;
            let result = match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::NotEq => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::LtEq => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::GtEq => ordering != Ordering::Less,
                BinaryOp::And | BinaryOp::Or => unreachable!("logical operators handled above"),
            };
            Ok(truth(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};

    fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    #[test]
    fn test_column_comparison_with_parameter() {
        let schema = Schema::new(vec![Column::new("id", DataType::Integer)]);
        let row = vec![Value::Integer(7)];
        let params = [Value::Integer(5)];
        let ctx = EvaluationContext::with_row(&schema, &row, &params);

        let expr = binary(Expr::Column("id".into()), BinaryOp::Gt, Expr::Parameter(0));
        assert!(ctx.matches(&expr).unwrap());
    }

    #[test]
    fn test_short_row_is_an_error() {
        let schema = Schema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("data", DataType::Text),
        ]);
        let row = vec![Value::Integer(1)];
        let ctx = EvaluationContext::with_row(&schema, &row, &[]);

        assert!(matches!(
            ctx.evaluate(&Expr::Column("data".into())),
            Err(DbError::ExecutionError(_))
        ));
    }

    #[test]
    fn test_null_comparison_is_not_a_match() {
        let ctx = EvaluationContext::new(&[]);
        let expr = binary(
            Expr::Literal(Value::Null),
            BinaryOp::Eq,
            Expr::Literal(Value::Null),
        );
        assert_eq!(ctx.evaluate(&expr).unwrap(), Value::Null);
        assert!(!ctx.matches(&expr).unwrap());

        let or = binary(
            Expr::Literal(Value::Null),
            BinaryOp::Or,
            Expr::Literal(Value::Integer(1)),
        );
        assert!(ctx.matches(&or).unwrap());
    }

    #[test]
    fn test_missing_parameter_errors() {
        let ctx = EvaluationContext::new(&[]);
        assert!(ctx.evaluate(&Expr::Parameter(0)).is_err());
    }
}
