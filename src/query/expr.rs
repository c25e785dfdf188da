//! Column references, scalar expressions, predicates and aggregates

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::fmt;

use crate::parser::{parse_date, Value};

/// `entity.attribute`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct ColumnRef {
    pub entity: String,
    pub attribute: String,
}

impl ColumnRef {
    pub fn new(entity: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
        }
    }
}

/// Shorthand for [`ColumnRef::new`]
pub fn col(entity: &str, attribute: &str) -> ColumnRef {
    ColumnRef::new(entity, attribute)
}

impl TryFrom<String> for ColumnRef {
    type Error = String;

    /// Splits at the first `.`; entity names never contain one
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.split_once('.') {
            Some((entity, attribute)) if !entity.is_empty() && !attribute.is_empty() => {
                Ok(Self::new(entity, attribute))
            }
            _ => Err(format!(
                "column reference '{}' must look like entity.attribute",
                value
            )),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.attribute)
    }
}

/// Scalar expression evaluated per row
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    /// Always decimal division
    Div(Box<Expr>, Box<Expr>),
    /// First arm whose predicate holds, else `otherwise`
    Case {
        arms: Vec<CaseArm>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaseArm {
    pub when: Predicate,
    pub then: Expr,
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn add(self, rhs: impl Into<Expr>) -> Self {
        Expr::Add(Box::new(self), Box::new(rhs.into()))
    }

    pub fn sub(self, rhs: impl Into<Expr>) -> Self {
        Expr::Sub(Box::new(self), Box::new(rhs.into()))
    }

    pub fn mul(self, rhs: impl Into<Expr>) -> Self {
        Expr::Mul(Box::new(self), Box::new(rhs.into()))
    }

    pub fn div(self, rhs: impl Into<Expr>) -> Self {
        Expr::Div(Box::new(self), Box::new(rhs.into()))
    }

    pub fn case(arms: Vec<(Predicate, Expr)>, otherwise: impl Into<Expr>) -> Self {
        Expr::Case {
            arms: arms
                .into_iter()
                .map(|(when, then)| CaseArm { when, then })
                .collect(),
            otherwise: Box::new(otherwise.into()),
        }
    }
}

impl From<ColumnRef> for Expr {
    fn from(column: ColumnRef) -> Self {
        Expr::Column(column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Row filter; a query's filters are combined with AND
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        expr: Expr,
        op: CompareOp,
        value: Value,
    },
    /// Case-sensitive substring match
    Contains { column: ColumnRef, pattern: String },
    /// Closed range over `DD.MM.YYYY` text, compared as calendar dates
    DateBetween {
        column: ColumnRef,
        #[serde(deserialize_with = "day_first_date")]
        from: NaiveDate,
        #[serde(deserialize_with = "day_first_date")]
        to: NaiveDate,
    },
    IsNull { column: ColumnRef },
    IsNotNull { column: ColumnRef },
}

impl Predicate {
    pub fn eq(column: ColumnRef, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn compare(expr: impl Into<Expr>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            expr: expr.into(),
            op,
            value: value.into(),
        }
    }

    pub fn contains(column: ColumnRef, pattern: impl Into<String>) -> Self {
        Predicate::Contains {
            column,
            pattern: pattern.into(),
        }
    }

    pub fn date_between(column: ColumnRef, from: NaiveDate, to: NaiveDate) -> Self {
        Predicate::DateBetween { column, from, to }
    }

    pub fn is_null(column: ColumnRef) -> Self {
        Predicate::IsNull { column }
    }

    pub fn is_not_null(column: ColumnRef) -> Self {
        Predicate::IsNotNull { column }
    }
}

fn day_first_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("'{}' is not a DD.MM.YYYY date", raw)))
}

fn default_digits() -> u32 {
    1
}

/// Aggregate function over the rows of a group
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "fn", rename_all = "snake_case")]
pub enum Aggregate {
    /// COUNT(*)
    CountAll,
    /// Non-null values only
    Count { expr: Expr },
    CountDistinct { expr: Expr },
    Sum { expr: Expr },
    Min { expr: Expr },
    Max { expr: Expr },
    /// Average rounded to `digits` fractional digits
    Avg {
        expr: Expr,
        #[serde(default = "default_digits")]
        digits: u32,
    },
}

impl Aggregate {
    pub fn count(expr: impl Into<Expr>) -> Self {
        Aggregate::Count { expr: expr.into() }
    }

    pub fn count_distinct(expr: impl Into<Expr>) -> Self {
        Aggregate::CountDistinct { expr: expr.into() }
    }

    pub fn sum(expr: impl Into<Expr>) -> Self {
        Aggregate::Sum { expr: expr.into() }
    }

    pub fn min(expr: impl Into<Expr>) -> Self {
        Aggregate::Min { expr: expr.into() }
    }

    pub fn max(expr: impl Into<Expr>) -> Self {
        Aggregate::Max { expr: expr.into() }
    }

    pub fn avg(expr: impl Into<Expr>, digits: u32) -> Self {
        Aggregate::Avg {
            expr: expr.into(),
            digits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_ref_from_string() {
        let column = ColumnRef::try_from("move.Количество упаковок, шт".to_string()).unwrap();
        assert_eq!(column, col("move", "Количество упаковок, шт"));
        assert!(ColumnRef::try_from("no_entity".to_string()).is_err());
        assert!(ColumnRef::try_from(".x".to_string()).is_err());
    }

    #[test]
    fn test_expr_from_json() {
        let expr: Expr = serde_json::from_str(
            r#"{"mul": [
                {"column": "move.qty"},
                {"case": {
                    "arms": [{"when": {"compare": {"expr": {"column": "product.unit"}, "op": "=", "value": "грамм"}},
                              "then": {"div": [{"column": "product.size"}, {"literal": 1000}]}}],
                    "otherwise": {"column": "product.size"}
                }}
            ]}"#,
        )
        .unwrap();

        let expected = Expr::from(col("move", "qty")).mul(Expr::case(
            vec![(
                Predicate::eq(col("product", "unit"), "грамм"),
                Expr::from(col("product", "size")).div(Expr::lit(1000)),
            )],
            col("product", "size"),
        ));
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_predicates_from_json() {
        let predicate: Predicate = serde_json::from_str(
            r#"{"date_between": {"column": "move.Дата", "from": "02.08.2023", "to": "10.08.2023"}}"#,
        )
        .unwrap();
        assert_eq!(
            predicate,
            Predicate::date_between(
                col("move", "Дата"),
                NaiveDate::from_ymd_opt(2023, 8, 2).unwrap(),
                NaiveDate::from_ymd_opt(2023, 8, 10).unwrap(),
            )
        );

        let bad = serde_json::from_str::<Predicate>(
            r#"{"date_between": {"column": "move.Дата", "from": "2023-08-02", "to": "10.08.2023"}}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_aggregates_from_json() {
        let agg: Aggregate =
            serde_json::from_str(r#"{"fn": "avg", "expr": {"column": "students.score"}}"#).unwrap();
        assert_eq!(agg, Aggregate::avg(col("students", "score"), 1));

        let agg: Aggregate = serde_json::from_str(r#"{"fn": "count_all"}"#).unwrap();
        assert_eq!(agg, Aggregate::CountAll);
    }
}
