//! Declarative analytic queries over a populated store.
//!
//! A [`Query`] composes joins along catalog relationships, row filters,
//! grouping with aggregates, post-aggregation filters, ordering and a row
//! cap. Queries are compiled to SQL against the store and never modify it,
//! so running the same query twice yields the same [`ResultSet`].
//!
//! ```ignore
//! let by_title = Query::from_entity("job_titles")
//!     .join(Join::left("employees"))
//!     .group_by(col("job_titles", "name"))
//!     .select("title", col("job_titles", "name"))
//!     .aggregate("employees", Aggregate::count(col("employees", "id")))
//!     .order_by_desc("employees");
//! let rows = store.query(&by_title)?;
//! ```

mod compile;
pub mod expr;
mod result;

pub use compile::CompiledQuery;
pub use expr::*;
pub use result::{ResultRow, ResultSet};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::parser::Value;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// Unmatched rows are dropped
    #[default]
    Inner,
    /// Rows of the entities already in scope are kept, with nulls
    Left,
}

/// Equi-join of another entity along a catalog relationship
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Join {
    pub entity: String,
    #[serde(default)]
    pub kind: JoinKind,
    /// Foreign-key attribute to join on, when more than one relationship
    /// links the entity to those already in scope
    #[serde(default)]
    pub via: Option<String>,
}

impl Join {
    pub fn inner(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            kind: JoinKind::Inner,
            via: None,
        }
    }

    pub fn left(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            kind: JoinKind::Left,
            via: None,
        }
    }

    pub fn via(mut self, attribute: &str) -> Self {
        self.via = Some(attribute.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Expr(Expr),
    Aggregate(Aggregate),
}

/// Named output column
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ProjectionSpec")]
pub struct Projection {
    pub name: String,
    pub value: Selection,
}

#[derive(Deserialize)]
struct ProjectionSpec {
    name: String,
    #[serde(default)]
    expr: Option<Expr>,
    #[serde(default)]
    aggregate: Option<Aggregate>,
}

impl TryFrom<ProjectionSpec> for Projection {
    type Error = String;

    fn try_from(spec: ProjectionSpec) -> std::result::Result<Self, Self::Error> {
        let value = match (spec.expr, spec.aggregate) {
            (Some(expr), None) => Selection::Expr(expr),
            (None, Some(agg)) => Selection::Aggregate(agg),
            _ => {
                return Err(format!(
                    "output '{}' needs exactly one of 'expr' or 'aggregate'",
                    spec.name
                ))
            }
        };
        Ok(Self {
            name: spec.name,
            value,
        })
    }
}

/// Post-aggregation filter on a named output
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Having {
    pub output: String,
    pub op: CompareOp,
    pub value: Value,
}

/// Sort key on a named output
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderKey {
    pub output: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Query {
    pub from: String,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default, rename = "where")]
    pub filters: Vec<Predicate>,
    #[serde(default)]
    pub group_by: Vec<Expr>,
    pub select: Vec<Projection>,
    #[serde(default)]
    pub having: Vec<Having>,
    #[serde(default)]
    pub order_by: Vec<OrderKey>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    pub fn from_entity(entity: &str) -> Self {
        Self {
            from: entity.to_string(),
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            select: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Groups of `entity` records sharing the same values of `attributes`
    /// more than once, with their size in a `count` column, largest first.
    pub fn duplicates(entity: &str, attributes: &[&str]) -> Self {
        let mut query = Query::from_entity(entity);
        for attr in attributes {
            query = query
                .group_by(col(entity, attr))
                .select(attr, col(entity, attr));
        }
        query
            .aggregate("count", Aggregate::CountAll)
            .having("count", CompareOp::Gt, 1)
            .order_by_desc("count")
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    pub fn group_by(mut self, expr: impl Into<Expr>) -> Self {
        self.group_by.push(expr.into());
        self
    }

    pub fn select(mut self, name: &str, expr: impl Into<Expr>) -> Self {
        self.select.push(Projection {
            name: name.to_string(),
            value: Selection::Expr(expr.into()),
        });
        self
    }

    pub fn aggregate(mut self, name: &str, aggregate: Aggregate) -> Self {
        self.select.push(Projection {
            name: name.to_string(),
            value: Selection::Aggregate(aggregate),
        });
        self
    }

    pub fn having(mut self, output: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        self.having.push(Having {
            output: output.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, output: &str) -> Self {
        self.order_by.push(OrderKey {
            output: output.to_string(),
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, output: &str) -> Self {
        self.order_by.push(OrderKey {
            output: output.to_string(),
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
            || self
                .select
                .iter()
                .any(|p| matches!(p.value, Selection::Aggregate(_)))
    }
}

impl Store {
    /// Run a query against the current store contents
    pub fn query(&self, query: &Query) -> Result<ResultSet> {
        let compiled = CompiledQuery::compile(self.catalog(), query)?;
        tracing::debug!(sql = %compiled.sql, "running query");

        let mut stmt = self.connection().prepare(&compiled.sql)?;
        let width = compiled.columns.len();
        let mut rows = stmt.query(rusqlite::params_from_iter(compiled.params.iter()))?;

        let mut result = ResultSet::new(compiled.columns.clone());
        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|idx| row.get_ref(idx).map(Value::from))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            result.push(values);
        }
        Ok(result)
    }

    /// Shorthand for running [`Query::duplicates`]
    pub fn duplicates(&self, entity: &str, attributes: &[&str]) -> Result<ResultSet> {
        if attributes.is_empty() {
            return Err(Error::InvalidQuery(
                "duplicate detection needs at least one attribute".to_string(),
            ));
        }
        self.query(&Query::duplicates(entity, attributes))
    }
}
