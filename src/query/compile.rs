use std::collections::HashSet;

use chrono::Datelike;

use super::expr::{Aggregate, ColumnRef, CompareOp, Expr, Predicate};
use super::{JoinKind, Query, Selection};
use crate::error::{Error, Result};
use crate::parser::Value;
use crate::schema::{Catalog, EntityHandle};
use crate::store::schema_gen::quote_ident;
use crate::store::CALENDAR_DAY_FN;

/// SQL text, its positional parameters and the output column names
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub columns: Vec<String>,
}

/// Entities visible to column references
struct Scope {
    entities: Vec<EntityHandle>,
}

impl Scope {
    fn contains(&self, entity: &str) -> bool {
        self.entities.iter().any(|e| e.name == entity)
    }

    fn column(&self, column: &ColumnRef) -> Result<String> {
        let entity = self
            .entities
            .iter()
            .find(|e| e.name == column.entity)
            .ok_or_else(|| {
                Error::InvalidQuery(format!(
                    "'{}' refers to an entity that is not part of the query",
                    column
                ))
            })?;
        entity.require_attribute(&column.attribute)?;
        Ok(format!(
            "{}.{}",
            quote_ident(&column.entity),
            quote_ident(&column.attribute)
        ))
    }
}

/// Appends SQL text and keeps parameters in textual order
#[derive(Default)]
struct SqlWriter {
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn param(&mut self, value: Value) {
        self.sql.push('?');
        self.params.push(value);
    }

    fn expr(&mut self, scope: &Scope, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Column(column) => self.push(&scope.column(column)?),
            Expr::Literal(Value::Null) => self.push("NULL"),
            Expr::Literal(value) => self.param(value.clone()),
            Expr::Add(lhs, rhs) => self.binary(scope, lhs, " + ", rhs)?,
            Expr::Sub(lhs, rhs) => self.binary(scope, lhs, " - ", rhs)?,
            Expr::Mul(lhs, rhs) => self.binary(scope, lhs, " * ", rhs)?,
            // Scaling by 1.0 keeps integer operands from truncating
            Expr::Div(lhs, rhs) => self.binary(scope, lhs, " * 1.0 / ", rhs)?,
            Expr::Case { arms, otherwise } => {
                if arms.is_empty() {
                    return self.expr(scope, otherwise);
                }
                self.push("CASE");
                for arm in arms {
                    self.push(" WHEN ");
                    self.predicate(scope, &arm.when)?;
                    self.push(" THEN ");
                    self.expr(scope, &arm.then)?;
                }
                self.push(" ELSE ");
                self.expr(scope, otherwise)?;
                self.push(" END");
            }
        }
        Ok(())
    }

    fn binary(&mut self, scope: &Scope, lhs: &Expr, op: &str, rhs: &Expr) -> Result<()> {
        self.push("(");
        self.expr(scope, lhs)?;
        self.push(op);
        self.expr(scope, rhs)?;
        self.push(")");
        Ok(())
    }

    fn predicate(&mut self, scope: &Scope, predicate: &Predicate) -> Result<()> {
        match predicate {
            Predicate::Compare { expr, op, value } => {
                self.push("(");
                self.expr(scope, expr)?;
                self.push(")");
                self.comparison(*op, value)?;
            }
            Predicate::Contains { column, pattern } => {
                // instr() is case-sensitive, unlike LIKE
                self.push("instr(");
                self.push(&scope.column(column)?);
                self.push(", ");
                self.param(Value::Text(pattern.clone()));
                self.push(") > 0");
            }
            Predicate::DateBetween { column, from, to } => {
                self.push(CALENDAR_DAY_FN);
                self.push("(");
                self.push(&scope.column(column)?);
                self.push(") BETWEEN ");
                self.param(Value::Integer(i64::from(from.num_days_from_ce())));
                self.push(" AND ");
                self.param(Value::Integer(i64::from(to.num_days_from_ce())));
            }
            Predicate::IsNull { column } => {
                self.push(&scope.column(column)?);
                self.push(" IS NULL");
            }
            Predicate::IsNotNull { column } => {
                self.push(&scope.column(column)?);
                self.push(" IS NOT NULL");
            }
        }
        Ok(())
    }

    /// ` <op> ?`, or a null test when comparing with null
    fn comparison(&mut self, op: CompareOp, value: &Value) -> Result<()> {
        match (op, value) {
            (CompareOp::Eq, Value::Null) => self.push(" IS NULL"),
            (CompareOp::Ne, Value::Null) => self.push(" IS NOT NULL"),
            (_, Value::Null) => {
                return Err(Error::InvalidQuery(format!(
                    "'{}' cannot compare with null",
                    op.sql()
                )))
            }
            _ => {
                self.push(" ");
                self.push(op.sql());
                self.push(" ");
                self.param(value.clone());
            }
        }
        Ok(())
    }

    fn aggregate(&mut self, scope: &Scope, aggregate: &Aggregate) -> Result<()> {
        let (open, expr, close) = match aggregate {
            Aggregate::CountAll => {
                self.push("COUNT(*)");
                return Ok(());
            }
            Aggregate::Count { expr } => ("COUNT(", expr, ")".to_string()),
            Aggregate::CountDistinct { expr } => ("COUNT(DISTINCT ", expr, ")".to_string()),
            Aggregate::Sum { expr } => ("SUM(", expr, ")".to_string()),
            Aggregate::Min { expr } => ("MIN(", expr, ")".to_string()),
            Aggregate::Max { expr } => ("MAX(", expr, ")".to_string()),
            Aggregate::Avg { expr, digits } => ("ROUND(AVG(", expr, format!("), {})", digits)),
        };
        self.push(open);
        self.expr(scope, expr)?;
        self.push(&close);
        Ok(())
    }

    fn selection(&mut self, scope: &Scope, selection: &Selection) -> Result<()> {
        match selection {
            Selection::Expr(expr) => self.expr(scope, expr),
            Selection::Aggregate(aggregate) => self.aggregate(scope, aggregate),
        }
    }
}

impl CompiledQuery {
    pub fn compile(catalog: &Catalog, query: &Query) -> Result<Self> {
        let base = catalog.resolve(&query.from)?;
        let base_name = quote_ident(&base.name);
        let mut scope = Scope {
            entities: vec![base],
        };

        let joins = resolve_joins(catalog, query, &mut scope)?;
        check_outputs(query)?;

        let grouped = query.is_grouped();
        if grouped {
            for projection in &query.select {
                if let Selection::Expr(expr) = &projection.value {
                    if !query.group_by.contains(expr) {
                        return Err(Error::InvalidQuery(format!(
                            "output '{}' is neither aggregated nor grouped",
                            projection.name
                        )));
                    }
                }
            }
        } else if !query.having.is_empty() {
            return Err(Error::InvalidQuery(
                "having needs a grouped or aggregated query".to_string(),
            ));
        }

        let mut w = SqlWriter::default();

        w.push("SELECT ");
        for (idx, projection) in query.select.iter().enumerate() {
            if idx > 0 {
                w.push(", ");
            }
            w.selection(&scope, &projection.value)?;
            w.push(" AS ");
            w.push(&quote_ident(&projection.name));
        }

        w.push(" FROM ");
        w.push(&base_name);
        for join in &joins {
            w.push(join);
        }

        for (idx, predicate) in query.filters.iter().enumerate() {
            w.push(if idx == 0 { " WHERE " } else { " AND " });
            w.predicate(&scope, predicate)?;
        }

        for (idx, expr) in query.group_by.iter().enumerate() {
            w.push(if idx == 0 { " GROUP BY " } else { ", " });
            w.expr(&scope, expr)?;
        }

        for (idx, having) in query.having.iter().enumerate() {
            let projection = query
                .select
                .iter()
                .find(|p| p.name == having.output)
                .ok_or_else(|| unknown_output(&having.output))?;
            w.push(if idx == 0 { " HAVING " } else { " AND " });
            w.push("(");
            w.selection(&scope, &projection.value)?;
            w.push(")");
            w.comparison(having.op, &having.value)?;
        }

        w.push(" ORDER BY ");
        for key in &query.order_by {
            let position = query
                .select
                .iter()
                .position(|p| p.name == key.output)
                .ok_or_else(|| unknown_output(&key.output))?;
            w.push(&(position + 1).to_string());
            if key.descending {
                w.push(" DESC");
            }
            w.push(", ");
        }
        // Ties fall back to insertion order, base entity first
        if grouped {
            w.push(&format!("MIN({}.rowid)", base_name));
        } else {
            let rowids: Vec<String> = scope
                .entities
                .iter()
                .map(|e| format!("{}.rowid", quote_ident(&e.name)))
                .collect();
            w.push(&rowids.join(", "));
        }

        if let Some(limit) = query.limit {
            w.push(&format!(" LIMIT {}", limit));
        }

        Ok(Self {
            sql: w.sql,
            params: w.params,
            columns: query.select.iter().map(|p| p.name.clone()).collect(),
        })
    }
}

fn unknown_output(name: &str) -> Error {
    Error::InvalidQuery(format!("no output column named '{}'", name))
}

fn check_outputs(query: &Query) -> Result<()> {
    if query.select.is_empty() {
        return Err(Error::InvalidQuery("query selects no outputs".to_string()));
    }
    let mut seen = HashSet::new();
    for projection in &query.select {
        if projection.name.is_empty() || !seen.insert(projection.name.as_str()) {
            return Err(Error::InvalidQuery(format!(
                "output name '{}' is empty or used twice",
                projection.name
            )));
        }
    }
    Ok(())
}

/// Resolve each join against the relationships of entities already in
/// scope, returning the JOIN clauses in order
fn resolve_joins(catalog: &Catalog, query: &Query, scope: &mut Scope) -> Result<Vec<String>> {
    let mut clauses = Vec::new();

    for join in &query.joins {
        let target = catalog.resolve(&join.entity)?;
        if scope.contains(&target.name) {
            return Err(Error::InvalidQuery(format!(
                "entity '{}' is joined more than once",
                target.name
            )));
        }

        let mut candidates = Vec::new();
        for in_scope in &scope.entities {
            for rel in catalog.relationships_between(&in_scope.name, &target.name)? {
                if join.via.as_deref().map_or(true, |via| via == rel.attribute) {
                    candidates.push(rel);
                }
            }
        }

        let rel = match candidates.as_slice() {
            [rel] => rel,
            [] => {
                return Err(Error::InvalidQuery(format!(
                    "no relationship links '{}' to the entities already joined",
                    target.name
                )))
            }
            _ => {
                return Err(Error::InvalidQuery(format!(
                    "more than one relationship links '{}'; pick one with 'via'",
                    target.name
                )))
            }
        };

        let keyword = match join.kind {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        clauses.push(format!(
            " {} {} ON {}.{} = {}.{}",
            keyword,
            quote_ident(&target.name),
            quote_ident(&rel.child),
            quote_ident(&rel.attribute),
            quote_ident(&rel.parent),
            quote_ident(&rel.parent_key)
        ));
        scope.entities.push(target);
    }

    Ok(clauses)
}
