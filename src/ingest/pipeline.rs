use rusqlite::{params_from_iter, Transaction};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::mapping::{ColumnMapping, ColumnPlan};
use super::{ImportOptions, ImportResult, IntegrityMode};
use crate::error::{Error, Result};
use crate::parser::{Coercer, DelimitedSource, RawRow, Record, SourceFormat, Value};
use crate::schema::{EntityHandle, Relationship};
use crate::store::schema_gen::{generate_insert, generate_parent_lookup};
use crate::store::Store;

enum RowOutcome {
    Inserted { orphan: bool },
    Duplicate,
}

/// Everything needed to turn raw rows of one batch into inserts
struct BatchContext {
    entity: EntityHandle,
    plan: ColumnPlan,
    coercer: Coercer,
    integrity: IntegrityMode,
    insert_sql: String,
    /// (attribute index, lookup SQL, relationship) per foreign key
    parent_checks: Vec<(usize, String, Relationship)>,
}

impl BatchContext {
    fn new(
        store: &Store,
        entity: &str,
        header: &[String],
        mapping: &ColumnMapping,
        options: &ImportOptions,
    ) -> Result<Self> {
        let catalog = store.catalog();
        let entity = catalog.resolve(entity)?;
        let plan = ColumnPlan::build(&entity, header, mapping)?;

        let mut parent_checks = Vec::new();
        for fk in &entity.foreign_keys {
            let rel = catalog.relationship(&entity, fk)?;
            let idx = entity
                .attributes
                .iter()
                .position(|a| a.name == fk.attribute)
                .ok_or_else(|| Error::UnknownAttribute {
                    entity: entity.name.clone(),
                    attribute: fk.attribute.clone(),
                })?;
            parent_checks.push((idx, generate_parent_lookup(&rel), rel));
        }

        Ok(Self {
            insert_sql: generate_insert(&entity),
            entity,
            plan,
            coercer: Coercer::new(options.integer_policy),
            integrity: options.integrity,
            parent_checks,
        })
    }

    /// Coerce every mapped field; returns the record and the number of
    /// integer fallbacks applied
    fn build_record(&self, row: &RawRow) -> Result<(Record, u64)> {
        if row.fields.len() != self.plan.width {
            return Err(Error::MalformedRow {
                line: row.line,
                reason: format!(
                    "expected {} fields, found {}",
                    self.plan.width,
                    row.fields.len()
                ),
            });
        }

        let mut defaulted = 0;
        let mut values = Vec::with_capacity(self.entity.attributes.len());
        for (attr, slot) in self.entity.attributes.iter().zip(&self.plan.slots) {
            let value = match slot {
                Some(col) => {
                    let coerced = self.coercer.coerce_attribute(&row.fields[*col], attr)?;
                    if coerced.defaulted {
                        defaulted += 1;
                    }
                    coerced.value
                }
                None => Value::Null,
            };
            values.push(value);
        }

        Ok((
            Record {
                entity: self.entity.clone(),
                values,
            },
            defaulted,
        ))
    }

    fn insert(&self, tx: &Transaction, record: &Record) -> Result<RowOutcome> {
        let mut orphan = false;
        for (idx, sql, rel) in &self.parent_checks {
            let value = &record.values[*idx];
            if value.is_null() {
                continue;
            }
            if tx.prepare_cached(sql)?.exists([value])? {
                continue;
            }
            match self.integrity {
                IntegrityMode::Strict => {
                    return Err(Error::ReferentialIntegrityViolation {
                        entity: rel.child.clone(),
                        attribute: rel.attribute.clone(),
                        parent: rel.parent.clone(),
                        value: value.to_string(),
                    })
                }
                IntegrityMode::Permissive => {
                    tracing::warn!(
                        entity = %rel.child,
                        attribute = %rel.attribute,
                        value = %value,
                        "no matching {} record, inserting anyway",
                        rel.parent
                    );
                    orphan = true;
                }
            }
        }

        let changed = tx
            .prepare_cached(&self.insert_sql)?
            .execute(params_from_iter(record.values.iter()))?;

        if changed == 0 {
            tracing::debug!(
                entity = %self.entity.name,
                key = %record.key_display(),
                "primary key already present, ignoring row"
            );
            Ok(RowOutcome::Duplicate)
        } else {
            Ok(RowOutcome::Inserted { orphan })
        }
    }
}

/// Import one delimited source into `entity`.
///
/// Runs in a single transaction: either every accepted row becomes visible or,
/// when the source fails mid-way, none do. Rows that cannot be decoded or
/// coerced are skipped and counted; existing primary keys are ignored, so
/// re-importing the same source leaves the store unchanged.
pub fn import_batch<R: Read>(
    store: &mut Store,
    source: DelimitedSource<R>,
    entity: &str,
    mapping: &ColumnMapping,
    options: &ImportOptions,
) -> Result<ImportResult> {
    let ctx = BatchContext::new(store, entity, source.header(), mapping, options)?;
    let source_name = source.name().to_string();

    let tx = store.connection_mut().transaction()?;
    let mut result = ImportResult::default();

    for row in source {
        let outcome = row.and_then(|row| {
            let (record, defaulted) = ctx.build_record(&row)?;
            let outcome = ctx.insert(&tx, &record)?;
            Ok((outcome, defaulted))
        });

        match outcome {
            Ok((RowOutcome::Inserted { orphan }, defaulted)) => {
                result.inserted += 1;
                result.orphans += u64::from(orphan);
                result.defaulted += defaulted;
            }
            Ok((RowOutcome::Duplicate, defaulted)) => {
                result.duplicates += 1;
                result.defaulted += defaulted;
            }
            Err(err) if err.is_row_error() => {
                tracing::warn!(source = %source_name, error = %err, "skipping row");
                result.skipped += 1;
            }
            // Dropping the transaction rolls the batch back
            Err(err) => return Err(err),
        }
    }

    tx.commit()?;

    tracing::info!(
        source = %source_name,
        entity = %ctx.entity.name,
        inserted = result.inserted,
        skipped = result.skipped,
        duplicates = result.duplicates,
        orphans = result.orphans,
        defaulted = result.defaulted,
        "import complete"
    );

    Ok(result)
}

/// Open `path` and import it with [`import_batch`]. The file is closed when
/// the batch finishes, whatever the outcome.
pub fn import_file(
    store: &mut Store,
    path: &Path,
    format: &SourceFormat,
    entity: &str,
    mapping: &ColumnMapping,
    options: &ImportOptions,
) -> Result<ImportResult> {
    let file = File::open(path).map_err(|e| Error::source_unavailable(path, e))?;
    let source = DelimitedSource::new(path.display().to_string(), file, format)?;
    import_batch(store, source, entity, mapping, options)
}
