//! JSON manifest: catalog, sources, import options and reports of one job

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ingest::{import_file, ColumnMapping, ImportOptions, ImportResult};
use crate::parser::{Delimiter, SourceFormat};
use crate::query::{CompiledQuery, Query, ResultSet};
use crate::schema::{Attribute, AttributeType, Catalog, EntityHandle, ForeignKey};
use crate::store::Store;

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignKeySpec {
    pub attribute: String,
    pub references: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntitySpec {
    pub name: String,
    pub attributes: Vec<AttributeSpec>,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeySpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    pub entity: String,
    /// Relative paths resolve against the manifest directory
    pub path: PathBuf,
    #[serde(default)]
    pub delimiter: Delimiter,
    /// Column names for files without a header line
    #[serde(default)]
    pub header: Option<Vec<String>>,
    /// Header name -> attribute name
    #[serde(default)]
    pub columns: ColumnMapping,
}

impl SourceSpec {
    pub fn format(&self) -> SourceFormat {
        SourceFormat {
            delimiter: self.delimiter,
            header: self.header.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Report {
    pub title: String,
    pub query: Query,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub entities: Vec<EntitySpec>,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    #[serde(default)]
    pub options: ImportOptions,
    #[serde(default)]
    pub reports: Vec<Report>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {:?}", path))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&text, base_dir)
            .with_context(|| format!("Failed to load manifest: {:?}", path))
    }

    pub fn parse(json: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut manifest: Manifest =
            serde_json::from_str(json).context("Failed to parse manifest JSON")?;
        manifest.base_dir = base_dir.into();
        Ok(manifest)
    }

    /// Build and validate the catalog
    pub fn catalog(&self) -> Result<Catalog> {
        let mut catalog = Catalog::new();

        for spec in &self.entities {
            let attributes = spec
                .attributes
                .iter()
                .map(|a| {
                    let attr_type = AttributeType::parse(&a.type_name, &a.name)?;
                    Ok(if a.nullable {
                        Attribute::new(&a.name, attr_type)
                    } else {
                        Attribute::required(&a.name, attr_type)
                    })
                })
                .collect::<crate::Result<Vec<_>>>()
                .with_context(|| format!("Invalid attributes for entity '{}'", spec.name))?;
            let primary_key: Vec<&str> = spec.primary_key.iter().map(String::as_str).collect();
            let foreign_keys = spec
                .foreign_keys
                .iter()
                .map(|fk| ForeignKey::new(&fk.attribute, &fk.references))
                .collect();

            catalog
                .define_entity(&spec.name, attributes, &primary_key, foreign_keys)
                .with_context(|| format!("Invalid entity '{}'", spec.name))?;
        }

        catalog.validate().context("Invalid catalog")?;
        Ok(catalog)
    }

    /// Compile every report against the catalog without running it
    pub fn check_reports(&self, catalog: &Catalog) -> Result<()> {
        for report in &self.reports {
            CompiledQuery::compile(catalog, &report.query)
                .with_context(|| format!("Invalid report '{}'", report.title))?;
        }
        Ok(())
    }

    /// Sources ordered so that parents are imported before their children
    pub fn ordered_sources(&self, catalog: &Catalog) -> Result<Vec<&SourceSpec>> {
        let order: Vec<EntityHandle> = catalog.dependency_order()?;
        let mut sources: Vec<(usize, &SourceSpec)> = self
            .sources
            .iter()
            .map(|source| {
                order
                    .iter()
                    .position(|e| e.name == source.entity)
                    .map(|rank| (rank, source))
                    .ok_or_else(|| crate::Error::UnknownEntity(source.entity.clone()))
            })
            .collect::<crate::Result<_>>()?;
        sources.sort_by_key(|(rank, _)| *rank);
        Ok(sources.into_iter().map(|(_, source)| source).collect())
    }

    pub fn source_path(&self, source: &SourceSpec) -> PathBuf {
        self.base_dir.join(&source.path)
    }

    /// Import every source, parents first
    pub fn import_all(
        &self,
        store: &mut Store,
        options: &ImportOptions,
    ) -> Result<Vec<(PathBuf, ImportResult)>> {
        let catalog = store.catalog().clone();
        let mut results = Vec::new();

        for source in self.ordered_sources(&catalog)? {
            let path = self.source_path(source);
            let result = import_file(
                store,
                &path,
                &source.format(),
                &source.entity,
                &source.columns,
                options,
            )
            .with_context(|| format!("Failed to import {:?} into '{}'", path, source.entity))?;
            results.push((path, result));
        }

        Ok(results)
    }

    pub fn run_reports(&self, store: &Store) -> Result<Vec<(&Report, ResultSet)>> {
        self.reports
            .iter()
            .map(|report| {
                let rows = store
                    .query(&report.query)
                    .with_context(|| format!("Report '{}' failed", report.title))?;
                Ok((report, rows))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "entities": [
            {
                "name": "employees",
                "attributes": [
                    {"name": "id", "type": "integer"},
                    {"name": "surname", "type": "text", "nullable": false},
                    {"name": "id_job_title", "type": "integer", "nullable": false}
                ],
                "primary_key": ["id"],
                "foreign_keys": [{"attribute": "id_job_title", "references": "job_titles"}]
            },
            {
                "name": "job_titles",
                "attributes": [
                    {"name": "id_job_title", "type": "INTEGER"},
                    {"name": "name", "type": "TEXT", "nullable": false}
                ],
                "primary_key": ["id_job_title"]
            }
        ],
        "sources": [
            {"entity": "employees", "path": "employees.csv"},
            {"entity": "job_titles", "path": "job_titles.txt", "delimiter": "pipe",
             "header": ["id_job_title", "name"]}
        ],
        "options": {"integrity": "strict"},
        "reports": [
            {
                "title": "Headcount",
                "query": {
                    "from": "employees",
                    "select": [{"name": "n", "aggregate": {"fn": "count_all"}}]
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_and_build_catalog() {
        let manifest = Manifest::parse(MANIFEST, "/data").unwrap();
        let catalog = manifest.catalog().unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(!catalog.resolve("employees").unwrap().attribute("id").unwrap().nullable);
        manifest.check_reports(&catalog).unwrap();
        assert_eq!(
            manifest.options.integrity,
            crate::ingest::IntegrityMode::Strict
        );
    }

    #[test]
    fn test_sources_are_ordered_parents_first() {
        let manifest = Manifest::parse(MANIFEST, "/data").unwrap();
        let catalog = manifest.catalog().unwrap();
        let sources = manifest.ordered_sources(&catalog).unwrap();
        assert_eq!(sources[0].entity, "job_titles");
        assert_eq!(sources[1].entity, "employees");
        assert_eq!(
            manifest.source_path(sources[0]),
            PathBuf::from("/data/job_titles.txt")
        );
        assert_eq!(sources[0].format().delimiter, Delimiter::Pipe);
    }

    #[test]
    fn test_unsupported_type() {
        let json = r#"{"entities": [{"name": "t", "primary_key": ["id"],
            "attributes": [{"name": "id", "type": "uuid"}]}]}"#;
        let manifest = Manifest::parse(json, ".").unwrap();
        let err = manifest.catalog().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::Error>(),
            Some(crate::Error::UnsupportedType { .. })
        ));
    }
}
