use super::catalog::{Catalog, EntityHandle};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Resolves entity dependencies for table creation and import order
pub struct DependencyResolver<'a> {
    catalog: &'a Catalog,
    /// Map of entity name -> entities it depends on
    deps: HashMap<&'a str, HashSet<&'a str>>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        let deps = catalog
            .entities()
            .map(|entity| (entity.name.as_str(), entity.dependencies()))
            .collect();

        Self { catalog, deps }
    }

    /// Return all entities in dependency order (parents before children).
    /// Entities without a mutual dependency keep their definition order.
    pub fn ordered(&self) -> Result<Vec<EntityHandle>> {
        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut temp_visited: HashSet<&str> = HashSet::new();

        for entity in self.catalog.entities() {
            if !visited.contains(entity.name.as_str()) {
                self.visit(&entity.name, &mut visited, &mut temp_visited, &mut result)?;
            }
        }

        Ok(result)
    }

    fn visit(
        &self,
        name: &'a str,
        visited: &mut HashSet<&'a str>,
        temp_visited: &mut HashSet<&'a str>,
        result: &mut Vec<EntityHandle>,
    ) -> Result<()> {
        if temp_visited.contains(name) {
            return Err(Error::InvalidSchema(format!(
                "circular dependency detected at: {}",
                name
            )));
        }
        if visited.contains(name) {
            return Ok(());
        }

        temp_visited.insert(name);

        if let Some(deps) = self.deps.get(name) {
            // Sort for a deterministic order among sibling parents
            let mut deps: Vec<&str> = deps.iter().copied().collect();
            deps.sort_by_key(|dep| self.position(dep));
            for dep in deps {
                // Skip self-references (e.g. categories.parent_id -> categories)
                if dep != name {
                    self.visit(dep, visited, temp_visited, result)?;
                }
            }
        }

        temp_visited.remove(name);
        visited.insert(name);
        result.push(self.catalog.resolve(name)?);

        Ok(())
    }

    fn position(&self, name: &str) -> usize {
        self.catalog
            .entities()
            .position(|e| e.name == name)
            .unwrap_or(usize::MAX)
    }
}
