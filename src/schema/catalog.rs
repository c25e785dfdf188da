//! Runtime registry of entity definitions

use std::collections::HashMap;
use std::sync::Arc;

use super::dependencies::DependencyResolver;
use super::types::{Attribute, Entity, ForeignKey};
use crate::error::{Error, Result};

/// Shared, immutable handle to a registered entity
pub type EntityHandle = Arc<Entity>;

/// A resolved foreign-key relationship: `child.attribute -> parent.parent_key`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub child: String,
    pub attribute: String,
    pub parent: String,
    pub parent_key: String,
}

/// Set of entity declarations, in definition order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: Vec<EntityHandle>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new entity. Foreign keys may reference entities that are
    /// defined later; [`Catalog::validate`] checks them once all are present.
    pub fn define_entity(
        &mut self,
        name: &str,
        attributes: Vec<Attribute>,
        primary_key: &[&str],
        foreign_keys: Vec<ForeignKey>,
    ) -> Result<EntityHandle> {
        if self.index.contains_key(name) {
            return Err(Error::DuplicateEntity(name.to_string()));
        }

        let entity = Arc::new(Entity::new(name, attributes, primary_key, foreign_keys)?);
        self.index.insert(entity.name.clone(), self.entities.len());
        self.entities.push(Arc::clone(&entity));
        Ok(entity)
    }

    pub fn resolve(&self, name: &str) -> Result<EntityHandle> {
        self.get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&EntityHandle> {
        self.index.get(name).map(|&idx| &self.entities[idx])
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityHandle> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Resolve a foreign key of `entity` against its parent's primary key.
    pub fn relationship(&self, entity: &Entity, fk: &ForeignKey) -> Result<Relationship> {
        let parent = self.resolve(&fk.references)?;
        let child_attr = entity.require_attribute(&fk.attribute)?;

        let [parent_key] = parent.primary_key.as_slice() else {
            return Err(Error::InvalidSchema(format!(
                "{}.{} references '{}', which has a composite primary key",
                entity.name, fk.attribute, parent.name
            )));
        };
        let key_attr = parent.require_attribute(parent_key)?;
        if key_attr.attr_type != child_attr.attr_type {
            return Err(Error::InvalidSchema(format!(
                "{}.{} is {} but {}.{} is {}",
                entity.name,
                fk.attribute,
                child_attr.attr_type,
                parent.name,
                parent_key,
                key_attr.attr_type
            )));
        }

        Ok(Relationship {
            child: entity.name.clone(),
            attribute: fk.attribute.clone(),
            parent: parent.name.clone(),
            parent_key: parent_key.clone(),
        })
    }

    /// Check every relationship and that the dependency graph has no cycles
    pub fn validate(&self) -> Result<()> {
        for entity in &self.entities {
            for fk in &entity.foreign_keys {
                self.relationship(entity, fk)?;
            }
        }
        self.dependency_order().map(|_| ())
    }

    /// All relationships linking `a` and `b`, in either direction
    pub fn relationships_between(&self, a: &str, b: &str) -> Result<Vec<Relationship>> {
        let mut found = Vec::new();
        for (child, parent) in [(a, b), (b, a)] {
            let entity = self.resolve(child)?;
            for fk in entity.foreign_keys.iter().filter(|fk| fk.references == parent) {
                let rel = self.relationship(&entity, fk)?;
                if !found.contains(&rel) {
                    found.push(rel);
                }
            }
        }
        Ok(found)
    }

    /// Entities ordered parents before children
    pub fn dependency_order(&self) -> Result<Vec<EntityHandle>> {
        DependencyResolver::new(self).ordered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeType;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .define_entity(
                "employees",
                vec![
                    Attribute::required("id", AttributeType::Integer),
                    Attribute::required("surname", AttributeType::Text),
                    Attribute::required("id_job_title", AttributeType::Integer),
                ],
                &["id"],
                vec![ForeignKey::new("id_job_title", "job_titles")],
            )
            .unwrap();
        catalog
            .define_entity(
                "job_titles",
                vec![
                    Attribute::required("id_job_title", AttributeType::Integer),
                    Attribute::required("name", AttributeType::Text),
                ],
                &["id_job_title"],
                vec![],
            )
            .unwrap();
        catalog
    }

    #[test]
    fn test_duplicate_entity() {
        let mut catalog = catalog();
        let result = catalog.define_entity(
            "employees",
            vec![Attribute::required("id", AttributeType::Integer)],
            &["id"],
            vec![],
        );
        assert!(matches!(result, Err(Error::DuplicateEntity(name)) if name == "employees"));
    }

    #[test]
    fn test_resolve() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("job_titles").unwrap().name, "job_titles");
        assert!(matches!(
            catalog.resolve("departments"),
            Err(Error::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_forward_reference_validates() {
        let catalog = catalog();
        catalog.validate().unwrap();

        let rels = catalog.relationships_between("job_titles", "employees").unwrap();
        assert_eq!(
            rels,
            vec![Relationship {
                child: "employees".into(),
                attribute: "id_job_title".into(),
                parent: "job_titles".into(),
                parent_key: "id_job_title".into(),
            }]
        );
    }

    #[test]
    fn test_dangling_reference() {
        let mut catalog = Catalog::new();
        catalog
            .define_entity(
                "move",
                vec![
                    Attribute::required("id", AttributeType::Integer),
                    Attribute::new("shop_id", AttributeType::Text),
                ],
                &["id"],
                vec![ForeignKey::new("shop_id", "shop")],
            )
            .unwrap();
        assert!(matches!(catalog.validate(), Err(Error::UnknownEntity(name)) if name == "shop"));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut catalog = Catalog::new();
        catalog
            .define_entity(
                "shop",
                vec![Attribute::required("id", AttributeType::Text)],
                &["id"],
                vec![],
            )
            .unwrap();
        catalog
            .define_entity(
                "move",
                vec![
                    Attribute::required("id", AttributeType::Integer),
                    Attribute::new("shop_id", AttributeType::Integer),
                ],
                &["id"],
                vec![ForeignKey::new("shop_id", "shop")],
            )
            .unwrap();
        assert!(matches!(catalog.validate(), Err(Error::InvalidSchema(_))));
    }
}
