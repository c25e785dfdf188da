use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};

/// Semantic type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Integer,
    Decimal,
    Text,
}

impl AttributeType {
    /// Parse a type name from configuration, e.g. `"integer"` or `"REAL"`.
    pub fn parse(type_name: &str, column: &str) -> Result<Self> {
        match type_name.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(AttributeType::Integer),
            "decimal" | "real" | "float" => Ok(AttributeType::Decimal),
            "text" | "varchar" | "string" => Ok(AttributeType::Text),
            _ => Err(Error::UnsupportedType {
                column: column.to_string(),
                type_name: type_name.to_string(),
            }),
        }
    }

    /// SQLite column type
    pub fn sql_type(self) -> &'static str {
        match self {
            AttributeType::Integer => "INTEGER",
            AttributeType::Decimal => "REAL",
            AttributeType::Text => "TEXT",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Integer => write!(f, "integer"),
            AttributeType::Decimal => write!(f, "decimal"),
            AttributeType::Text => write!(f, "text"),
        }
    }
}

/// Attribute definition
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub attr_type: AttributeType,
    pub nullable: bool,
}

impl Attribute {
    /// Create an optional (nullable) attribute
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            nullable: true,
        }
    }

    /// Create a required (non-nullable) attribute
    pub fn required(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            nullable: false,
        }
    }
}

/// Foreign key reference to the primary key of `references`
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub attribute: String,
    pub references: String,
}

impl ForeignKey {
    pub fn new(attribute: impl Into<String>, references: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            references: references.into(),
        }
    }
}

/// Entity (table) definition
#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Entity {
    /// Build an entity, checking that it is internally consistent.
    /// Relationships to other entities are checked by the catalog.
    pub fn new(
        name: impl Into<String>,
        mut attributes: Vec<Attribute>,
        primary_key: &[&str],
        foreign_keys: Vec<ForeignKey>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() || name.contains('.') {
            return Err(Error::InvalidSchema(format!(
                "entity name '{}' must be non-empty and must not contain '.'",
                name
            )));
        }

        let mut seen = HashSet::new();
        for attr in &attributes {
            if !seen.insert(attr.name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "attribute '{}' is declared twice in '{}'",
                    attr.name, name
                )));
            }
        }

        for fk in &foreign_keys {
            if !seen.contains(fk.attribute.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "foreign key '{}' is not an attribute of '{}'",
                    fk.attribute, name
                )));
            }
        }

        if primary_key.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "entity '{}' has no primary key",
                name
            )));
        }

        for key in primary_key {
            match attributes.iter_mut().find(|a| a.name == *key) {
                // Key attributes are never null
                Some(attr) => attr.nullable = false,
                None => {
                    return Err(Error::InvalidSchema(format!(
                        "primary key '{}' is not an attribute of '{}'",
                        key, name
                    )))
                }
            }
        }

        Ok(Self {
            name,
            attributes,
            primary_key: primary_key.iter().map(|k| k.to_string()).collect(),
            foreign_keys,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Like [`Entity::attribute`], failing with `UnknownAttribute`
    pub fn require_attribute(&self, name: &str) -> Result<&Attribute> {
        self.attribute(name).ok_or_else(|| Error::UnknownAttribute {
            entity: self.name.clone(),
            attribute: name.to_string(),
        })
    }

    /// Get all entities this entity depends on (FK parents)
    pub fn dependencies(&self) -> HashSet<&str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.references.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type_names() {
        assert_eq!(
            AttributeType::parse("INTEGER", "id").unwrap(),
            AttributeType::Integer
        );
        assert_eq!(
            AttributeType::parse("real", "price").unwrap(),
            AttributeType::Decimal
        );
        assert_eq!(
            AttributeType::parse("VARCHAR", "name").unwrap(),
            AttributeType::Text
        );
        assert!(matches!(
            AttributeType::parse("blob", "photo"),
            Err(Error::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_primary_key_is_required() {
        let entity = Entity::new(
            "shop",
            vec![Attribute::new("ID магазина", AttributeType::Text)],
            &["ID магазина"],
            vec![],
        )
        .unwrap();
        assert!(!entity.attribute("ID магазина").unwrap().nullable);
    }

    #[test]
    fn test_invalid_entities() {
        let attrs = || vec![Attribute::required("id", AttributeType::Integer)];

        assert!(Entity::new("a.b", attrs(), &["id"], vec![]).is_err());
        assert!(Entity::new("a", attrs(), &[], vec![]).is_err());
        assert!(Entity::new("a", attrs(), &["missing"], vec![]).is_err());
        assert!(Entity::new("a", attrs(), &["id"], vec![ForeignKey::new("x", "b")]).is_err());

        let mut twice = attrs();
        twice.push(Attribute::new("id", AttributeType::Text));
        assert!(Entity::new("a", twice, &["id"], vec![]).is_err());
    }

    #[test]
    fn test_foreign_key_on_declared_attribute() {
        let entity = Entity::new(
            "move",
            vec![
                Attribute::new("ID операции", AttributeType::Integer),
                Attribute::new("Артикул", AttributeType::Text),
            ],
            &["ID операции"],
            vec![ForeignKey::new("Артикул", "product")],
        )
        .unwrap();

        assert_eq!(entity.attributes.len(), 2);
        assert!(!entity.attribute("ID операции").unwrap().nullable);
        assert!(entity.attribute("Артикул").unwrap().nullable);
        assert_eq!(entity.dependencies(), HashSet::from(["product"]));
    }
}
