use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::schema::Entity;

/// Renames from source header names to attribute names. Headers not listed
/// map to the attribute of the same name.
pub type ColumnMapping = HashMap<String, String>;

/// Source column feeding each attribute, validated once per batch
#[derive(Debug)]
pub(crate) struct ColumnPlan {
    /// Indexed like `Entity::attributes`
    pub slots: Vec<Option<usize>>,
    /// Number of fields every row must have
    pub width: usize,
}

impl ColumnPlan {
    pub fn build(entity: &Entity, header: &[String], mapping: &ColumnMapping) -> Result<Self> {
        for attribute in mapping.values() {
            entity.require_attribute(attribute)?;
        }

        let mut slots = vec![None; entity.attributes.len()];
        let mut unmatched = Vec::new();

        for (col, name) in header.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            let target = mapping.get(name).map(String::as_str).unwrap_or(name);
            match entity.attributes.iter().position(|a| a.name == target) {
                Some(idx) if slots[idx].is_none() => slots[idx] = Some(col),
                Some(_) => {
                    return Err(Error::InvalidSchema(format!(
                        "more than one source column maps to '{}.{}'",
                        entity.name, target
                    )))
                }
                None => unmatched.push(name.as_str()),
            }
        }

        if let Some(missing) = entity
            .attributes
            .iter()
            .zip(&slots)
            .find(|(attr, slot)| !attr.nullable && slot.is_none())
        {
            return Err(Error::MissingAttribute {
                entity: entity.name.clone(),
                attribute: missing.0.name.clone(),
            });
        }

        if !unmatched.is_empty() {
            tracing::warn!(
                entity = %entity.name,
                columns = ?unmatched,
                "ignoring source columns with no matching attribute"
            );
        }

        Ok(Self {
            slots,
            width: header.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeType};

    fn students() -> Entity {
        Entity::new(
            "students",
            vec![
                Attribute::required("id", AttributeType::Integer),
                Attribute::required("last_name", AttributeType::Text),
                Attribute::new("middle_name", AttributeType::Text),
            ],
            &["id"],
            vec![],
        )
        .unwrap()
    }

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_plan_follows_header_order() {
        let plan = ColumnPlan::build(
            &students(),
            &header(&["last_name", "", "id", "note"]),
            &ColumnMapping::new(),
        )
        .unwrap();
        assert_eq!(plan.slots, vec![Some(2), Some(0), None]);
        assert_eq!(plan.width, 4);
    }

    #[test]
    fn test_mapping_renames() {
        let mapping = ColumnMapping::from([("фамилия".to_string(), "last_name".to_string())]);
        let plan = ColumnPlan::build(&students(), &header(&["id", "фамилия"]), &mapping).unwrap();
        assert_eq!(plan.slots, vec![Some(0), Some(1), None]);
    }

    #[test]
    fn test_unknown_mapping_target() {
        let mapping = ColumnMapping::from([("x".to_string(), "nope".to_string())]);
        let result = ColumnPlan::build(&students(), &header(&["id", "last_name"]), &mapping);
        assert!(matches!(result, Err(Error::UnknownAttribute { .. })));
    }

    #[test]
    fn test_missing_required_attribute() {
        let result =
            ColumnPlan::build(&students(), &header(&["id", "middle_name"]), &ColumnMapping::new());
        assert!(matches!(
            result,
            Err(Error::MissingAttribute { attribute, .. }) if attribute == "last_name"
        ));
    }

    #[test]
    fn test_two_columns_for_one_attribute() {
        let mapping = ColumnMapping::from([("surname".to_string(), "last_name".to_string())]);
        let result = ColumnPlan::build(
            &students(),
            &header(&["id", "last_name", "surname"]),
            &mapping,
        );
        assert!(matches!(result, Err(Error::InvalidSchema(_))));
    }
}
