use crate::schema::{Entity, Relationship};

/// Quote an identifier; names may contain spaces, commas and non-ASCII text
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(names: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    names
        .into_iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Generate CREATE TABLE SQL for an entity
pub fn generate_create_table(entity: &Entity, relationships: &[Relationship]) -> String {
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", quote_ident(&entity.name));
    let mut columns = Vec::new();

    for attr in &entity.attributes {
        let null_constraint = if !attr.nullable { " NOT NULL" } else { "" };
        columns.push(format!(
            "    {} {}{}",
            quote_ident(&attr.name),
            attr.attr_type.sql_type(),
            null_constraint
        ));
    }

    columns.push(format!("    PRIMARY KEY ({})", column_list(&entity.primary_key)));

    // Add foreign key constraints
    for rel in relationships {
        columns.push(format!(
            "    FOREIGN KEY ({}) REFERENCES {}({})",
            quote_ident(&rel.attribute),
            quote_ident(&rel.parent),
            quote_ident(&rel.parent_key)
        ));
    }

    sql.push_str(&columns.join(",\n"));
    sql.push_str("\n)");

    sql
}

/// Generate CREATE INDEX statements for foreign key columns
pub fn generate_indexes(entity: &Entity) -> Vec<String> {
    entity
        .foreign_keys
        .iter()
        .map(|fk| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                quote_ident(&format!("idx_{}_{}", entity.name, fk.attribute)),
                quote_ident(&entity.name),
                quote_ident(&fk.attribute)
            )
        })
        .collect()
}

/// Insert-if-absent statement binding every attribute in declaration order
pub fn generate_insert(entity: &Entity) -> String {
    let placeholders: Vec<&str> = entity.attributes.iter().map(|_| "?").collect();
    format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        quote_ident(&entity.name),
        column_list(entity.attributes.iter().map(|a| a.name.as_str())),
        placeholders.join(", ")
    )
}

/// Existence check for the parent side of a relationship
pub fn generate_parent_lookup(rel: &Relationship) -> String {
    format!(
        "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
        quote_ident(&rel.parent),
        quote_ident(&rel.parent_key)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeType, ForeignKey};

    fn moves() -> Entity {
        Entity::new(
            "move",
            vec![
                Attribute::required("ID операции", AttributeType::Integer),
                Attribute::new("Дата", AttributeType::Text),
                Attribute::new("ID магазина", AttributeType::Text),
                Attribute::new("Количество упаковок, шт", AttributeType::Integer),
            ],
            &["ID операции"],
            vec![ForeignKey::new("ID магазина", "shop")],
        )
        .unwrap()
    }

    fn shop_relationship() -> Relationship {
        Relationship {
            child: "move".into(),
            attribute: "ID магазина".into(),
            parent: "shop".into(),
            parent_key: "ID магазина".into(),
        }
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("Ед_изм"), "\"Ед_изм\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_generate_create_table() {
        let sql = generate_create_table(&moves(), &[shop_relationship()]);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"move\""));
        assert!(sql.contains("\"ID операции\" INTEGER NOT NULL"));
        assert!(sql.contains("\"Количество упаковок, шт\" INTEGER,"));
        assert!(sql.contains("PRIMARY KEY (\"ID операции\")"));
        assert!(sql.contains("FOREIGN KEY (\"ID магазина\") REFERENCES \"shop\"(\"ID магазина\")"));
    }

    #[test]
    fn test_generate_indexes() {
        let indexes = generate_indexes(&moves());
        assert_eq!(indexes.len(), 1);
        assert!(indexes[0].contains("\"idx_move_ID магазина\""));
    }

    #[test]
    fn test_generate_insert() {
        let sql = generate_insert(&moves());
        assert!(sql.starts_with("INSERT OR IGNORE INTO \"move\""));
        assert!(sql.ends_with("VALUES (?, ?, ?, ?)"));
    }

    #[test]
    fn test_generate_parent_lookup() {
        assert_eq!(
            generate_parent_lookup(&shop_relationship()),
            "SELECT 1 FROM \"shop\" WHERE \"ID магазина\" = ? LIMIT 1"
        );
    }
}
