//! Column types read from `information_schema.columns`, turned into cast hints.

use crate::sql::TypeHints;

/// One row of `information_schema.columns`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogColumn {
    pub table_schema: String,
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub udt_schema: String,
    pub udt_name: String,
}

/// Types that bind correctly as TEXT and need no cast.
const TEXT_TYPES: &[&str] = &["text", "varchar", "bpchar", "name"];

fn is_plain_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Cast for one catalog column; `None` when a TEXT binding already fits or the type is an array.
fn cast_for(col: &CatalogColumn) -> Option<String> {
    if col.data_type == "ARRAY" || TEXT_TYPES.contains(&col.udt_name.as_str()) {
        return None;
    }
    if !is_plain_ident(&col.udt_name) {
        return None;
    }
    if col.data_type == "USER-DEFINED" {
        return is_plain_ident(&col.udt_schema).then(|| format!("{}.{}", col.udt_schema, col.udt_name));
    }
    Some(col.udt_name.clone())
}

/// Hints for `tables` as written in resource declarations. Unqualified names resolve in `default_schema`.
pub fn catalog_hints(tables: &[String], default_schema: &str, columns: &[CatalogColumn]) -> TypeHints {
    let mut hints = TypeHints::default();
    for table in tables {
        let (schema, name) = table.split_once('.').unwrap_or((default_schema, table.as_str()));
        for col in columns
            .iter()
            .filter(|c| c.table_schema == schema && c.table_name == name)
        {
            if let Some(cast) = cast_for(col) {
                hints.insert(table, &col.column_name, &cast);
            }
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(schema: &str, table: &str, column: &str, data_type: &str, udt: &str) -> CatalogColumn {
        CatalogColumn {
            table_schema: schema.into(),
            table_name: table.into(),
            column_name: column.into(),
            data_type: data_type.into(),
            udt_schema: if data_type == "USER-DEFINED" { "app".into() } else { "pg_catalog".into() },
            udt_name: udt.into(),
        }
    }

    #[test]
    fn typed_columns_get_casts_and_text_columns_do_not() {
        let columns = vec![
            col("public", "widgets", "id", "integer", "int4"),
            col("public", "widgets", "name", "text", "text"),
            col("public", "widgets", "price", "numeric", "numeric"),
            col("public", "widgets", "status", "USER-DEFINED", "widget_status"),
            col("public", "widgets", "labels", "ARRAY", "_text"),
            col("other", "widgets", "owner_id", "uuid", "uuid"),
            col("reporting", "stock", "warehouse_id", "uuid", "uuid"),
        ];
        let hints = catalog_hints(&["widgets".into(), "reporting.stock".into()], "public", &columns);
        assert_eq!(hints.cast("widgets", "id"), Some("int4"));
        assert_eq!(hints.cast("widgets", "name"), None);
        assert!(hints.reads_as_text("widgets", "price"));
        assert_eq!(hints.cast("widgets", "status"), Some("app.widget_status"));
        assert_eq!(hints.cast("widgets", "labels"), None);
        assert_eq!(hints.cast("widgets", "owner_id"), None);
        assert_eq!(hints.cast("reporting.stock", "warehouse_id"), Some("uuid"));
    }
}
