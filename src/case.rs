//! Case conversion between column names (snake_case) and domain field names.

use crate::config::KeyCase;

/// e.g. "warehouse_id" -> "warehouseId", "created_at" -> "createdAt"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.chars() {
        if c == '_' {
            capitalize_next = !out.is_empty();
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// e.g. "warehouseId" -> "warehouse_id", "createdAt" -> "created_at"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl KeyCase {
    /// Field name for a column under this case style.
    pub fn field_for(self, column: &str) -> String {
        match self {
            KeyCase::Camel => to_camel_case(column),
            KeyCase::Snake => column.to_string(),
        }
    }

    /// Column name for a field under this case style.
    pub fn column_for(self, field: &str) -> String {
        match self {
            KeyCase::Camel => to_snake_case(field),
            KeyCase::Snake => field.to_string(),
        }
    }
}
