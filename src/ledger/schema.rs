//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Items table schema.
#[derive(Iden)]
pub enum Items {
    Table,
    #[iden = "name"]
    Name,
    #[iden = "quantity"]
    Quantity,
}

/// SQL for creating the items table.
pub const CREATE_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    name TEXT NOT NULL PRIMARY KEY,
    quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0)
);
"#;
