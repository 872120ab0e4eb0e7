//! Shared table handles for unit tests.

use crate::schema::{Column, ColumnType, QualifiedName, Table};

pub(crate) fn users() -> Table {
    Table::new(
        "users",
        vec![
            Column::new("id", ColumnType::Integer).primary_key(),
            Column::new("name", ColumnType::Text),
            Column::new("email", ColumnType::Email(QualifiedName::new("types", "email"))),
        ],
    )
    .expect("users table binds")
}
