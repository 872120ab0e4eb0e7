//! Binding a [`Table`] from the Postgres catalog.

use tracing::{debug, instrument};

use super::{Column, ColumnType, QualifiedName, Table};
use crate::types::{self, EMAIL_TYPE};
use crate::{DbError, DbPool};

/// One `pg_attribute` row, already joined with its type and key membership.
#[derive(Debug, sqlx::FromRow)]
struct CatalogColumn {
    schema_name: String,
    column_name: String,
    formatted_type: String,
    type_name: String,
    type_schema: String,
    type_kind: String,
    is_primary_key: bool,
}

const COLUMNS_QUERY: &str = r#"
    SELECT n.nspname::text                          AS schema_name,
           a.attname::text                          AS column_name,
           format_type(a.atttypid, a.atttypmod)     AS formatted_type,
           t.typname::text                          AS type_name,
           tn.nspname::text                         AS type_schema,
           t.typtype::text                          AS type_kind,
           COALESCE(a.attnum = ANY(i.indkey), false) AS is_primary_key
    FROM pg_attribute a
    JOIN pg_class c       ON c.oid = a.attrelid
    JOIN pg_namespace n   ON n.oid = c.relnamespace
    JOIN pg_type t        ON t.oid = a.atttypid
    JOIN pg_namespace tn  ON tn.oid = t.typnamespace
    LEFT JOIN pg_index i  ON i.indrelid = c.oid AND i.indisprimary
    WHERE n.nspname = COALESCE($1, current_schema())
      AND c.relname = $2
      AND c.relkind IN ('r', 'p', 'v', 'm', 'f')
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

impl Table {
    /// Bind a table handle from the live catalog.
    ///
    /// `schema` defaults to `current_schema()`. Columns come back in
    /// declaration order. If the custom type registry is initialized, columns
    /// of its email domain are bound as [`ColumnType::Email`].
    ///
    /// # Errors
    /// [`DbError::TableNotFound`] if no such relation exists, plus every error
    /// [`Table::new`] can return.
    #[instrument(skip(pool))]
    pub async fn reflect(pool: &DbPool, schema: Option<&str>, name: &str) -> Result<Self, DbError> {
        let rows: Vec<CatalogColumn> = sqlx::query_as(COLUMNS_QUERY)
            .bind(schema)
            .bind(name)
            .fetch_all(pool)
            .await?;

        let Some(first) = rows.first() else {
            return Err(DbError::TableNotFound(match schema {
                Some(schema) => format!("{schema}.{name}"),
                None => name.to_string(),
            }));
        };
        let table_schema = first.schema_name.clone();

        let email_schema = types::registry().ok().map(|r| r.schema().to_string());
        let columns: Vec<Column> = rows
            .into_iter()
            .map(|row| {
                let kind = column_type(&row, email_schema.as_deref());
                debug!(column = %row.column_name, ?kind, "reflected column");
                let column = Column::new(row.column_name, kind);
                if row.is_primary_key {
                    column.primary_key()
                } else {
                    column
                }
            })
            .collect();

        Ok(Self::new(name, columns)?.with_schema(table_schema))
    }
}

fn column_type(row: &CatalogColumn, email_schema: Option<&str>) -> ColumnType {
    if row.type_kind == "d"
        && row.type_name == EMAIL_TYPE
        && email_schema == Some(row.type_schema.as_str())
    {
        return ColumnType::Email(QualifiedName::new(&row.type_schema, &row.type_name));
    }

    match row.type_name.as_str() {
        "bool" => ColumnType::Boolean,
        "int2" => ColumnType::SmallInt,
        "int4" => ColumnType::Integer,
        "int8" => ColumnType::BigInt,
        "float4" => ColumnType::Real,
        "float8" => ColumnType::Double,
        "text" | "varchar" | "bpchar" | "name" => ColumnType::Text,
        "json" => ColumnType::Json,
        "jsonb" => ColumnType::Jsonb,
        "uuid" => ColumnType::Uuid,
        "timestamptz" => ColumnType::TimestampTz,
        _ => ColumnType::Other(row.formatted_type.clone()),
    }
}
