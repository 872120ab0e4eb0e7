//! Table handles — the metadata every record operation is generated from.
//!
//! A [`Table`] is bound once, either by hand with [`Table::new`] or from the
//! catalog with [`Table::reflect`]. Binding checks the primary-key shape, so an
//! operation can never be issued against a table without exactly one key column.

mod reflect;

use std::collections::HashSet;
use std::fmt;

use crate::DbError;

/// Quote an identifier for Postgres, doubling any embedded `"`.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal for Postgres, doubling any embedded `'`.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A schema-qualified object name, rendered quoted: `"schema"."name"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

/// Column types the record layer knows how to bind and decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Text,
    Json,
    Jsonb,
    Uuid,
    TimestampTz,
    /// The custom email domain, qualified by the schema it was created in.
    Email(QualifiedName),
    /// Any other type, spelled as Postgres spells it. Read and written as text.
    Other(String),
}

impl ColumnType {
    /// SQL spelling used in `$n::<type>` casts.
    pub fn sql_type(&self) -> String {
        match self {
            Self::Boolean => "boolean".to_string(),
            Self::SmallInt => "smallint".to_string(),
            Self::Integer => "integer".to_string(),
            Self::BigInt => "bigint".to_string(),
            Self::Real => "real".to_string(),
            Self::Double => "double precision".to_string(),
            Self::Text => "text".to_string(),
            Self::Json => "json".to_string(),
            Self::Jsonb => "jsonb".to_string(),
            Self::Uuid => "uuid".to_string(),
            Self::TimestampTz => "timestamp with time zone".to_string(),
            Self::Email(name) => name.to_string(),
            Self::Other(sql) => sql.clone(),
        }
    }

    /// Whether values of this type travel over the wire as text.
    pub fn reads_as_text(&self) -> bool {
        matches!(self, Self::Email(_) | Self::Other(_))
    }

    /// Human name used in error messages.
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::SmallInt | Self::Integer | Self::BigInt => "integer",
            Self::Real | Self::Double => "number",
            Self::Text | Self::Other(_) => "string",
            Self::Json | Self::Jsonb => "json value",
            Self::Uuid => "uuid",
            Self::TimestampTz => "RFC 3339 timestamp",
            Self::Email(_) => "email address",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
        }
    }

    /// Mark this column as (part of) the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Expression used in a select list: the quoted name, cast to text when
    /// the type is decoded as a string.
    pub(crate) fn select_expr(&self) -> String {
        let ident = quote_ident(&self.name);
        if self.kind.reads_as_text() {
            format!("{ident}::text AS {ident}")
        } else {
            ident
        }
    }
}

/// A bound table: ordered columns plus the position of its single key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    schema: Option<String>,
    name: String,
    columns: Vec<Column>,
    primary_key: usize,
}

impl Table {
    /// Bind a table handle.
    ///
    /// # Errors
    /// - [`DbError::MissingPrimaryKey`] if no column is marked as key.
    /// - [`DbError::CompositePrimaryKey`] if more than one is.
    /// - [`DbError::DuplicateColumn`] if two columns share a name.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self, DbError> {
        let name = name.into();

        let mut seen: HashSet<&str> = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DbError::DuplicateColumn {
                    table: name,
                    column: column.name.clone(),
                });
            }
        }

        let keys: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect();

        let primary_key = match keys.as_slice() {
            [only] => *only,
            [] => return Err(DbError::MissingPrimaryKey { table: name }),
            _ => {
                let columns = keys.iter().map(|&i| columns[i].name.clone()).collect();
                return Err(DbError::CompositePrimaryKey { table: name, columns });
            }
        };

        Ok(Self {
            schema: None,
            name,
            columns,
            primary_key,
        })
    }

    /// Qualify the table with a schema; unqualified tables follow `search_path`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn primary_key(&self) -> &Column {
        &self.columns[self.primary_key]
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub(crate) fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// The quoted (and, if set, schema-qualified) table name.
    pub fn quoted_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    /// The select list covering every column in order.
    pub(crate) fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(Column::select_expr)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::users;

    #[test]
    fn single_key_table_binds() {
        let table = users();
        assert_eq!(table.primary_key().name, "id");
        assert_eq!(table.columns().len(), 3);
        assert_eq!(table.column_index("email"), Some(2));
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn table_without_key_is_rejected() {
        let result = Table::new("logs", vec![Column::new("line", ColumnType::Text)]);
        assert!(matches!(result, Err(DbError::MissingPrimaryKey { table }) if table == "logs"));
    }

    #[test]
    fn composite_key_is_rejected() {
        let result = Table::new(
            "memberships",
            vec![
                Column::new("user_id", ColumnType::BigInt).primary_key(),
                Column::new("group_id", ColumnType::BigInt).primary_key(),
            ],
        );
        assert!(matches!(
            result,
            Err(DbError::CompositePrimaryKey { columns, .. })
                if columns == vec!["user_id".to_string(), "group_id".to_string()]
        ));
    }

    #[test]
    fn duplicate_column_is_rejected() {
        let result = Table::new(
            "t",
            vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("id", ColumnType::Text),
            ],
        );
        assert!(matches!(result, Err(DbError::DuplicateColumn { column, .. }) if column == "id"));
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(QualifiedName::new("types", "email").to_string(), "\"types\".\"email\"");
    }

    #[test]
    fn qualified_table_name() {
        assert_eq!(users().quoted_name(), "\"users\"");
        assert_eq!(users().with_schema("app").quoted_name(), "\"app\".\"users\"");
    }

    #[test]
    fn text_read_columns_are_cast_in_select_list() {
        assert_eq!(
            users().select_list(),
            "\"id\", \"name\", \"email\"::text AS \"email\""
        );
    }
}
