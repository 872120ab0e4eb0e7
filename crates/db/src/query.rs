//! Statement construction for record operations.
//!
//! Every builder returns a `sqlx::QueryBuilder` with its parameters already
//! bound. Each bound parameter is followed by an explicit `::<type>` cast to
//! its column's type, so domain checks (the email domain in particular) fire
//! on write and values of unknown types can travel as text.

use sqlx::{Postgres, QueryBuilder};

use crate::models::Value;
use crate::schema::{quote_ident, ColumnType, Table};

/// Postgres refuses statements with more bind parameters than this.
pub(crate) const MAX_BIND_PARAMS: usize = 65_535;

pub(crate) type Builder = QueryBuilder<'static, Postgres>;

/// Bind `value` and cast it to `kind`.
fn push_typed_bind(qb: &mut Builder, value: Value, kind: &ColumnType) {
    match value {
        Value::Null => qb.push_bind(None::<String>),
        Value::Bool(v) => qb.push_bind(v),
        Value::Int(v) => qb.push_bind(v),
        Value::Float(v) => qb.push_bind(v),
        Value::Text(v) => qb.push_bind(v),
        Value::Json(v) => qb.push_bind(v),
        Value::Uuid(v) => qb.push_bind(v),
        Value::Timestamp(v) => qb.push_bind(v),
    };
    qb.push("::").push(kind.sql_type());
}

fn push_primary_key_filter(qb: &mut Builder, table: &Table, id: Value) {
    let pk = table.primary_key();
    qb.push(" WHERE ").push(quote_ident(&pk.name)).push(" = ");
    push_typed_bind(qb, id, &pk.kind);
}

fn column_list(table: &Table, columns: &[usize]) -> String {
    columns
        .iter()
        .map(|&idx| quote_ident(&table.columns()[idx].name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT <all columns> FROM t WHERE pk = $1 LIMIT 2`.
///
/// Two rows are enough to tell a unique match from a broken key.
pub(crate) fn select_by_primary_key(table: &Table, id: Value) -> Builder {
    let mut qb = Builder::new(format!("SELECT {} FROM {}", table.select_list(), table.quoted_name()));
    push_primary_key_filter(&mut qb, table, id);
    qb.push(" LIMIT 2");
    qb
}

/// `SELECT <all columns> FROM t [LIMIT $n] [OFFSET $m]`, in storage order.
pub(crate) fn select_page(table: &Table, limit: Option<i64>, offset: Option<i64>) -> Builder {
    let mut qb = Builder::new(format!("SELECT {} FROM {}", table.select_list(), table.quoted_name()));
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
    if let Some(offset) = offset {
        qb.push(" OFFSET ").push_bind(offset);
    }
    qb
}

/// Single-row insert returning the new row's primary key.
pub(crate) fn insert_returning_key(table: &Table, fields: Vec<(usize, Value)>) -> Builder {
    let mut qb = Builder::new(format!("INSERT INTO {}", table.quoted_name()));
    if fields.is_empty() {
        qb.push(" DEFAULT VALUES");
    } else {
        let columns: Vec<usize> = fields.iter().map(|(idx, _)| *idx).collect();
        qb.push(format!(" ({}) VALUES (", column_list(table, &columns)));
        for (i, (idx, value)) in fields.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_typed_bind(&mut qb, value, &table.columns()[idx].kind);
        }
        qb.push(")");
    }
    qb.push(" RETURNING ").push(table.primary_key().select_expr());
    qb
}

/// Multi-row insert of `rows`, each holding one value per entry of `columns`.
pub(crate) fn insert_many(table: &Table, columns: &[usize], rows: Vec<Vec<Value>>) -> Builder {
    let mut qb = Builder::new(format!(
        "INSERT INTO {} ({}) VALUES ",
        table.quoted_name(),
        column_list(table, columns)
    ));
    for (r, row) in rows.into_iter().enumerate() {
        if r > 0 {
            qb.push(", ");
        }
        qb.push("(");
        for (i, (value, &idx)) in row.into_iter().zip(columns).enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_typed_bind(&mut qb, value, &table.columns()[idx].kind);
        }
        qb.push(")");
    }
    qb
}

/// `INSERT INTO t DEFAULT VALUES` for records that name no columns.
pub(crate) fn insert_defaults(table: &Table) -> Builder {
    Builder::new(format!("INSERT INTO {} DEFAULT VALUES", table.quoted_name()))
}

/// `UPDATE t SET a = $1, ... WHERE pk = $n`. `fields` must not be empty.
pub(crate) fn update_by_primary_key(table: &Table, id: Value, fields: Vec<(usize, Value)>) -> Builder {
    let mut qb = Builder::new(format!("UPDATE {} SET ", table.quoted_name()));
    for (i, (idx, value)) in fields.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        let column = &table.columns()[idx];
        qb.push(quote_ident(&column.name)).push(" = ");
        push_typed_bind(&mut qb, value, &column.kind);
    }
    push_primary_key_filter(&mut qb, table, id);
    qb
}

/// `DELETE FROM t WHERE pk = $1`.
pub(crate) fn delete_by_primary_key(table: &Table, id: Value) -> Builder {
    let mut qb = Builder::new(format!("DELETE FROM {}", table.quoted_name()));
    push_primary_key_filter(&mut qb, table, id);
    qb
}

pub(crate) fn count_rows(table: &Table) -> Builder {
    Builder::new(format!("SELECT count(*) FROM {}", table.quoted_name()))
}

/// How many rows of `width` columns fit in one statement.
pub(crate) fn rows_per_statement(width: usize) -> usize {
    (MAX_BIND_PARAMS / width.max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::users;

    #[test]
    fn select_by_key_casts_the_key_and_caps_at_two_rows() {
        let qb = select_by_primary_key(&users(), Value::Int(1));
        assert_eq!(
            qb.sql(),
            "SELECT \"id\", \"name\", \"email\"::text AS \"email\" FROM \"users\" \
             WHERE \"id\" = $1::integer LIMIT 2"
        );
    }

    #[test]
    fn select_page_binds_only_what_is_given() {
        let table = users().with_schema("app");
        assert_eq!(
            select_page(&table, None, None).sql(),
            "SELECT \"id\", \"name\", \"email\"::text AS \"email\" FROM \"app\".\"users\""
        );
        assert!(select_page(&table, Some(10), None).sql().ends_with(" LIMIT $1"));
        assert!(select_page(&table, None, Some(5)).sql().ends_with(" OFFSET $1"));
        assert!(select_page(&table, Some(10), Some(5))
            .sql()
            .ends_with(" LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn insert_casts_each_value_to_its_column_type() {
        let qb = insert_returning_key(
            &users(),
            vec![(1, Value::from("Ada")), (2, Value::from("ada@example.com"))],
        );
        assert_eq!(
            qb.sql(),
            "INSERT INTO \"users\" (\"name\", \"email\") \
             VALUES ($1::text, $2::\"types\".\"email\") RETURNING \"id\""
        );
    }

    #[test]
    fn empty_insert_uses_default_values() {
        let qb = insert_returning_key(&users(), Vec::new());
        assert_eq!(qb.sql(), "INSERT INTO \"users\" DEFAULT VALUES RETURNING \"id\"");
        assert_eq!(insert_defaults(&users()).sql(), "INSERT INTO \"users\" DEFAULT VALUES");
    }

    #[test]
    fn insert_many_numbers_parameters_across_rows() {
        let qb = insert_many(
            &users(),
            &[1, 2],
            vec![
                vec![Value::from("Ada"), Value::from("ada@example.com")],
                vec![Value::from("Alan"), Value::Null],
            ],
        );
        assert_eq!(
            qb.sql(),
            "INSERT INTO \"users\" (\"name\", \"email\") VALUES \
             ($1::text, $2::\"types\".\"email\"), ($3::text, $4::\"types\".\"email\")"
        );
    }

    #[test]
    fn update_sets_fields_then_filters_by_key() {
        let qb = update_by_primary_key(&users(), Value::Int(3), vec![(1, Value::from("Grace"))]);
        assert_eq!(
            qb.sql(),
            "UPDATE \"users\" SET \"name\" = $1::text WHERE \"id\" = $2::integer"
        );
    }

    #[test]
    fn delete_filters_by_key() {
        let qb = delete_by_primary_key(&users(), Value::Int(3));
        assert_eq!(qb.sql(), "DELETE FROM \"users\" WHERE \"id\" = $1::integer");
    }

    #[test]
    fn count_uses_the_qualified_name() {
        let table = users().with_schema("app");
        assert_eq!(count_rows(&table).sql(), "SELECT count(*) FROM \"app\".\"users\"");
    }

    #[test]
    fn statements_stay_under_the_bind_limit() {
        assert_eq!(rows_per_statement(3), 21_845);
        assert_eq!(rows_per_statement(0), MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(100_000), 1);
    }
}
