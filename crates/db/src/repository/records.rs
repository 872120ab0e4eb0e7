//! Generic record CRUD over a bound [`Table`].
//!
//! Every function opens its own transaction on the given pool and commits it
//! before returning; a dropped transaction rolls back. Database errors pass
//! through unmodified as [`DbError::Sqlx`].

use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::models::{decode_value, Created, NewRecords, Record, RecordData, Value};
use crate::query;
use crate::schema::Table;
use crate::{DbError, DbPool};

/// Fetch the row whose primary key equals `id`.
///
/// Returns `Ok(None)` when nothing matches.
///
/// # Errors
/// [`DbError::DuplicatePrimaryKey`] if more than one row matches, which means
/// the key column isn't actually unique.
#[instrument(skip(table, pool, id), fields(table = %table.name()))]
pub async fn get_record(
    table: &Table,
    pool: &DbPool,
    id: impl Into<Value>,
) -> Result<Option<Record>, DbError> {
    let mut tx = pool.begin().await?;
    let rows = query::select_by_primary_key(table, id.into())
        .build()
        .fetch_all(&mut *tx)
        .await?;
    tx.commit().await?;

    match rows.as_slice() {
        [] => Ok(None),
        [row] => Ok(Some(Record::from_row(table, row)?)),
        _ => Err(DbError::DuplicatePrimaryKey {
            table: table.name().to_string(),
        }),
    }
}

/// Fetch a page of rows in whatever order the table hands them back.
#[instrument(skip(table, pool), fields(table = %table.name()))]
pub async fn get_records(
    table: &Table,
    pool: &DbPool,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<Record>, DbError> {
    let mut tx = pool.begin().await?;
    let rows = query::select_page(table, limit, offset)
        .build()
        .fetch_all(&mut *tx)
        .await?;
    tx.commit().await?;

    debug!("fetched {} rows", rows.len());
    rows.iter()
        .map(|row| Record::from_row(table, row).map_err(DbError::from))
        .collect()
}

/// Insert one record or a batch.
///
/// A single record comes back re-read by primary key; a batch reports only the
/// number of rows inserted.
pub async fn create_record_or_records(
    table: &Table,
    pool: &DbPool,
    data: impl Into<NewRecords>,
) -> Result<Created, DbError> {
    match data.into() {
        NewRecords::Single(record) => create_record(table, pool, record).await.map(Created::Record),
        NewRecords::Batch(records) => create_records(table, pool, records)
            .await
            .map(|inserted| Created::Batch { inserted }),
    }
}

/// Insert a single record, commit, and return it re-read by primary key.
#[instrument(skip(table, pool, record), fields(table = %table.name()))]
pub async fn create_record(
    table: &Table,
    pool: &DbPool,
    record: RecordData,
) -> Result<Option<Record>, DbError> {
    let fields = record.resolve(table)?;

    let mut tx = pool.begin().await?;
    let row = query::insert_returning_key(table, fields)
        .build()
        .fetch_optional(&mut *tx)
        .await?;
    // No row back means a trigger or rule swallowed the insert.
    let id = match row {
        Some(row) => decode_value(&row, 0, &table.primary_key().kind)?,
        None => Value::Null,
    };
    // Commit before re-reading; the read runs in its own transaction.
    tx.commit().await?;

    if id.is_null() {
        debug!("insert produced no row");
        return Ok(None);
    }
    info!(id = ?id, "record created");
    get_record(table, pool, id).await
}

/// Insert every record in one transaction and return how many rows went in.
///
/// Runs of records naming the same columns share a multi-row `INSERT`.
/// Inserted rows are not read back.
#[instrument(skip(table, pool, records), fields(table = %table.name(), count = records.len()))]
pub async fn create_records(
    table: &Table,
    pool: &DbPool,
    records: Vec<RecordData>,
) -> Result<u64, DbError> {
    let groups = group_batch(table, records)?;
    if groups.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;
    for group in groups {
        let rows = group.rows.len();
        let result = if group.columns.is_empty() {
            let mut affected = 0;
            for _ in 0..rows {
                affected += query::insert_defaults(table)
                    .build()
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
            affected
        } else {
            query::insert_many(table, &group.columns, group.rows)
                .build()
                .execute(&mut *tx)
                .await?
                .rows_affected()
        };
        debug!(columns = group.columns.len(), rows, "inserted batch statement");
        inserted += result;
    }
    tx.commit().await?;

    info!("{} records created", inserted);
    Ok(inserted)
}

/// Apply `data` to the row whose primary key equals `id`, then return the row
/// as it now reads. Last write wins.
///
/// An empty named update skips the `UPDATE` and only re-reads.
#[instrument(skip(table, pool, id, data), fields(table = %table.name()))]
pub async fn update_record(
    table: &Table,
    pool: &DbPool,
    id: impl Into<Value>,
    data: RecordData,
) -> Result<Option<Record>, DbError> {
    let id = id.into();
    let fields = data.resolve(table)?;

    if !fields.is_empty() {
        let mut tx = pool.begin().await?;
        let affected = query::update_by_primary_key(table, id.clone(), fields)
            .build()
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        debug!(id = ?id, affected, "record updated");
    }

    get_record(table, pool, id).await
}

/// Delete the row whose primary key equals `id`.
///
/// Returns the number of rows removed: `0` when nothing matched, `1` otherwise.
#[instrument(skip(table, pool, id), fields(table = %table.name()))]
pub async fn delete_record(
    table: &Table,
    pool: &DbPool,
    id: impl Into<Value>,
) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;
    let affected = query::delete_by_primary_key(table, id.into())
        .build()
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;

    debug!(affected, "record deleted");
    Ok(affected)
}

/// Count the rows of a table. Handy after batch inserts, which return no rows.
#[instrument(skip(table, pool), fields(table = %table.name()))]
pub async fn count_records(table: &Table, pool: &DbPool) -> Result<i64, DbError> {
    let mut tx = pool.begin().await?;
    let row = query::count_rows(table).build().fetch_one(&mut *tx).await?;
    tx.commit().await?;

    Ok(row.try_get::<i64, _>(0)?)
}

// ---------------------------------------------------------------------------
// Batch grouping
// ---------------------------------------------------------------------------

/// Rows that can go into one multi-row `INSERT`.
#[derive(Debug, PartialEq)]
struct InsertGroup {
    columns: Vec<usize>,
    rows: Vec<Vec<Value>>,
}

/// Resolve every record, then group consecutive records naming the same
/// columns (in the same order), splitting groups at the bind-parameter limit.
fn group_batch(table: &Table, records: Vec<RecordData>) -> Result<Vec<InsertGroup>, DbError> {
    let mut groups: Vec<InsertGroup> = Vec::new();

    for record in records {
        let fields = record.resolve(table)?;
        let (columns, values): (Vec<usize>, Vec<Value>) = fields.into_iter().unzip();

        match groups.last_mut() {
            Some(group)
                if group.columns == columns
                    && group.rows.len() < query::rows_per_statement(columns.len()) =>
            {
                group.rows.push(values);
            }
            _ => groups.push(InsertGroup {
                columns,
                rows: vec![values],
            }),
        }
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::users;

    fn person(name: &str) -> RecordData {
        RecordData::named().with("name", name)
    }

    #[test]
    fn consecutive_records_with_the_same_columns_share_a_statement() {
        let groups = group_batch(&users(), vec![person("Ada"), person("Alan"), person("Grace")])
            .expect("groups");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].columns, vec![1]);
        assert_eq!(groups[0].rows.len(), 3);
    }

    #[test]
    fn a_change_of_columns_starts_a_new_statement() {
        let groups = group_batch(
            &users(),
            vec![
                person("Ada"),
                person("Alan").with("email", "alan@example.com"),
                person("Grace"),
                RecordData::named(),
            ],
        )
        .expect("groups");
        let shapes: Vec<(Vec<usize>, usize)> =
            groups.iter().map(|g| (g.columns.clone(), g.rows.len())).collect();
        assert_eq!(
            shapes,
            vec![(vec![1], 1), (vec![1, 2], 1), (vec![1], 1), (vec![], 1)]
        );
    }

    #[test]
    fn positional_and_named_full_width_records_mix() {
        let groups = group_batch(
            &users(),
            vec![
                RecordData::Positional(vec![Value::from(1), Value::from("Ada"), Value::Null]),
                RecordData::named().with("id", 2).with("name", "Alan").with("email", Value::Null),
            ],
        )
        .expect("groups");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].columns, vec![0, 1, 2]);
    }

    #[test]
    fn a_bad_record_fails_the_whole_batch_before_any_query() {
        let result = group_batch(
            &users(),
            vec![person("Ada"), RecordData::named().with("nickname", "x")],
        );
        assert!(matches!(result, Err(DbError::UnknownColumn { .. })));
    }

    #[test]
    fn empty_batch_has_no_statements() {
        assert!(group_batch(&users(), Vec::new()).expect("groups").is_empty());
    }

    #[test]
    fn oversized_batches_are_split() {
        let per_statement = query::rows_per_statement(1);
        let records = (0..per_statement + 1).map(|i| person(&format!("p{i}"))).collect();
        let groups = group_batch(&users(), records).expect("groups");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].rows.len(), per_statement);
        assert_eq!(groups[1].rows.len(), 1);
    }
}
