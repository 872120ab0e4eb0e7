//! Repository functions — one function per database operation.
//!
//! Every function takes a bound `&Table` and a `&DbPool` and returns a
//! `Result<T, DbError>`. No business logic, no domain types.

pub mod records;

pub use records::{
    count_records, create_record, create_record_or_records, create_records, delete_record,
    get_record, get_records, update_record,
};
