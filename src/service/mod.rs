//! Record service over dynamic module tables, using the generated SQL.

mod records;
mod validation;
pub use records::{GroupCount, ListQuery, ReadMode, RecordService};
pub use validation::PayloadValidator;
