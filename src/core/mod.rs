pub mod error;
pub mod row;

pub use error::{Result, SyncError};
pub use row::{ID_COLUMN, RawRow, id_string, row_id};
