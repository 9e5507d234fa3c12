mod collection;
mod errors;

pub use collection::{ensure_indexes_exist, id_filter, Coll, MongoCollection};
pub use errors::{is_ambiguous_write_error, is_duplicate_key_error, DUPLICATE_KEY};
