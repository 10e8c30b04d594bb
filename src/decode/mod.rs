//! Response decoder module
//!
//! The source API answers every page with JSON. Records are found, in order:
//! a top-level array, the configured record path, the first well-known list
//! key (`data`, `items`, `results`, `records`, `rows`), the first array-valued
//! field, and finally the whole object as a single record.

mod decoders;

pub use decoders::{
    extract_path_u64, extract_path_value, JsonDecoder, RecordDecoder, DEFAULT_RECORD_KEYS,
};
