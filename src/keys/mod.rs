pub mod extract;
pub mod record;
pub mod store;

pub use extract::extract_access_key;
pub use record::{Record, TIMESTAMP_FORMAT};
pub use store::{KeyStore, WriteMode};
