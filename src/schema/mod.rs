//! Record schema subsystem for bucketdb
//!
//! Record kinds declare their identifier and indexed fields explicitly
//! through a [`RecordSchema`]. A schema is validated once when its kind is
//! first used and cached for the lifetime of the connection.

mod errors;
mod types;
mod validator;

pub use errors::{SchemaError, SchemaResult};
pub use types::{FieldDef, FieldRole, RecordSchema};
pub use validator::{is_zero_value, validate, validate_complete};
