//! Input/output helpers.
//!
//! - CSV ingest + schema validation (`ingest`)
//! - final and interim CSV tables (`export`)
//! - run summary JSON read/write (`summary`)

pub mod export;
pub mod ingest;
pub mod summary;

pub use export::*;
pub use ingest::*;
pub use summary::*;
