//! Feed reconciliation: match incoming rows against stored records, merge what
//! the lock set allows, and classify every row.

pub mod activity;
pub mod index;
pub mod job_row;
pub mod locks;
pub mod runner;
pub mod status;

pub use activity::ActivityImportRunner;
pub use job_row::Jurisdiction;
pub use runner::{ImportOptions, ImportRunner};
