pub mod core;
pub mod imports;
pub mod jobs;
pub mod setup;
