//! Repository traits for metadata operations.

pub mod releases;

pub use releases::ReleaseRepo;
