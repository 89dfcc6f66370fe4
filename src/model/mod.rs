//! Core data model.
//!
//! Jobs flow through the in-process mailbox as [`job::ProcessMessage`]s;
//! work arriving from an external queue is an [`external::ExternalMessage`]
//! whose body names a blob of line-delimited sub-units.

pub mod external;
pub mod job;
