//! # jobq
//!
//! In-process job queue with fire-and-forget and request/reply submission,
//! plus a poller that leases messages from an external queue and fans
//! their payloads out to parallel consumers.
//!
//! Provides the job actor ([`engine`]), the external queue poller
//! ([`poller`]), collaborator contracts and adapters ([`external`], [`db`]),
//! and OpenTelemetry observability ([`telemetry`]).

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod external;
pub mod model;
pub mod poller;
pub mod telemetry;
