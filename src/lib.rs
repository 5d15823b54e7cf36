//! # audit-tracker
//!
//! Maker → checker1 → checker2 approval workflow for recurring audit and
//! compliance tasks.
//!
//! Provides the task state machine and role-scoped visibility (engine), a
//! Postgres task store (db), notification sinks, TOML bulk import, and
//! OpenTelemetry observability.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod event;
pub mod import;
pub mod model;
pub mod notify;
pub mod repository;
pub mod telemetry;
