//! Folio Core Library
//!
//! This crate provides the shared configuration for the offline cache worker
//! and the hero media rotator.

pub mod config;

pub use config::{FolioConfig, LoggingSettings, RotatorSettings, WorkerSettings};
