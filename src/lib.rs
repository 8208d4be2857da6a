//! Forklift telemetry - an on-device motion telemetry agent.
//!
//! # Overview
//!
//! The agent fuses asynchronously arriving inertial and location signals into
//! a stable movement classification (`unknown`, `moving`, `idle`), adapts its
//! location and upload cadence to that classification, buffers samples and
//! delivers them best-effort to a collector. Collector responses can retune
//! thresholds, dwell times and intervals without a restart.
//!
//! Data flows one way: sensor callbacks → signal cells → classifier and
//! sample builder → batch buffer → uploader → collector → config feedback.
//!
//! # Modules
//!
//! - [`signal`]: Latest-value signal cells and magnitude reduction
//! - [`classifier`]: Hysteresis movement classifier
//! - [`sampler`]: Sample construction with location gating
//! - [`buffer`]: Pending sample queue
//! - [`uploader`]: Collector client
//! - [`agent`]: Lifecycle and scheduling
//! - [`sources`]: Sensor and location collaborators
//! - [`api`]: HTTP handlers for the daemon
//! - [`config`]: Tunables, live config store and daemon settings
//! - [`model`]: Samples and the upload wire contract
//! - [`session`]: Operator session capability
//! - [`clock`]: Wall-clock timestamps driven by the runtime clock
//! - [`error`]: Error types

pub mod agent;
pub mod api;
pub mod buffer;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod sampler;
pub mod session;
pub mod signal;
pub mod sources;
pub mod uploader;
