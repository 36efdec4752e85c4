//! Host-resident memory telemetry collector for Intel Skylake-class Xeon
//! Scalable server platforms.
//!
//! Samples Uncore PMON counters, correctable-error counters, DIMM thermal
//! registers, and hwmon temperatures on fixed periods through one of three
//! interchangeable driver backends, and emits deduplicated records to a
//! [`sink::DataSink`].

#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate strum_macros;

pub mod catalog;
pub mod commands;
pub mod config;
pub mod driver;
pub mod error;
pub mod hwmon;
pub mod measure;
pub mod metrics;
pub mod pmon;
pub mod registry;
pub mod scheduler;
pub mod sink;
