//! `simtelemetryd` service: configuration, logging bootstrap and endpoint
//! supervision for simracing UDP telemetry.

#![deny(static_mut_refs)]

pub mod config;
pub mod network;
pub mod service;

pub use config::{EndpointSettings, ServiceConfig, SinkConfig, SinkFactory};
pub use service::TelemetryService;
