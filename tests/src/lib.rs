//! Shared support for the integration tests: a ClickHouse container,
//! OTLP file fixtures, mocks for the external services and a wired-up
//! test context.

pub mod containers;
pub mod fixtures;
pub mod mocks;
pub mod setup;
