//! Application Layer - Ports and the chart feed service.

/// Interfaces to the stream, the data API, the wallet selection and the
/// consumer.
pub mod ports;

/// The chart feed use cases.
pub mod services;
