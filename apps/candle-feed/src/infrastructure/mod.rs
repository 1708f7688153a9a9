//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// In-process fan-out of room events to listeners.
pub mod broadcast;

/// Configuration loaded from the environment.
pub mod config;

/// Logging bar consumer.
pub mod consumer;

/// Data API HTTP client.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// WebSocket session over the data stream.
pub mod stream;

/// Tracing subscriber setup.
pub mod telemetry;

/// Active wallet/deployer selection.
pub mod wallets;
