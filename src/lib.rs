//! Vigil Sensor Agent - endpoint telemetry for exam integrity monitoring.
//!
//! This library provides a set of polling sensors that observe the local
//! machine during a proctored session and deliver structured JSON events
//! to a host-supplied sink.
//!
//! # Event Guarantees
//!
//! - **One worker per sensor**: each started sensor owns exactly one OS
//!   thread and stops within its poll interval plus 200 ms
//! - **Ordered events**: per-sensor timestamps never decrease and counts
//!   are strictly monotonic
//! - **No events after stop**: `stop` joins the worker before returning
//! - **Clipboard privacy**: content is hashed and previewed according to
//!   the configured privacy mode, never stored raw
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Vigil Sensor Agent                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐ │
//! │  │  process  │  │  device   │  │ focus-idle │  │clipboard │ │
//! │  │   watch   │  │   watch   │  │            │  │          │ │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬──────┘  └────┬─────┘ │
//! │  ┌─────┴─────┐  ┌─────┴─────┐        │              │       │
//! │  │  screen   │  │   smart   │        │              │       │
//! │  │   watch   │  │  device   │        │              │       │
//! │  └─────┬─────┘  └─────┬─────┘        │              │       │
//! │        └────────┬─────┴──────────────┴──────────────┘       │
//! │                 ▼                                            │
//! │          ┌─────────────┐        ┌──────────────┐            │
//! │          │  EventSink  │───────▶│     Host     │            │
//! │          └─────────────┘        └──────────────┘            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use vigil_sensor_agent::{Config, SensorRegistry};
//! use vigil_sensor_agent::sink::ChannelSink;
//!
//! let config = Config::load().unwrap_or_default();
//! let mut registry = SensorRegistry::from_config(&config);
//!
//! let (sink, events) = ChannelSink::bounded(10_000);
//! registry.start_all(&sink);
//!
//! while let Ok(event) = events.recv() {
//!     println!("{event}");
//! }
//! ```

pub mod config;
pub mod event;
pub mod platform;
pub mod probes;
pub mod registry;
pub mod screen;
pub mod sink;
pub mod smartdevice;
pub mod watcher;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use event::EventEncoder;
pub use registry::SensorRegistry;
pub use sink::{CallbackSink, ChannelSink, EventSink, MemorySink, NullSink, SharedSink};
pub use watcher::Sensor;

/// Library version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_registry_from_default_config() {
        let registry = SensorRegistry::from_config(&Config::default());
        assert_eq!(registry.names().len(), 6);
    }
}
