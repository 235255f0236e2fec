//! Core library for the `weathersync` service.
//!
//! This crate defines:
//! - Configuration and API key handling
//! - One adapter per weather backend, all producing the same normalized snapshot
//! - The update orchestrator with its store, notifier and location sources
//! - A read-only query surface for displaying the latest result
//!
//! It is used by `weathersync-cli`, but can also be embedded in other binaries or services.

pub mod condition;
pub mod config;
pub mod error;
pub mod geo;
pub mod http;
pub mod locale;
pub mod location;
pub mod model;
pub mod notify;
pub mod provider;
pub mod query;
pub mod service;
pub mod store;
pub mod units;

mod xml;

pub use config::{Config, DeviceLocation, ProviderConfig, SharedConfig};
pub use error::{ErrorKind, LocationError, ProviderError, UpdateError};
pub use model::{
    Coordinates, CurrentConditions, DayForecast, WeatherLocation, WeatherSnapshot,
    disambiguation_labels,
};
pub use notify::{ChangeNotifier, WeatherEvent};
pub use provider::{ProviderContext, ProviderId, ProviderRegistry, WeatherProvider};
pub use query::{SettingsSummary, WeatherQuery, WeatherView};
pub use service::{CycleOutcome, RetryPolicy, ServiceHandle, WeatherService};
pub use store::{FileStore, MemoryStore, SnapshotStore, StoreStatus};
