//! Tether Core
//!
//! Lazily recomputed observable values and mutable properties, with
//! two-way binding between properties and live configuration files.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: cells, derived cells, properties, listeners and links
//! - `config`: configuration files exposed as property trees
//!
//! # Example
//!
//! ```rust
//! use tether_core::reactive::{Property, Value};
//!
//! // A mutable property
//! let celsius = Property::of(20.0_f64);
//!
//! // A read-only view recomputed when the property changes
//! let fahrenheit: Value<f64> = celsius.map(|c| c * 9.0 / 5.0 + 32.0);
//! assert_eq!(fahrenheit.get(), 68.0);
//!
//! // A two-way view
//! let kelvin = celsius.bimap(|c| c + 273.15, |k| k - 273.15);
//! kelvin.set(300.0);
//! assert!((celsius.get() - 26.85).abs() < 1e-9);
//! ```

pub mod config;
pub mod reactive;

mod error;

pub use error::{Error, Result};
