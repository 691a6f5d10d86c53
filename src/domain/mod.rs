//! Domain Layer
//!
//! Core types and services of the gateway. Adapters plug in through the
//! traits in [`ports`].

pub mod entities;
pub mod ports;
pub mod services;
pub mod value_objects;
