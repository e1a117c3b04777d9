//! Provider integration module.
//!
//! This module defines the narrow provider contract the engine depends on,
//! a file-backed provider that implements it, and the observer that fetches
//! actual state per environment.

mod client;
mod types;
mod local;
mod observer;

pub use client::Provider;
pub use types::{
    ObservedResource, ResourceSpec, TAG_ENVIRONMENT, TAG_NAME, TAG_TYPE, TagMap,
};
pub use local::LocalProvider;
pub use observer::{ObservedState, ResourceObserver};
