//! Saving and loading cluster state

pub mod json;

pub use json::JsonFileStore;
