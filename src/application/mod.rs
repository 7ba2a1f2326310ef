//! Application services: markup model, asset binding and the upload pipeline.

pub mod binder;
pub mod error;
pub mod markup;
pub mod pipeline;
pub mod store;
