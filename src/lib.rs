//! Email signature processing: binds uploaded images to `<img>` elements,
//! rewrites their sources to public object-store URLs and persists the
//! images and the rewritten document.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
