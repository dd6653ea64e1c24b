//! Async driver for the [`hostresolv`] engine, built on `async-io`.

pub mod resolver;

pub use resolver::AsyncResolver;
