//! Point-and-click element selection and mutation for rendered pages.
//!
//! The crate is split along the embedding boundary: [`editor::Agent`] lives
//! on the page side and owns the document, [`editor::Coordinator`] lives on
//! the host side and owns selection and history, and [`address`] gives both
//! sides a deterministic way to name the same element.

pub mod address;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dom;
pub mod editor;
pub mod error;
