//! Terminal front end for the Peng chat backend.

pub mod app;
pub mod render;
pub mod settings;
