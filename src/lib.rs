#[macro_use]
extern crate slog;

pub mod api;
#[macro_use]
pub mod app;
pub mod config;
pub mod dataset;
pub mod error;
pub mod io;
pub mod lang;
pub mod logging;
pub mod models;
pub mod preprocessing;
pub mod training;
pub mod utils;

pub use crate::api::{Annotation, Resources, Tagger};
pub use crate::error::{Error, Result};
