pub mod cache;
pub mod config;
pub mod error;
pub mod gate;
pub mod kversion;
pub mod lab;
pub mod tfvars;
pub mod types;

pub use error::{LabError, Result};
