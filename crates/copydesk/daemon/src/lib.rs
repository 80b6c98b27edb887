//! Copydesk daemon library
//!
//! This module provides the components behind `copydeskd`:
//! - REST API handlers over the workflow engine
//! - Layered configuration
//! - Storage and evaluator wiring
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, ApiResult, DaemonError, DaemonResult};
pub use server::{bootstrap, Server};
