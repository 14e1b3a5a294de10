//! HTTP surface of the lineup service

pub mod handlers;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, ApiState};
