//! HTTP surface for DCAuth

pub mod gateway;
pub mod metrics;
pub mod routes;
pub mod server;

pub use gateway::{AuthGateway, CheckAuthResponse};
pub use metrics::MetricsRecorder;
pub use server::AuthServer;
