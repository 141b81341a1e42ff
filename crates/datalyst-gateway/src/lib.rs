//! HTTP gateway: upload a dataset, ask questions, get answers.

pub mod routes;
pub mod server;
pub mod state;

pub use server::GatewayServer;
pub use state::AppState;
