pub mod client;
pub mod retry;

use datalyst_core::config::ModelConfig;
use datalyst_core::traits::Oracle;

pub use client::OpenAiOracle;
pub use retry::RetryingOracle;

/// Create an oracle client from model config, wrapped with transport-level
/// retry when configured.
pub fn create_oracle(config: &ModelConfig) -> Box<dyn Oracle> {
    let client = OpenAiOracle::new(config.clone());
    match &config.retry {
        Some(retry) => Box::new(RetryingOracle::new(Box::new(client), retry.clone())),
        None => Box::new(client),
    }
}
