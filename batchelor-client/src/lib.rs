pub mod config;
pub mod error;
pub mod head_client;

pub use error::{ClientError, ClientResult};
pub use head_client::HeadClient;
