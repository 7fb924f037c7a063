pub mod bootstrap;
pub mod dispatch;
pub mod http;
pub mod store;
pub mod sweeper;

pub use bootstrap::{HeadBootstrap, HeadHandle};
