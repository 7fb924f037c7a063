pub mod matching;
pub mod observer;
pub mod service;

pub use service::DispatchService;
