pub mod task;
pub mod wire;

pub use task::{fingerprint, Task, TaskState};
pub use wire::*;
