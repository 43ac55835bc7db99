pub mod task;

pub use task::{QueueItem, Task};
