mod engine;
mod scheduler;

pub use engine::SyncEngine;
pub use scheduler::Scheduler;
