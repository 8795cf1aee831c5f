mod catalog;
mod subscriptions;

pub use catalog::{VideoCatalog, DEFAULT_PAGE_SIZE};
pub use subscriptions::Subscriptions;
