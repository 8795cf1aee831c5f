mod subscriber;
mod summary;
mod video;

pub use subscriber::*;
pub use summary::*;
pub use video::*;
