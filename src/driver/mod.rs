pub mod backend;
pub mod chrome;
pub mod render;
pub mod stub;
pub mod types;

pub use backend::{PageDriver, poll_until};
pub use chrome::ChromePage;
pub use render::Canvas;
pub use stub::{StubDocument, StubPage};
pub use types::{DriverError, DriverResult, ElementState, Selector};
