// HTTP routes
pub mod discovery;
pub mod health;
pub mod stream;

pub use discovery::*;
pub use health::*;
pub use stream::*;
