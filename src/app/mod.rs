pub mod errors;
pub mod runtime;
pub mod session;

pub use errors::AppError;
pub use runtime::{RuntimeConfig, SessionHandle};
pub use session::Session;
