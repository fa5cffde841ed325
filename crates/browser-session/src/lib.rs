//! Browser session layer: owns the Chromium process or remote-debugging
//! connection and tracks the single active page all tools operate on.

pub mod config;
pub mod error;
pub mod mutation;
pub mod page;
pub mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use mutation::{MutationProbe, MutationTracker};
pub use page::{ActionFeedback, PageBinding, PageInfo, PageSession};
pub use session::BrowserSession;
