mod client;
mod session;

pub use client::{ApiClient, ApiError};
pub use session::Session;
