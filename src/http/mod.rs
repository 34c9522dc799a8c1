//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, default middleware stack)
//!     → request.rs (request id)
//!     → security::guard (write guard)
//!     → handlers.rs (REST over the store)
//!     → error.rs / response.rs (status mapping, JSON bodies)
//!     → Send to client
//! ```

pub mod error;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use error::ApiError;
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
