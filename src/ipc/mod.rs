mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use error::{err, ok};
pub use router::{handle_request, runs_detached};
pub use types::{AppState, Request};
