pub mod controller;
pub mod state;
pub mod viewer;

pub use controller::{SessionController, StartOutcome};
pub use state::{SessionState, SessionStatus};
pub use viewer::{Viewer, ViewerEvent};
