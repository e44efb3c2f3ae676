//! All available after-tasks.
//!
//! Add new tasks here and register them in `create_after_registry`.

pub mod workspaces;
