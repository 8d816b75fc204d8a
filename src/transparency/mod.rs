//! Transparency module for the editor agent.
//!
//! Tracks what the agent has processed so the user can audit it with
//! `synheart-editor status` at any time.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
