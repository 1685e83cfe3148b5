//! Core error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GameError {
    /// The control loop has stopped and no longer drains its queues.
    #[error("Game loop is not running")]
    LoopClosed,
}
