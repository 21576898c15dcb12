// Message types exchanged with the front-ends

use serde::{Deserialize, Serialize};

// Body of `POST /pi`: one command line for the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub content: String,
}

/// Result of one executed command, reported back to the console
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Done,
    Voltage(f32),
}
