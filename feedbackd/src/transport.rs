//! JSON-lines transport
//!
//! One JSON object per line in each direction:
//!
//! ```text
//! → {"play":{"event":"ringtone","properties":{"play.mode":{"string":"long"}, ...}}}
//! ← {"accepted":{"id":1}}
//! → {"stop":{"id":1}}
//! ← {"status":{"id":1,"code":2}}
//! ```
//!
//! A rejected play is answered with id `0`.

use feedback_store::Proplist;
use serde::{Deserialize, Serialize};

use crate::daemon::StatusReport;

/// A client command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Play {
        event: String,
        #[serde(default)]
        properties: Proplist,
    },
    Stop {
        id: u32,
    },
    Pause {
        id: u32,
        paused: bool,
    },
}

/// A line written back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Accepted { id: u32 },
    Status { id: u32, code: u32 },
    Error { message: String },
}

impl From<StatusReport> for Response {
    fn from(report: StatusReport) -> Self {
        Response::Status {
            id: report.id.as_u32(),
            code: report.code.code(),
        }
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

impl Response {
    /// Encode as a single line, newline included
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
