//! Simulation scripts.
//!
//! A script is TOML: the room name, optional session timer overrides and an
//! ordered list of steps.
//!
//! ```toml
//! room = "lobby"
//!
//! [session]
//! ack_interval_ms = 1000
//!
//! [[step]]
//! action = "found"
//! party = "alice"
//!
//! [[step]]
//! action = "advance"
//! ms = 5000
//! ```

use std::path::Path;
use std::time::Duration;

use concord_session::{LocalParty, SessionConfig};
use serde::{Deserialize, Serialize};

use crate::room::{Room, RoomReport};
use crate::{Result, SimError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_room")]
    pub room: String,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

fn default_room() -> String {
    "lobby".to_string()
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Found { party: String },
    Join { party: String },
    Say { party: String, text: String },
    Leave { party: String },
    /// Drop off the relay without a LEAVE.
    Vanish { party: String },
    Advance { ms: u64 },
}

impl SimConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SimError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SimError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Play the script against a fresh room.
    pub fn run(&self) -> Result<RoomReport> {
        let mut room = Room::new(self.room.clone(), self.session.clone());
        for (n, step) in self.steps.iter().enumerate() {
            tracing::debug!(step = n, ?step, "running step");
            match step {
                Step::Found { party } => room.found(LocalParty::generate(party.as_str()))?,
                Step::Join { party } => room.join(LocalParty::generate(party.as_str()))?,
                Step::Say { party, text } => room.say(party, text)?,
                Step::Leave { party } => room.leave(party)?,
                Step::Vanish { party } => room.vanish(party)?,
                Step::Advance { ms } => room.advance(Duration::from_millis(*ms))?,
            }
        }
        Ok(room.report())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            room: default_room(),
            session: SessionConfig::default(),
            steps: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let config = SimConfig::from_toml_str(
            r#"
room = "den"

[session]
ack_interval_ms = 250

[[step]]
action = "found"
party = "alice"

[[step]]
action = "say"
party = "alice"
text = "hello"

[[step]]
action = "advance"
ms = 1000
"#,
        )
        .expect("parse");
        assert_eq!(config.room, "den");
        assert_eq!(config.session.ack_interval_ms, 250);
        assert_eq!(config.session.heartbeat_interval_ms, 30_000);
        assert_eq!(
            config.steps,
            vec![
                Step::Found {
                    party: "alice".to_string()
                },
                Step::Say {
                    party: "alice".to_string(),
                    text: "hello".to_string()
                },
                Step::Advance { ms: 1000 },
            ]
        );
    }

    #[test]
    fn test_empty_script_is_default() {
        let config = SimConfig::from_toml_str("").expect("parse");
        assert_eq!(config.room, "lobby");
        assert!(config.steps.is_empty());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = SimConfig::from_toml_str("[[step]]\naction = \"dance\"\n").expect_err("bad action");
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn test_run_join_and_leave() {
        let config = SimConfig {
            steps: vec![
                Step::Found {
                    party: "alice".to_string(),
                },
                Step::Join {
                    party: "bob".to_string(),
                },
                Step::Say {
                    party: "bob".to_string(),
                    text: "hi".to_string(),
                },
                Step::Leave {
                    party: "bob".to_string(),
                },
            ],
            ..SimConfig::default()
        };
        let report = config.run().expect("run");
        let alice = report
            .parties
            .iter()
            .find(|p| p.nickname == "alice")
            .expect("alice");
        assert_eq!(alice.members, vec!["alice".to_string()]);
        let bob = report
            .parties
            .iter()
            .find(|p| p.nickname == "bob")
            .expect("bob");
        assert!(bob.left);
    }
}
