//! Interactive editing layer: mode state machine, selection, input and
//! caller notifications.

pub mod controller;
pub mod events;
pub mod input;

pub use controller::Controller;
pub use events::{EngineEvent, EventDispatcher, ListenerId};
pub use input::{InputState, Key};

use serde::{Deserialize, Serialize};

/// Engine mode. Codes are stable at the caller boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum GameStatus {
    #[default]
    Rasterizing = 0,
    Editing = 1,
    RayTracing = 2,
}

impl TryFrom<u32> for GameStatus {
    type Error = u32;

    fn try_from(code: u32) -> std::result::Result<Self, u32> {
        match code {
            0 => Ok(GameStatus::Rasterizing),
            1 => Ok(GameStatus::Editing),
            2 => Ok(GameStatus::RayTracing),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        for s in [GameStatus::Rasterizing, GameStatus::Editing, GameStatus::RayTracing] {
            assert_eq!(GameStatus::try_from(s as u32), Ok(s));
        }
        assert_eq!(GameStatus::try_from(3), Err(3));
    }
}
