use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::validation::validate_device_id,
    services::input_service::ButtonRole,
    state::{game::AnswerColor, player::PlayerKey},
};

#[derive(Debug, Deserialize, Serialize)]
/// Messages accepted from controller bridge WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceInboundMessage {
    /// First frame of every connection.
    Identification { id: String },
    /// A debounced button press.
    Press { player: PlayerKey, button: DeviceButton },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Validate)]
struct DeviceIdentity {
    #[validate(custom(function = "validate_device_id"))]
    id: String,
}

impl DeviceInboundMessage {
    /// Parse a text frame, validating the identifier of identification frames.
    pub fn from_json_str(raw: &str) -> Result<Self, DeviceMessageError> {
        let message: Self = serde_json::from_str(raw)?;
        if let Self::Identification { id } = &message {
            DeviceIdentity { id: id.clone() }.validate()?;
        }
        Ok(message)
    }
}

/// Why an inbound device frame was refused.
#[derive(Debug, thiserror::Error)]
pub enum DeviceMessageError {
    #[error("malformed device message: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid device message: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Physical button of a controller.
pub enum DeviceButton {
    /// The large red button on top.
    Commit,
    Blue,
    Orange,
    Green,
    Yellow,
}

impl From<DeviceButton> for ButtonRole {
    fn from(button: DeviceButton) -> Self {
        match button {
            DeviceButton::Commit => ButtonRole::Commit,
            DeviceButton::Blue => ButtonRole::Answer(AnswerColor::Blue),
            DeviceButton::Orange => ButtonRole::Answer(AnswerColor::Orange),
            DeviceButton::Green => ButtonRole::Answer(AnswerColor::Green),
            DeviceButton::Yellow => ButtonRole::Answer(AnswerColor::Yellow),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Fire-and-forget light command pushed to controller bridges.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndicatorCommand {
    /// Switch one player's light.
    SetOne { player: PlayerKey, on: bool },
    /// Switch every light.
    SetAll { on: bool },
    /// Blink a light `times` times.
    Flash {
        player: PlayerKey,
        times: u32,
        interval_ms: u64,
    },
    /// Winner celebration pattern.
    Victory { winner: PlayerKey },
}

#[derive(Debug, Serialize, ToSchema)]
/// Positive acknowledgement sent to a bridge after successful identification.
pub struct DeviceAck {
    pub id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_press_frames() {
        let message =
            DeviceInboundMessage::from_json_str(r#"{"type":"press","player":"player3","button":"green"}"#)
                .unwrap();
        match message {
            DeviceInboundMessage::Press { player, button } => {
                assert_eq!(player, PlayerKey::Three);
                assert_eq!(
                    ButtonRole::from(button),
                    ButtonRole::Answer(AnswerColor::Green)
                );
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn rejects_blank_identification() {
        assert!(DeviceInboundMessage::from_json_str(r#"{"type":"identification","id":""}"#).is_err());
        assert!(
            DeviceInboundMessage::from_json_str(r#"{"type":"identification","id":"bridge-1"}"#)
                .is_ok()
        );
    }

    #[test]
    fn unknown_frames_are_tolerated() {
        let message = DeviceInboundMessage::from_json_str(r#"{"type":"rumble"}"#).unwrap();
        assert!(matches!(message, DeviceInboundMessage::Unknown));
    }

    #[test]
    fn indicator_commands_are_tagged() {
        let json = serde_json::to_value(IndicatorCommand::Flash {
            player: PlayerKey::Two,
            times: 3,
            interval_ms: 200,
        })
        .unwrap();
        assert_eq!(json["type"], "flash");
        assert_eq!(json["player"], "player2");
        assert_eq!(json["interval_ms"], 200);
    }
}
