//! Messages exchanged between the levels of the controller and the devices behind the
//! communication level.
//!
//! On the wire a message is `{origin, destination, body: {category, data}}`. Commands carry a
//! `directive` and responses a `content` discriminator inside `data`.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{Arena, Heading, PortId, Position, RobotNumber, Turn};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Level {
    Main,
    Ai,
    Communication,
    Movement,
}

impl Level {
    pub const ALL: [Level; 4] = [
        Level::Main,
        Level::Ai,
        Level::Communication,
        Level::Movement,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Level::Main => "MAIN_LEVEL",
            Level::Ai => "AI_LEVEL",
            Level::Communication => "COM_LEVEL",
            Level::Movement => "MOV_LEVEL",
        }
    }
}

/// Origin or destination of a message: one of the levels or a device port.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Endpoint {
    Level(Level),
    Device(PortId),
}

impl Endpoint {
    pub const MAIN: Endpoint = Endpoint::Level(Level::Main);
    pub const AI: Endpoint = Endpoint::Level(Level::Ai);
    pub const COM: Endpoint = Endpoint::Level(Level::Communication);
    pub const MOV: Endpoint = Endpoint::Level(Level::Movement);

    /// Level whose mailbox receives messages for this endpoint. Devices are reached through the
    /// communication level.
    pub fn level(&self) -> Level {
        match self {
            Endpoint::Level(level) => *level,
            Endpoint::Device(_) => Level::Communication,
        }
    }

    pub fn port(&self) -> Option<&PortId> {
        match self {
            Endpoint::Device(port) => Some(port),
            Endpoint::Level(_) => None,
        }
    }
}

impl From<PortId> for Endpoint {
    fn from(value: PortId) -> Self {
        Endpoint::Device(value)
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Level::ALL
            .into_iter()
            .find(|level| level.name() == value)
            .map(Endpoint::Level)
            .unwrap_or_else(|| Endpoint::Device(PortId::new(value)))
    }
}

impl From<Endpoint> for String {
    fn from(value: Endpoint) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Level(level) => f.write_str(level.name()),
            Endpoint::Device(port) => write!(f, "{port}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub origin: Endpoint,
    pub destination: Endpoint,
    pub body: Body,
}

impl Message {
    pub fn new(origin: Endpoint, destination: Endpoint, body: Body) -> Self {
        Self {
            origin,
            destination,
            body,
        }
    }

    pub fn command(origin: Endpoint, destination: Endpoint, command: Command) -> Self {
        Self::new(origin, destination, Body::Command(command))
    }

    pub fn response(origin: Endpoint, destination: Endpoint, response: Response) -> Self {
        Self::new(origin, destination, Body::Response(response))
    }

    pub fn info(origin: Endpoint, destination: Endpoint, text: impl Into<String>) -> Self {
        Self::new(origin, destination, Body::Info(text.into()))
    }

    pub fn error(origin: Endpoint, destination: Endpoint, text: impl Into<String>) -> Self {
        Self::new(origin, destination, Body::Error(text.into()))
    }

    pub fn motion(origin: Endpoint, port: PortId, motion: Motion) -> Self {
        Self::command(origin, Endpoint::Device(port), Command::Movement(motion))
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, MessageError> {
        serde_json::from_value(value).map_err(MessageError::Decode)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, MessageError> {
        serde_json::to_value(self).map_err(MessageError::Encode)
    }

    pub fn motion_command(&self) -> Option<Motion> {
        match self.body {
            Body::Command(Command::Movement(motion)) => Some(motion),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "data", rename_all = "lowercase")]
pub enum Body {
    Command(Command),
    Response(Response),
    Info(String),
    Error(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "kebab-case")]
pub enum Command {
    /// A device announced itself on the origin port.
    Add,
    GeneratePlan { args: WorldSnapshot },
    ExecutePlan { args: Vec<PlanStep> },
    NoPlan,
    /// The origin device dropped its connection.
    Failure,
    Shutdown,
    Movement(Motion),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "content", content = "data", rename_all = "kebab-case")]
pub enum Response {
    RobotInfo(DeviceInfo),
    /// Readings keyed by logical robot id. Empty while the sensor has nothing to report.
    SensorCamera(BTreeMap<String, Pose>),
    Ping(Pose),
    MoveResult,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: Heading,
}

impl Pose {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Simulated,
    Physical,
    Camera,
}

/// Low-level command understood by the robot firmware. The numeric values are fixed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MotionCode {
    Forward = 1,
    TurnLeft = 3,
    TurnRight = 4,
    Identify = 90,
    CameraQuery = 91,
    SimulatedQuery = 99,
}

impl From<MotionCode> for u8 {
    fn from(value: MotionCode) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for MotionCode {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MotionCode::Forward),
            3 => Ok(MotionCode::TurnLeft),
            4 => Ok(MotionCode::TurnRight),
            90 => Ok(MotionCode::Identify),
            91 => Ok(MotionCode::CameraQuery),
            99 => Ok(MotionCode::SimulatedQuery),
            _ => Err(MessageError::InvalidMotionCode(value)),
        }
    }
}

impl From<Turn> for MotionCode {
    fn from(value: Turn) -> Self {
        match value {
            Turn::Left => MotionCode::TurnLeft,
            Turn::Right => MotionCode::TurnRight,
        }
    }
}

impl fmt::Display for MotionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Motion {
    pub command: MotionCode,
    pub magnitude: u32,
}

impl Motion {
    pub const fn new(command: MotionCode, magnitude: u32) -> Self {
        Self { command, magnitude }
    }

    pub const fn query(command: MotionCode) -> Self {
        Self::new(command, 0)
    }

    /// Turn by `degrees`, rounded to whole degrees.
    pub fn turn(turn: Turn, degrees: f64) -> Self {
        Self::new(turn.into(), degrees.abs().round() as u32)
    }

    /// Forward move by `cm`, truncated to whole centimetres.
    pub fn forward(cm: f64) -> Self {
        Self::new(MotionCode::Forward, cm.abs() as u32)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    MoveUp,
    MoveRight,
    MoveDown,
    MoveLeft,
}

impl Action {
    /// Absolute heading a robot faces while performing the action.
    pub fn heading(self) -> Heading {
        Heading::from_deg(match self {
            Action::MoveUp => 0.0,
            Action::MoveRight => 90.0,
            Action::MoveDown => 180.0,
            Action::MoveLeft => 270.0,
        })
    }
}

/// One planner action: which way the numbered robot moves by one tile.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlanStep(pub Action, pub RobotNumber);

/// Arena and robot state submitted to the planner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub arena: Arena,
    pub robots: Vec<RobotView>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RobotView {
    pub number: RobotNumber,
    pub position: Position,
    pub heading: Heading,
}

/// Item travelling through a mailbox. Anything that does not decode into a [`Message`] is kept
/// raw so it can be passed on for inspection.
#[derive(Clone, Debug, PartialEq)]
pub enum Mail {
    Message(Message),
    Raw(serde_json::Value),
}

impl Mail {
    pub fn decode(value: serde_json::Value) -> Self {
        match Message::from_json(value.clone()) {
            Ok(message) => Mail::Message(message),
            Err(err) => {
                debug!(%err, "keeping undecodable mail raw");
                Mail::Raw(value)
            }
        }
    }
}

impl From<Message> for Mail {
    fn from(value: Message) -> Self {
        Mail::Message(value)
    }
}

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("failed to decode message: {0}")]
    Decode(serde_json::Error),
    #[error("failed to encode message: {0}")]
    Encode(serde_json::Error),
    #[error("invalid motion code {0}")]
    InvalidMotionCode(u8),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case("MOV_LEVEL", Endpoint::MOV)]
    #[case("MAIN_LEVEL", Endpoint::MAIN)]
    #[case("COM7", Endpoint::Device(PortId::new("COM7")))]
    fn test_endpoint_from_string(#[case] name: &str, #[case] expected: Endpoint) {
        assert_eq!(Endpoint::from(name.to_string()), expected);
        assert_eq!(expected.to_string(), name);
    }

    #[test]
    fn test_endpoint_level() {
        assert_eq!(Endpoint::AI.level(), Level::Ai);
        assert_eq!(
            Endpoint::Device(PortId::new("SIM-1")).level(),
            Level::Communication
        );
    }

    #[test]
    fn test_motion_wire_format() {
        let message = Message::motion(
            Endpoint::MOV,
            PortId::new("SIM-0"),
            Motion::new(MotionCode::TurnRight, 90),
        );
        assert_eq!(
            message.to_json().unwrap(),
            json!({
                "origin": "MOV_LEVEL",
                "destination": "SIM-0",
                "body": {
                    "category": "command",
                    "data": {"directive": "movement", "command": 4, "magnitude": 90}
                }
            })
        );
    }

    #[rstest]
    #[case(Turn::Left, 89.6, Motion::new(MotionCode::TurnLeft, 90))]
    #[case(Turn::Right, 12.4, Motion::new(MotionCode::TurnRight, 12))]
    fn test_motion_turn(#[case] turn: Turn, #[case] degrees: f64, #[case] expected: Motion) {
        assert_eq!(Motion::turn(turn, degrees), expected);
    }

    #[test]
    fn test_motion_forward_truncates() {
        assert_eq!(Motion::forward(16.3), Motion::new(MotionCode::Forward, 16));
    }

    #[test]
    fn test_decode_sensor_camera() {
        let mail = Mail::decode(json!({
            "origin": "CAM_PROCESS",
            "destination": "MOV_LEVEL",
            "body": {
                "category": "response",
                "data": {
                    "content": "sensor-camera",
                    "data": {"smores1": {"x": 12.5, "y": 40.0, "heading": 3.0}}
                }
            }
        }));

        let expected = Message::response(
            Endpoint::Device(PortId::new("CAM_PROCESS")),
            Endpoint::MOV,
            Response::SensorCamera(BTreeMap::from([(
                "smores1".to_string(),
                Pose {
                    x: 12.5,
                    y: 40.0,
                    heading: Heading::from_deg(3.0),
                },
            )])),
        );
        assert_eq!(mail, Mail::Message(expected));
    }

    #[test]
    fn test_decode_execute_plan() {
        let message = Message::from_json(json!({
            "origin": "AI_LEVEL",
            "destination": "MOV_LEVEL",
            "body": {
                "category": "command",
                "data": {"directive": "execute-plan", "args": [["moveRight", 0], ["moveUp", 2]]}
            }
        }))
        .unwrap();

        assert_eq!(
            message.body,
            Body::Command(Command::ExecutePlan {
                args: vec![
                    PlanStep(Action::MoveRight, RobotNumber(0)),
                    PlanStep(Action::MoveUp, RobotNumber(2)),
                ]
            })
        );
    }

    #[rstest]
    #[case::not_a_message(json!("hello"))]
    #[case::unknown_directive(json!({
        "origin": "COM3",
        "destination": "MOV_LEVEL",
        "body": {"category": "command", "data": {"directive": "dance"}}
    }))]
    #[case::unknown_motion_code(json!({
        "origin": "MOV_LEVEL",
        "destination": "COM3",
        "body": {
            "category": "command",
            "data": {"directive": "movement", "command": 2, "magnitude": 0}
        }
    }))]
    fn test_decode_raw(#[case] value: serde_json::Value) {
        assert_eq!(Mail::decode(value.clone()), Mail::Raw(value));
    }
}
