//! The domain module encapsulates the movement level of the controller: the arena model, the
//! registry of robots and sensors, the message vocabulary shared by all levels, and the control
//! logic that turns sensor readings and plans into motion commands.
//!
//! Nothing in here depends on the runtime that schedules the levels.

mod arena;
mod basis;
mod config;
mod device;
mod mailbox;
mod message;
mod motion;
mod movement;

pub use arena::{Arena, ArenaError, Tile, TileCoord};
pub use basis::{bearing, turn_direction, Heading, Position, Turn};
pub use config::{Config, ConfigError, SimulatorConfig};
pub use device::{Device, PortId, Registry, Robot, RobotKind, RobotNumber, Sensor, SensorKind};
pub use mailbox::PostOffice;
pub use message::{
    Action, Body, Command, DeviceInfo, DeviceKind, Endpoint, Level, Mail, Message, Motion,
    MotionCode, PlanStep, Pose, Response, RobotView, WorldSnapshot,
};
pub use movement::{MovementError, MovementLevel};
