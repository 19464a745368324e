//! Robots and sensors known to the movement level, keyed by the port they currently talk on.

use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt,
};

use serde::{Deserialize, Serialize};

use super::{Heading, Position};

/// Channel a device talks on. May change when a device reconnects.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(String);

impl PortId {
    pub fn new(port: impl Into<String>) -> Self {
        Self(port.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number under which the planner refers to a robot.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RobotNumber(pub u32);

impl fmt::Display for RobotNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RobotKind {
    Simulated,
    Physical,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SensorKind {
    /// Position source paired with a single simulated robot.
    SimulatedCamera,
    /// Overhead camera shared by all physical robots.
    Camera,
}

pub trait Device {
    fn port(&self) -> &PortId;

    fn set_port(&mut self, port: PortId);

    fn has_connection_error(&self) -> bool;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Robot {
    id: Option<String>,
    port: PortId,
    kind: RobotKind,
    number: RobotNumber,
    pub position: Position,
    pub heading: Heading,
    pub queued_commands: u32,
    pub connection_error: bool,
}

impl Robot {
    pub fn new(id: Option<String>, port: PortId, kind: RobotKind, number: RobotNumber) -> Self {
        Self {
            id,
            port,
            kind,
            number,
            position: Position::default(),
            heading: Heading::NORTH,
            queued_commands: 0,
            connection_error: false,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Records the logical id once the robot reports it.
    pub fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    pub fn kind(&self) -> RobotKind {
        self.kind
    }

    pub fn number(&self) -> RobotNumber {
        self.number
    }

    /// Name used in reports: the logical id if known, the port otherwise.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => self.port.to_string(),
        }
    }
}

impl Device for Robot {
    fn port(&self) -> &PortId {
        &self.port
    }

    fn set_port(&mut self, port: PortId) {
        self.port = port;
    }

    fn has_connection_error(&self) -> bool {
        self.connection_error
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sensor {
    port: PortId,
    kind: SensorKind,
    /// A poll is outstanding.
    pub asked: bool,
    /// A reading arrived since the flags were last reset.
    pub received: bool,
    pub connection_error: bool,
}

impl Sensor {
    pub fn new(port: PortId, kind: SensorKind) -> Self {
        Self {
            port,
            kind,
            asked: false,
            received: false,
            connection_error: false,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn request_reading(&mut self) {
        self.asked = false;
        self.received = false;
    }
}

impl Device for Sensor {
    fn port(&self) -> &PortId {
        &self.port
    }

    fn set_port(&mut self, port: PortId) {
        self.port = port;
    }

    fn has_connection_error(&self) -> bool {
        self.connection_error
    }
}

/// Devices keyed by their current port.
#[derive(Clone, Debug, PartialEq)]
pub struct Registry<T> {
    entries: BTreeMap<PortId, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: Device> Registry<T> {
    pub fn insert(&mut self, device: T) -> &mut T {
        match self.entries.entry(device.port().clone()) {
            Entry::Occupied(mut entry) => {
                entry.insert(device);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(device),
        }
    }

    pub fn get(&self, port: &PortId) -> Option<&T> {
        self.entries.get(port)
    }

    pub fn get_mut(&mut self, port: &PortId) -> Option<&mut T> {
        self.entries.get_mut(port)
    }

    #[cfg(test)]
    pub fn contains(&self, port: &PortId) -> bool {
        self.entries.contains_key(port)
    }

    pub fn remove(&mut self, port: &PortId) -> Option<T> {
        self.entries.remove(port)
    }

    /// Moves the device registered under `from` to `to`. Anything registered under `to` is
    /// replaced.
    pub fn rekey(&mut self, from: &PortId, to: PortId) -> Option<&mut T> {
        let mut device = self.entries.remove(from)?;
        device.set_port(to);
        Some(self.insert(device))
    }

    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        self.entries.values().find(|d| predicate(d))
    }

    pub fn find_mut(&mut self, predicate: impl Fn(&T) -> bool) -> Option<&mut T> {
        self.entries.values_mut().find(|d| predicate(d))
    }

    pub fn any_errored(&self) -> bool {
        self.entries.values().any(|d| d.has_connection_error())
    }

    pub fn ports(&self) -> Vec<PortId> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
