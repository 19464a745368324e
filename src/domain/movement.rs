//! Movement level: fuses device reports into the arena model and decides, once per tick, what
//! the swarm does next.
//!
//! A tick drains the movement mailbox and then runs the periodic logic: freakout when too many
//! positions failed to map onto the grid, sensor polling, alignment and the plan request. The
//! level never waits for a reply; readiness is derived from the device flags and counters.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    Arena, ArenaError, Body, Command, Config, Device, DeviceInfo, DeviceKind, Endpoint, Level,
    Mail, Message, Motion, MotionCode, PortId, PostOffice, Registry, Response, Robot, RobotKind,
    RobotNumber, RobotView, Sensor, SensorKind, Tile, WorldSnapshot,
};

/// Control state of the movement level.
///
/// A projection of the flags and counters a tick works from, kept for observation only: the
/// tick logs its transitions but never branches on it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Waiting for all devices to report, or for a failed device to reconnect.
    SettlingDevices,
    /// Waiting for fresh sensor readings.
    Polling,
    /// Robots are being centered on their tiles.
    Aligning,
    /// The swarm is aligned and is checked against the goal tiles.
    FormationCheck,
    /// A plan was requested and has not been answered yet.
    AwaitingPlan,
    /// Motion commands are still outstanding.
    ExecutingPlan,
}

pub struct MovementLevel {
    pub(super) config: Config,
    pub(super) arena: Arena,
    pub(super) robots: Registry<Robot>,
    pub(super) sensors: Registry<Sensor>,
    pub(super) aligned: bool,
    pub(super) processing_plan: bool,
    pub(super) scramble_counter: u32,
    pub(super) rng: ChaCha8Rng,
    running: bool,
    next_number: u32,
    phase: Phase,
}

impl MovementLevel {
    pub fn new(config: Config) -> Result<Self, ArenaError> {
        let arena = config.arena()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };

        Ok(Self {
            config,
            arena,
            robots: Registry::default(),
            sensors: Registry::default(),
            aligned: false,
            processing_plan: false,
            scramble_counter: 0,
            rng,
            running: true,
            next_number: 0,
            phase: Phase::SettlingDevices,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    #[cfg(test)]
    pub fn robots(&self) -> &Registry<Robot> {
        &self.robots
    }

    #[cfg(test)]
    pub fn sensors(&self) -> &Registry<Sensor> {
        &self.sensors
    }

    #[cfg(test)]
    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    #[cfg(test)]
    pub fn is_processing_plan(&self) -> bool {
        self.processing_plan
    }

    #[cfg(test)]
    pub fn scramble_counter(&self) -> u32 {
        self.scramble_counter
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn announce(&self, post: &PostOffice) {
        info!("movement level running");
        self.report(post, "MOV_LEVEL is running");
    }

    /// Runs one iteration of the control loop.
    ///
    /// A failing message ends the iteration early. Mail behind it stays queued for the next
    /// tick.
    pub fn tick(&mut self, post: &PostOffice) -> Result<(), MovementError> {
        for mail in post.pending(Level::Movement) {
            self.dispatch(post, mail)?;
        }

        if self.scramble_counter >= self.config.scramble_threshold {
            for port in self.robots.ports() {
                self.freakout(post, &port);
            }
            self.scramble_counter = 0;
        }

        self.check_sensors(post);

        if self.ready_for_align() {
            self.align_robots(post);
        }

        if self.ready_for_formation() {
            self.request_plan(post);
        }

        let phase = self.phase();
        if phase != self.phase {
            debug!(from = ?self.phase, to = ?phase, "movement phase changed");
            self.phase = phase;
        }

        Ok(())
    }

    pub fn phase(&self) -> Phase {
        if self.processing_plan {
            Phase::AwaitingPlan
        } else if !self.devices_settled() {
            Phase::SettlingDevices
        } else if self.robots.iter().any(|r| r.queued_commands > 0) {
            Phase::ExecutingPlan
        } else if self.sensors.iter().any(|s| !s.received) {
            Phase::Polling
        } else if !self.aligned {
            Phase::Aligning
        } else {
            Phase::FormationCheck
        }
    }

    fn dispatch(&mut self, post: &PostOffice, mail: Mail) -> Result<(), MovementError> {
        let message = match mail {
            Mail::Message(message) => message,
            Mail::Raw(value) => {
                debug!(%value, "passing undecoded mail to the top level");
                post.deliver(Level::Main, Mail::Raw(value));
                return Ok(());
            }
        };

        if message.destination != Endpoint::MOV {
            post.send(message);
            return Ok(());
        }

        let dumped = self.config.dump_messages_to_main;
        if dumped {
            post.deliver(Level::Main, Mail::Message(message.clone()));
        }

        if !handles(&message.body) {
            if !dumped {
                post.deliver(Level::Main, Mail::Message(message));
            }
            return Ok(());
        }

        match message.body {
            Body::Command(command) => {
                self.process_command(post, &message.origin, command)?;
            }
            Body::Response(response) => {
                self.process_response(post, &message.origin, response)?;
            }
            Body::Info(_) | Body::Error(_) => {}
        }
        Ok(())
    }

    fn process_command(
        &mut self,
        post: &PostOffice,
        origin: &Endpoint,
        command: Command,
    ) -> Result<(), MovementError> {
        match command {
            Command::Add => match origin.port() {
                Some(port) => post.send(Message::motion(
                    Endpoint::MOV,
                    port.clone(),
                    Motion::query(MotionCode::Identify),
                )),
                None => warn!(%origin, "add directive without a device port"),
            },
            Command::ExecutePlan { args } => {
                let executed = self.process_plan(post, &args);
                self.aligned = false;
                self.processing_plan = false;
                executed?;
            }
            Command::NoPlan => {
                self.processing_plan = false;
            }
            Command::Failure => self.mark_failure(origin),
            Command::Shutdown => {
                if *origin == Endpoint::MAIN {
                    info!("movement level shutting down");
                    self.report(post, "Shutting down MOV_LEVEL");
                    self.running = false;
                } else {
                    warn!(%origin, "ignoring shutdown directive");
                }
            }
            Command::GeneratePlan { .. } | Command::Movement(_) => {}
        }
        Ok(())
    }

    fn process_response(
        &mut self,
        post: &PostOffice,
        origin: &Endpoint,
        response: Response,
    ) -> Result<(), MovementError> {
        let Some(port) = origin.port().cloned() else {
            warn!(%origin, "response from a level instead of a device");
            return Ok(());
        };

        match response {
            Response::RobotInfo(device) => self.register(&port, device),
            Response::SensorCamera(readings) => {
                let sensor = self
                    .sensors
                    .get_mut(&port)
                    .ok_or_else(|| MovementError::UnknownSensor(port.clone()))?;
                // An empty reading is asked for again.
                if readings.is_empty() {
                    sensor.asked = false;
                } else {
                    sensor.received = true;
                }

                if self.config.show_sensor_dumps {
                    self.report(
                        post,
                        format!("Data received from the sensor camera\n{readings:?}"),
                    );
                }
                if readings.is_empty() {
                    return Ok(());
                }

                for (robot_id, pose) in &readings {
                    let Some(robot) = self
                        .robots
                        .find_mut(|r| r.id() == Some(robot_id.as_str()))
                    else {
                        debug!(%robot_id, "reading for an unregistered robot");
                        continue;
                    };
                    robot.position = pose.position();
                    robot.heading = pose.heading;
                    let robot_port = robot.port().clone();
                    self.update_tile(post, &robot_port);
                }
                self.aligned = false;
            }
            Response::Ping(pose) => {
                let Some(robot) = self.robots.get_mut(&port) else {
                    self.report_error(
                        post,
                        format!("Could not find the robot for the ping {port}"),
                    );
                    return Ok(());
                };
                if robot.kind() != RobotKind::Simulated {
                    return Ok(());
                }

                // The simulator reports metres.
                robot.position = pose.position().scaled(100.0);
                robot.heading = pose.heading;
                self.update_tile(post, &port);

                let sensor = self
                    .sensors
                    .get_mut(&port)
                    .ok_or_else(|| MovementError::UnknownSensor(port.clone()))?;
                sensor.received = true;
                self.aligned = false;
            }
            Response::MoveResult => {
                let robot = self
                    .robots
                    .get_mut(&port)
                    .ok_or_else(|| MovementError::UnknownRobot(port.clone()))?;
                robot.queued_commands = robot.queued_commands.saturating_sub(1);
                if robot.queued_commands > 0 {
                    return Ok(());
                }

                match robot.kind() {
                    RobotKind::Simulated => {
                        if let Some(sensor) = self.sensors.get_mut(&port) {
                            sensor.request_reading();
                        }
                    }
                    RobotKind::Physical => {
                        // The shared camera is only polled again once every robot stopped.
                        if self.robots.iter().all(|r| r.queued_commands == 0) {
                            if let Some(camera) =
                                self.sensors.find_mut(|s| s.kind() == SensorKind::Camera)
                            {
                                camera.request_reading();
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn register(&mut self, port: &PortId, device: DeviceInfo) {
        match device.kind {
            DeviceKind::Simulated => {
                if let Some(robot) = self.robots.get_mut(port) {
                    robot.connection_error = false;
                    if let Some(sensor) = self.sensors.get_mut(port) {
                        sensor.connection_error = false;
                    }
                    info!(%port, "simulated robot reconnected");
                    return;
                }
                let number = self.next_robot_number();
                self.robots.insert(Robot::new(
                    device.id,
                    port.clone(),
                    RobotKind::Simulated,
                    number,
                ));
                self.sensors
                    .insert(Sensor::new(port.clone(), SensorKind::SimulatedCamera));
                info!(%port, %number, "simulated robot registered");
            }
            DeviceKind::Physical => {
                let previous = device
                    .id
                    .as_deref()
                    .and_then(|id| self.robots.find(|r| r.id() == Some(id)))
                    .map(|r| r.port().clone());

                match previous {
                    Some(previous) => {
                        if previous != *port {
                            self.forget_robot(port);
                        }
                        if let Some(robot) = self.robots.rekey(&previous, port.clone()) {
                            robot.connection_error = false;
                            info!(%previous, %port, robot = %robot.label(), "robot reconnected");
                        }
                    }
                    None => {
                        if let Some(robot) = self.robots.get_mut(port) {
                            // Same robot unless both sides name different ids.
                            if robot.id().is_none() || device.id.is_none() {
                                if let Some(id) = device.id {
                                    robot.set_id(id);
                                }
                                robot.connection_error = false;
                                info!(%port, robot = %robot.label(), "robot reconnected");
                                return;
                            }
                        }
                        self.forget_robot(port);
                        let number = self.next_robot_number();
                        let robot = self.robots.insert(Robot::new(
                            device.id,
                            port.clone(),
                            RobotKind::Physical,
                            number,
                        ));
                        info!(%port, %number, robot = %robot.label(), "robot registered");
                    }
                }
            }
            DeviceKind::Camera => {
                let previous = self
                    .sensors
                    .find(|s| s.kind() == SensorKind::Camera)
                    .map(|s| s.port().clone());

                match previous {
                    Some(previous) => {
                        if let Some(camera) = self.sensors.rekey(&previous, port.clone()) {
                            camera.connection_error = false;
                            info!(%previous, %port, "camera reconnected");
                        }
                    }
                    None => {
                        self.sensors
                            .insert(Sensor::new(port.clone(), SensorKind::Camera));
                        info!(%port, "camera registered");
                    }
                }
            }
        }
    }

    /// Drops the robot registered on `port` and frees its tile.
    fn forget_robot(&mut self, port: &PortId) {
        let Some(robot) = self.robots.remove(port) else {
            return;
        };
        if let Some(coord) = self.arena.tile_for(robot.number()).map(Tile::coord) {
            self.arena.vacate(coord);
        }
        warn!(%port, robot = %robot.label(), "robot replaced by another device on its port");
    }

    fn mark_failure(&mut self, origin: &Endpoint) {
        let Some(port) = origin.port() else {
            warn!(%origin, "failure directive without a device port");
            return;
        };

        if let Some(robot) = self.robots.get_mut(port) {
            robot.connection_error = true;
            // A simulated robot and its sensor share one connection.
            if robot.kind() == RobotKind::Simulated {
                if let Some(sensor) = self.sensors.get_mut(port) {
                    sensor.connection_error = true;
                }
            }
            warn!(%port, robot = %robot.label(), "robot connection failed");
        } else if let Some(sensor) = self.sensors.get_mut(port) {
            sensor.connection_error = true;
            warn!(%port, "sensor connection failed");
        } else {
            warn!(%port, "failure reported for an unknown device");
        }
    }

    fn next_robot_number(&mut self) -> RobotNumber {
        let number = RobotNumber(self.next_number);
        self.next_number += 1;
        number
    }

    fn devices_settled(&self) -> bool {
        self.robots.len() >= self.config.number_of_devices
            && !self.robots.any_errored()
            && !self.sensors.any_errored()
    }

    /// Polls every sensor without an outstanding request.
    pub fn check_sensors(&mut self, post: &PostOffice) {
        if !self.devices_settled() {
            return;
        }

        for sensor in self.sensors.iter_mut().filter(|s| !s.asked) {
            let code = match sensor.kind() {
                SensorKind::SimulatedCamera => MotionCode::SimulatedQuery,
                SensorKind::Camera => MotionCode::CameraQuery,
            };
            post.send(Message::motion(
                Endpoint::MOV,
                sensor.port().clone(),
                Motion::query(code),
            ));
            sensor.asked = true;
        }
    }

    /// All devices reported fresh readings and nothing is moving.
    ///
    /// A robot that maps onto no tile schedules a freakout instead.
    pub fn ready_for_align(&mut self) -> bool {
        if !self.devices_settled() {
            return false;
        }
        if self.sensors.iter().any(|s| !s.received) {
            return false;
        }
        if self.robots.iter().any(|r| r.queued_commands > 0) {
            return false;
        }
        if self
            .robots
            .iter()
            .any(|r| self.arena.tile_for(r.number()).is_none())
        {
            self.scramble_counter = self.config.scramble_threshold;
            return false;
        }
        true
    }

    /// The swarm is aligned, no plan is outstanding and some robot is off its goal.
    pub fn ready_for_formation(&mut self) -> bool {
        if !self.aligned || self.processing_plan {
            return false;
        }

        let off_goal = self.robots.iter().any(|r| {
            !self
                .arena
                .tile_for(r.number())
                .is_some_and(Tile::is_goal)
        });
        if off_goal {
            return true;
        }

        // Keep the camera polling so robots entering a settled arena are noticed.
        if let Some(camera) = self
            .sensors
            .find_mut(|s| s.kind() == SensorKind::Camera && s.asked && s.received)
        {
            camera.request_reading();
        }
        false
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            arena: self.arena.clone(),
            robots: self
                .robots
                .iter()
                .map(|r| RobotView {
                    number: r.number(),
                    position: r.position,
                    heading: r.heading,
                })
                .collect(),
        }
    }

    fn request_plan(&mut self, post: &PostOffice) {
        debug!("submitting world model for planning");
        post.send(Message::command(
            Endpoint::MOV,
            Endpoint::AI,
            Command::GeneratePlan {
                args: self.snapshot(),
            },
        ));
        self.processing_plan = true;
    }

    pub(super) fn report(&self, post: &PostOffice, text: impl Into<String>) {
        post.send(Message::info(Endpoint::MOV, Endpoint::MAIN, text));
    }

    pub(super) fn report_error(&self, post: &PostOffice, text: impl Into<String>) {
        post.send(Message::error(Endpoint::MOV, Endpoint::MAIN, text));
    }
}

fn handles(body: &Body) -> bool {
    matches!(
        body,
        Body::Command(
            Command::Add
                | Command::ExecutePlan { .. }
                | Command::NoPlan
                | Command::Failure
                | Command::Shutdown
        ) | Body::Response(_)
    )
}

#[derive(Error, Debug, PartialEq)]
pub enum MovementError {
    #[error("no robot registered on port {0}")]
    UnknownRobot(PortId),
    #[error("no sensor registered on port {0}")]
    UnknownSensor(PortId),
    #[error("plan refers to unknown robot {0}")]
    UnknownPlanRobot(RobotNumber),
}
