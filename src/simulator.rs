//! Simulation of the communication level.
//!
//! Simulated robots start on distinct random tiles, announce themselves to the movement level
//! and then answer its commands: identity queries, position polls (reported in metres, with some
//! measurement noise) and motions, which are applied right away and confirmed with a move result.

use std::collections::BTreeMap;

use bevy::prelude::*;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        Arena, Command, DeviceInfo, DeviceKind, Endpoint, Heading, Level, Mail, Message, Motion,
        MotionCode, PortId, Pose, Position, PostOffice, Response, SimulatorConfig,
    },
    resource::PostOfficeRes,
};

pub struct Simulator {
    config: SimulatorConfig,
    arena: Arena,
}

impl Simulator {
    pub fn new(config: SimulatorConfig, arena: Arena) -> Self {
        Self { config, arena }
    }
}

impl Plugin for Simulator {
    fn build(&self, app: &mut App) {
        app.insert_resource(Swarm::spawn(&self.config, &self.arena))
            .add_systems(Startup, connect)
            .add_systems(Update, communicate);
    }
}

fn connect(swarm: Res<Swarm>, post: Res<PostOfficeRes>) {
    swarm.connect(&post);
}

fn communicate(mut swarm: ResMut<Swarm>, post: Res<PostOfficeRes>) {
    swarm.serve(&post);
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct SimulatedRobot {
    position: Position,
    heading: Heading,
}

impl SimulatedRobot {
    fn apply(&mut self, motion: Motion) {
        let magnitude = f64::from(motion.magnitude);
        match motion.command {
            MotionCode::Forward => self.position = self.position.advanced(self.heading, magnitude),
            MotionCode::TurnLeft => self.heading = self.heading.rotated(-magnitude),
            MotionCode::TurnRight => self.heading = self.heading.rotated(magnitude),
            MotionCode::Identify | MotionCode::CameraQuery | MotionCode::SimulatedQuery => {}
        }
    }
}

#[derive(Resource)]
struct Swarm {
    robots: BTreeMap<PortId, SimulatedRobot>,
    noise: f64,
    rng: ChaCha8Rng,
}

impl Swarm {
    fn spawn(config: &SimulatorConfig, arena: &Arena) -> Self {
        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let noise = config.position_noise_cm.abs();

        let mut centers: Vec<Position> = arena.tiles().iter().map(|t| t.center()).collect();
        centers.shuffle(&mut rng);
        if config.robots > centers.len() {
            warn!(
                robots = config.robots,
                tiles = centers.len(),
                "more simulated robots than tiles"
            );
        }

        let robots = centers
            .into_iter()
            .take(config.robots)
            .enumerate()
            .map(|(idx, center)| {
                let robot = SimulatedRobot {
                    position: jitter(&mut rng, center, noise),
                    heading: Heading::from_deg(rng.random_range(0.0..360.0)),
                };
                (PortId::new(format!("SIM-{idx}")), robot)
            })
            .collect();

        Self { robots, noise, rng }
    }

    /// Announces every simulated robot to the movement level.
    fn connect(&self, post: &PostOffice) {
        for port in self.robots.keys() {
            info!(%port, "simulated robot connected");
            post.send(Message::command(
                Endpoint::Device(port.clone()),
                Endpoint::MOV,
                Command::Add,
            ));
        }
    }

    fn serve(&mut self, post: &PostOffice) {
        for mail in post.pending(Level::Communication) {
            let message = match mail {
                Mail::Message(message) => message,
                Mail::Raw(value) => {
                    warn!(%value, "simulator cannot handle undecoded mail");
                    continue;
                }
            };
            let (Some(port), Some(motion)) = (message.destination.port(), message.motion_command())
            else {
                debug!(destination = %message.destination, "ignoring non-motion mail");
                continue;
            };
            let Some(response) = self.respond(port, motion) else {
                continue;
            };
            // Replies travel as wire JSON, like those of a physical device.
            let reply = Message::response(
                message.destination.clone(),
                message.origin.clone(),
                response,
            );
            match reply.to_json() {
                Ok(value) => post.deliver_json(reply.destination.level(), value),
                Err(err) => warn!(%err, "failed to encode simulator reply"),
            }
        }
    }

    fn respond(&mut self, port: &PortId, motion: Motion) -> Option<Response> {
        let noise = self.noise;
        let Some(robot) = self.robots.get_mut(port) else {
            warn!(%port, "no simulated robot on port");
            return None;
        };

        match motion.command {
            MotionCode::Identify => Some(Response::RobotInfo(DeviceInfo {
                kind: DeviceKind::Simulated,
                id: None,
            })),
            MotionCode::SimulatedQuery => {
                let measured = jitter(&mut self.rng, robot.position, noise).scaled(0.01);
                Some(Response::Ping(Pose {
                    x: measured.x(),
                    y: measured.y(),
                    heading: robot.heading,
                }))
            }
            MotionCode::CameraQuery => {
                warn!(%port, "simulated robot has no camera attached");
                None
            }
            MotionCode::Forward | MotionCode::TurnLeft | MotionCode::TurnRight => {
                robot.apply(motion);
                debug!(%port, ?robot, "simulated robot moved");
                Some(Response::MoveResult)
            }
        }
    }
}

fn jitter(rng: &mut ChaCha8Rng, position: Position, noise: f64) -> Position {
    if noise == 0.0 {
        return position;
    }
    Position::new(
        position.x() + rng.random_range(-noise..=noise),
        position.y() + rng.random_range(-noise..=noise),
    )
}
