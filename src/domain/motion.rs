//! Translation of alignment corrections, plans and freakouts into motion commands, and the
//! bookkeeping of which tile each robot stands on.

use std::ops::RangeInclusive;

use rand::Rng;
use tracing::{debug, warn};

use super::{
    bearing, turn_direction, Device, Endpoint, Heading, Message, Motion, MotionCode,
    MovementError, MovementLevel, PlanStep, PortId, PostOffice, Tile, Turn,
};

impl MovementLevel {
    /// Checks every robot against its tile center and north, and corrects the ones that are off.
    ///
    /// The swarm counts as aligned when no robot needed a correction during this pass.
    pub fn align_robots(&mut self, post: &PostOffice) {
        let max_center = self.config.max_center_misalignment;
        let max_north = self.config.max_north_misalignment;
        let mut misaligned = 0;

        for port in self.robots.ports() {
            let Some(robot) = self.robots.get(&port) else {
                continue;
            };
            let off_center = self
                .arena
                .tile_for(robot.number())
                .map(|t| robot.position.distance(t.center()));
            let heading = robot.heading.to_deg();
            let facing_north = robot.heading.off_north() <= max_north;

            if off_center.is_some_and(|d| d <= max_center) && facing_north {
                continue;
            }

            misaligned += 1;
            let report = match off_center {
                Some(off_center) => format!(
                    "Robot {} is {off_center:.1} cm off center with a heading of {heading:.0} \
                     degrees. Alignment in progress.",
                    robot.label()
                ),
                None => format!(
                    "Robot {} is not on any tile with a heading of {heading:.0} degrees. \
                     Alignment in progress.",
                    robot.label()
                ),
            };
            self.report(post, report);
            self.align(post, &port);
        }

        self.aligned = misaligned == 0;
    }

    /// Turns the robot towards its tile center, drives there and turns back north.
    pub fn align(&mut self, post: &PostOffice, port: &PortId) {
        let Some(robot) = self.robots.get(port) else {
            return;
        };
        let Some(center) = self.arena.tile_for(robot.number()).map(Tile::center) else {
            let text = format!("Error aligning, no tile center found for {}", robot.label());
            self.report_error(post, text);
            return;
        };

        let center_heading = bearing(robot.position, center);
        let distance_to_center = robot.position.distance(center);
        let (turn_to_center, angle_to_center) = turn_direction(robot.heading - center_heading);
        let (turn_to_north, angle_to_north) = turn_direction(center_heading - Heading::NORTH);

        self.emit(
            post,
            port,
            &[
                Motion::turn(turn_to_center, angle_to_center),
                Motion::forward(distance_to_center),
                Motion::turn(turn_to_north, angle_to_north),
            ],
        );
    }

    /// Executes planner actions in order: each robot turns towards its destination tile and
    /// moves one tile length.
    ///
    /// The heading is updated right away, before the robot confirms the turn. Nothing is sent if
    /// any step names an unknown robot.
    pub fn process_plan(
        &mut self,
        post: &PostOffice,
        steps: &[PlanStep],
    ) -> Result<(), MovementError> {
        let ports = steps
            .iter()
            .map(|step| {
                self.robots
                    .find(|r| r.number() == step.1)
                    .map(|r| r.port().clone())
                    .ok_or(MovementError::UnknownPlanRobot(step.1))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tile_length = Motion::forward(self.arena.cm_per_tile());

        for (PlanStep(action, number), port) in steps.iter().zip(ports) {
            let Some(robot) = self.robots.get_mut(&port) else {
                continue;
            };
            let destination = action.heading();
            let (turn, magnitude) = turn_direction(robot.heading - destination);
            robot.heading = destination;
            debug!(%number, ?action, %port, "executing plan step");

            self.emit(post, &port, &[Motion::turn(turn, magnitude), tile_length]);
        }
        Ok(())
    }

    /// Moves the robot's occupancy to the tile under its current position.
    pub fn update_tile(&mut self, post: &PostOffice, port: &PortId) {
        let Some(robot) = self.robots.get(port) else {
            return;
        };
        let number = robot.number();
        let old = self.arena.tile_for(number).map(Tile::coord);
        let Some(new) = self.arena.tile_at(robot.position).map(Tile::coord) else {
            let text = format!("Could not find a tile for {}", robot.label());
            self.scramble_counter += 1;
            self.report_error(post, text);
            return;
        };

        if old == Some(new) {
            return;
        }

        if let Err(err) = self.arena.place(new, number) {
            warn!(%err, %port, "tile update failed");
        }
    }

    /// Sends random turns and short moves to shake a robot off a tile it shares with another.
    pub fn freakout(&mut self, post: &PostOffice, port: &PortId) {
        self.report(post, "Tile conflict, freakout in progress.");

        let iterations = self.config.freakout_iterations;
        let distance: RangeInclusive<u32> = self.config.freakout_distance.into();

        for _ in 0..iterations {
            let turn = if self.rng.random_bool(0.5) {
                Turn::Left
            } else {
                Turn::Right
            };
            let turn = Motion::new(turn.into(), self.rng.random_range(0..=180));
            let forward = Motion::new(MotionCode::Forward, self.rng.random_range(distance.clone()));

            for motion in [turn, forward] {
                post.send(Message::motion(Endpoint::MOV, port.clone(), motion));
            }
        }

        if let Some(robot) = self.robots.get_mut(port) {
            robot.queued_commands = iterations.saturating_mul(2);
        }
    }

    fn emit(&mut self, post: &PostOffice, port: &PortId, motions: &[Motion]) {
        for motion in motions {
            post.send(Message::motion(Endpoint::MOV, port.clone(), *motion));
        }
        if let Some(robot) = self.robots.get_mut(port) {
            robot.queued_commands += motions.len() as u32;
        }
    }
}
