//! Greedy stand-in for the AI level.
//!
//! Every robot that is not on a goal tile steps one tile towards the closest free goal, as long
//! as the tile it steps onto is free. The movement level asks again once the steps are done.

use std::collections::BTreeMap;

use bevy::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        Action, Body, Command, Endpoint, Level, Mail, Message, PlanStep, PostOffice, RobotNumber,
        TileCoord, WorldSnapshot,
    },
    resource::PostOfficeRes,
};

pub struct Planner {
    robots_per_iteration: usize,
}

impl Planner {
    pub fn new(robots_per_iteration: usize) -> Self {
        Self {
            robots_per_iteration,
        }
    }
}

impl Plugin for Planner {
    fn build(&self, app: &mut App) {
        app.insert_resource(PlannerSettings {
            robots_per_iteration: self.robots_per_iteration,
        })
        .add_systems(Update, answer);
    }
}

#[derive(Resource)]
struct PlannerSettings {
    robots_per_iteration: usize,
}

fn answer(settings: Res<PlannerSettings>, post: Res<PostOfficeRes>) {
    serve(&post, settings.robots_per_iteration);
}

fn serve(post: &PostOffice, robots_per_iteration: usize) {
    for mail in post.pending(Level::Ai) {
        let message = match mail {
            Mail::Message(message) => message,
            Mail::Raw(value) => {
                warn!(%value, "planner cannot handle undecoded mail");
                continue;
            }
        };

        match message.body {
            Body::Command(Command::GeneratePlan { args }) => {
                let reply = match plan(&args, robots_per_iteration) {
                    Some(steps) => {
                        info!(steps = steps.len(), "plan generated");
                        Command::ExecutePlan { args: steps }
                    }
                    None => {
                        info!("no plan found");
                        Command::NoPlan
                    }
                };
                post.send(Message::command(Endpoint::AI, message.origin, reply));
            }
            body => debug!(origin = %message.origin, ?body, "planner ignoring message"),
        }
    }
}

/// Plans at most `limit` single-tile steps, one per robot.
///
/// Returns `None` when no robot can make progress.
pub fn plan(snapshot: &WorldSnapshot, limit: usize) -> Option<Vec<PlanStep>> {
    let arena = &snapshot.arena;
    let mut occupied: BTreeMap<TileCoord, RobotNumber> = arena
        .tiles()
        .iter()
        .filter_map(|t| Some((t.coord(), t.occupant()?)))
        .collect();
    let mut free_goals: Vec<TileCoord> = arena
        .tiles()
        .iter()
        .filter(|t| t.is_goal() && t.occupant().is_none())
        .map(|t| t.coord())
        .collect();

    let mut steps = Vec::new();
    for view in &snapshot.robots {
        if steps.len() >= limit {
            break;
        }
        let Some(tile) = arena.tile_for(view.number) else {
            continue;
        };
        if tile.is_goal() {
            continue;
        }
        let from = tile.coord();
        let Some(goal) = free_goals
            .iter()
            .copied()
            .min_by_key(|goal| manhattan(from, *goal))
        else {
            break;
        };

        let Some((action, to)) = moves_towards(from, goal)
            .into_iter()
            .find(|(_, to)| !occupied.contains_key(to))
        else {
            debug!(robot = %view.number, ?from, ?goal, "robot is blocked");
            continue;
        };

        occupied.remove(&from);
        occupied.insert(to, view.number);
        free_goals.retain(|g| *g != to);
        steps.push(PlanStep(action, view.number));
    }

    (!steps.is_empty()).then_some(steps)
}

fn manhattan(a: TileCoord, b: TileCoord) -> usize {
    a.row.abs_diff(b.row) + a.col.abs_diff(b.col)
}

/// Single-tile moves that bring `from` closer to `to`, rows first.
///
/// Rows grow eastwards and columns grow southwards.
fn moves_towards(from: TileCoord, to: TileCoord) -> Vec<(Action, TileCoord)> {
    let mut moves = Vec::with_capacity(2);
    if to.row > from.row {
        moves.push((Action::MoveRight, TileCoord::new(from.row + 1, from.col)));
    } else if to.row < from.row {
        moves.push((Action::MoveLeft, TileCoord::new(from.row - 1, from.col)));
    }
    if to.col > from.col {
        moves.push((Action::MoveDown, TileCoord::new(from.row, from.col + 1)));
    } else if to.col < from.col {
        moves.push((Action::MoveUp, TileCoord::new(from.row, from.col - 1)));
    }
    moves
}
