use std::{path::PathBuf, process::ExitCode};

use bevy::{app::ScheduleRunnerPlugin, log::LogPlugin, prelude::*};
use clap::Parser;
use crossbeam_channel::unbounded;

use crate::{
    domain::{Config, ConfigError, MovementLevel, PostOffice},
    resource::{FaultRes, MovementLevelRes, PostOfficeRes},
};


mod console;
mod controller;
mod domain;
mod planner;
mod resource;
mod simulator;

/// Movement level of a grid robot swarm, driven by simulated robots.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON configuration file; missing keys keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Number of simulated robots
    #[arg(short, long)]
    robots: Option<usize>,
    /// Seed for the controller and the simulator
    #[arg(short, long)]
    seed: Option<u64>,
    /// Shut down after this many frames
    #[arg(short, long)]
    max_ticks: Option<u32>,
}

impl Args {
    fn config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(robots) = self.robots {
            config.simulator.robots = robots;
            config.number_of_devices = robots;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
            config.simulator.seed = Some(seed);
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match args.config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let level = match MovementLevel::new(config.clone()) {
        Ok(level) => level,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let arena = level.arena().clone();
    let (faults, raised) = unbounded();

    App::new()
        .add_plugins((
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(config.loop_sleep_interval())),
            LogPlugin::default(),
        ))
        .insert_resource(PostOfficeRes::from(PostOffice::default()))
        .insert_resource(MovementLevelRes::from(level))
        .insert_resource(FaultRes::from(faults))
        .add_plugins((
            console::Console::new(args.max_ticks),
            controller::Controller,
            planner::Planner::new(config.robots_planned_per_iteration),
            simulator::Simulator::new(config.simulator.clone(), arena),
        ))
        .run();

    match raised.try_recv() {
        Ok(err) => {
            eprintln!("error: controller stopped: {err}");
            ExitCode::FAILURE
        }
        Err(_) => ExitCode::SUCCESS,
    }
}
