//! The resource module encapsulates domain entities for use with Bevy.

use std::ops::{Deref, DerefMut};

use bevy::ecs::system::Resource;
use crossbeam_channel::Sender;
use tracing::warn;

use crate::domain;

#[derive(Resource, Clone, Default)]
pub struct PostOfficeRes(domain::PostOffice);

impl Deref for PostOfficeRes {
    type Target = domain::PostOffice;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<domain::PostOffice> for PostOfficeRes {
    fn from(value: domain::PostOffice) -> Self {
        Self(value)
    }
}

#[derive(Resource)]
pub struct MovementLevelRes(domain::MovementLevel);

impl Deref for MovementLevelRes {
    type Target = domain::MovementLevel;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MovementLevelRes {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<domain::MovementLevel> for MovementLevelRes {
    fn from(value: domain::MovementLevel) -> Self {
        Self(value)
    }
}

/// Hands a fatal tick error to whoever started the app, since the app itself is consumed by its
/// runner.
#[derive(Resource)]
pub struct FaultRes(Sender<domain::MovementError>);

impl FaultRes {
    pub fn raise(&self, err: domain::MovementError) {
        if self.0.send(err).is_err() {
            warn!("nobody is listening for controller faults");
        }
    }
}

impl From<Sender<domain::MovementError>> for FaultRes {
    fn from(value: Sender<domain::MovementError>) -> Self {
        Self(value)
    }
}
