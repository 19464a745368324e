//! Controller driving the movement level.
//!
//! The level runs one tick per frame. A failed tick is reported to the top level; depending on
//! `raise_errors_after_catch` the app then either keeps going or stops with the fault recorded.

use bevy::{app::AppExit, prelude::*};
use tracing::{error, info};

use crate::{
    domain::{Endpoint, Message},
    resource::{FaultRes, MovementLevelRes, PostOfficeRes},
};

pub struct Controller;

impl Plugin for Controller {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, announce)
            .add_systems(Update, control);
    }
}

fn announce(level: Res<MovementLevelRes>, post: Res<PostOfficeRes>) {
    level.announce(&post);
}

fn control(
    mut level: ResMut<MovementLevelRes>,
    post: Res<PostOfficeRes>,
    faults: Res<FaultRes>,
    mut exit: EventWriter<AppExit>,
) {
    if let Err(err) = level.tick(&post) {
        error!(%err, "movement tick failed");
        post.send(Message::error(Endpoint::MOV, Endpoint::MAIN, err.to_string()));

        if level.config().raise_errors_after_catch {
            faults.raise(err);
            exit.send(AppExit);
            return;
        }
    }

    if !level.is_running() {
        info!("movement level stopped");
        exit.send(AppExit);
    }
}

#[cfg(test)]
mod tests {
    use bevy::ecs::event::Events;
    use crossbeam_channel::{unbounded, Receiver};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        domain::{
            Command, Config, Level, MovementError, MovementLevel, PortId, PostOffice, Response,
        },
        tests::*,
    };

    fn app(config: Config) -> (App, PostOffice, Receiver<MovementError>) {
        let (faults, raised) = unbounded();
        let post = PostOffice::default();
        let mut app = App::new();
        app.insert_resource(PostOfficeRes::from(post.clone()))
            .insert_resource(MovementLevelRes::from(MovementLevel::new(config).unwrap()))
            .insert_resource(FaultRes::from(faults))
            .add_plugins(Controller);
        (app, post, raised)
    }

    fn exited(app: &App) -> bool {
        !app.world.resource::<Events<AppExit>>().is_empty()
    }

    #[test]
    fn test_announces_and_stops_on_shutdown() {
        let (mut app, post, raised) = app(config(0));

        app.update();
        assert_eq!(
            messages(&post, Level::Main),
            vec![Message::info(Endpoint::MOV, Endpoint::MAIN, "MOV_LEVEL is running")]
        );
        assert!(!exited(&app));

        command(&post, Endpoint::MAIN, Command::Shutdown);
        app.update();
        assert!(exited(&app));
        assert!(raised.try_recv().is_err());
    }

    #[test]
    fn test_fault_stops_app_when_raising() {
        let (mut app, post, raised) = app(config(0));

        respond(&post, "GHOST", Response::MoveResult);
        app.update();

        assert!(exited(&app));
        assert_eq!(
            raised.try_recv(),
            Ok(MovementError::UnknownRobot(PortId::new("GHOST")))
        );
        assert_eq!(
            messages(&post, Level::Main).last(),
            Some(&Message::error(
                Endpoint::MOV,
                Endpoint::MAIN,
                "no robot registered on port GHOST"
            ))
        );
    }

    #[test]
    fn test_fault_is_only_reported_when_not_raising() {
        let (mut app, post, raised) = app(Config {
            raise_errors_after_catch: false,
            ..config(0)
        });

        respond(&post, "GHOST", Response::MoveResult);
        app.update();

        assert!(!exited(&app));
        assert!(raised.try_recv().is_err());
        assert_eq!(messages(&post, Level::Main).len(), 2);
    }
}
