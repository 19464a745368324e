//! Top level: renders what the other levels report and ends the run after an optional number of
//! frames.

use bevy::{core::FrameCount, prelude::*};
use tracing::{debug, error, info, warn};

use crate::{
    domain::{Body, Command, Endpoint, Level, Mail, Message, PostOffice},
    resource::PostOfficeRes,
};

pub struct Console {
    max_ticks: Option<u32>,
}

impl Console {
    pub fn new(max_ticks: Option<u32>) -> Self {
        Self { max_ticks }
    }
}

impl Plugin for Console {
    fn build(&self, app: &mut App) {
        app.insert_resource(TickLimit(self.max_ticks))
            .add_systems(Update, stop_after_limit)
            .add_systems(PostUpdate, print);
    }
}

#[derive(Resource)]
struct TickLimit(Option<u32>);

fn print(post: Res<PostOfficeRes>) {
    render(&post);
}

fn render(post: &PostOffice) -> usize {
    let mut rendered = 0;
    for mail in post.pending(Level::Main) {
        rendered += 1;
        match mail {
            Mail::Message(Message { origin, body, .. }) => match body {
                Body::Info(text) => info!(%origin, "{text}"),
                Body::Error(text) => error!(%origin, "{text}"),
                body => debug!(%origin, ?body, "message for the top level"),
            },
            Mail::Raw(value) => warn!(%value, "undecodable mail"),
        }
    }
    rendered
}

fn stop_after_limit(
    limit: Res<TickLimit>,
    frames: Res<FrameCount>,
    post: Res<PostOfficeRes>,
    mut sent: Local<bool>,
) {
    let Some(max_ticks) = limit.0 else {
        return;
    };
    if !*sent && frames.0 >= max_ticks {
        info!(max_ticks, "tick limit reached");
        post.send(Message::command(
            Endpoint::MAIN,
            Endpoint::MOV,
            Command::Shutdown,
        ));
        *sent = true;
    }
}
