//! One mailbox per level. Any level may post to any mailbox without blocking; each mailbox is
//! drained by the level that owns it.

use std::collections::BTreeMap;

use crossbeam_channel::{unbounded, Receiver, Sender, TryIter};
use tracing::warn;

use super::{Level, Mail, Message};

#[derive(Clone, Debug)]
struct Mailbox {
    sender: Sender<Mail>,
    receiver: Receiver<Mail>,
}

#[derive(Clone, Debug)]
pub struct PostOffice {
    mailboxes: BTreeMap<Level, Mailbox>,
}

impl Default for PostOffice {
    fn default() -> Self {
        Self {
            mailboxes: Level::ALL
                .into_iter()
                .map(|level| {
                    let (sender, receiver) = unbounded();
                    (level, Mailbox { sender, receiver })
                })
                .collect(),
        }
    }
}

impl PostOffice {
    /// Routes a message to the mailbox of its destination.
    pub fn send(&self, message: Message) {
        let level = message.destination.level();
        self.deliver(level, Mail::Message(message));
    }

    pub fn deliver(&self, level: Level, mail: Mail) {
        if let Some(mailbox) = self.mailboxes.get(&level) {
            if mailbox.sender.send(mail).is_err() {
                warn!(level = level.name(), "mailbox closed, mail dropped");
            }
        }
    }

    /// Decodes raw device traffic at the mailbox boundary.
    pub fn deliver_json(&self, level: Level, value: serde_json::Value) {
        self.deliver(level, Mail::decode(value));
    }

    /// Takes everything currently waiting for `level`, without blocking.
    #[cfg(test)]
    pub fn drain(&self, level: Level) -> Vec<Mail> {
        self.pending(level).collect()
    }

    /// Non-blocking iterator over the mail waiting for `level`. Mail not consumed stays queued.
    pub fn pending(&self, level: Level) -> Pending<'_> {
        Pending(self.mailboxes.get(&level).map(|m| m.receiver.try_iter()))
    }

    #[cfg(test)]
    pub fn is_empty(&self, level: Level) -> bool {
        self.mailboxes
            .get(&level)
            .map_or(true, |m| m.receiver.is_empty())
    }
}

pub struct Pending<'a>(Option<TryIter<'a, Mail>>);

impl Iterator for Pending<'_> {
    type Item = Mail;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.as_mut().and_then(|iter| iter.next())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::domain::{Endpoint, PortId};

    #[test]
    fn test_post_office_routes_by_destination() {
        let post = PostOffice::default();
        post.send(Message::info(Endpoint::MOV, Endpoint::MAIN, "hello"));
        post.send(Message::info(
            Endpoint::MOV,
            Endpoint::Device(PortId::new("SIM-0")),
            "to a device",
        ));

        assert_eq!(post.drain(Level::Main).len(), 1);
        assert_eq!(post.drain(Level::Communication).len(), 1);
        assert!(post.is_empty(Level::Movement));
        assert!(post.is_empty(Level::Main));
    }

    #[test]
    fn test_post_office_pending_keeps_unconsumed_mail() {
        let post = PostOffice::default();
        for text in ["a", "b", "c"] {
            post.send(Message::info(Endpoint::MAIN, Endpoint::MOV, text));
        }

        let first = post.pending(Level::Movement).next();
        assert_eq!(
            first,
            Some(Mail::Message(Message::info(Endpoint::MAIN, Endpoint::MOV, "a")))
        );
        assert_eq!(post.drain(Level::Movement).len(), 2);
    }

    #[test]
    fn test_post_office_deliver_json() {
        let post = PostOffice::default();
        post.deliver_json(Level::Movement, json!([1, 2, 3]));
        assert_eq!(
            post.drain(Level::Movement),
            vec![Mail::Raw(json!([1, 2, 3]))]
        );
    }
}
