//! Duplex messaging from two one-way queues.

use crate::error::Result;
use crate::queue::factory::QueueFactory;
use crate::queue::options::QueueOptions;
use crate::queue::publisher::Publisher;
use crate::queue::subscriber::Subscriber;

/// A bidirectional channel built from a pair of independent queues.
///
/// The server side publishes on the `P`-tagged queue and subscribes on the
/// `S`-tagged one; a client flips the pairing so each side reads what the
/// other writes. No ordering is guaranteed across the two halves.
pub struct Channel {
    publisher: Publisher,
    subscriber: Subscriber,
}

impl Channel {
    pub(crate) fn open(options: &QueueOptions, as_client: bool) -> Result<Self> {
        let (publish_tag, subscribe_tag) = if as_client { ("S", "P") } else { ("P", "S") };
        let publisher = QueueFactory::create_publisher(&options.with_name_tag(publish_tag))?;
        let subscriber = QueueFactory::create_subscriber(&options.with_name_tag(subscribe_tag))?;
        Ok(Self {
            publisher,
            subscriber,
        })
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }
}
