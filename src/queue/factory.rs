//! Construction of queue participants.

use crate::error::Result;
use crate::queue::channel::Channel;
use crate::queue::options::QueueOptions;
use crate::queue::publisher::Publisher;
use crate::queue::subscriber::Subscriber;
use crate::queue::QueueCore;

/// Creates publishers, subscribers, and channels over named shared queues.
///
/// Whoever attaches first creates the region and the coupling semaphore;
/// later participants open the existing objects. All participants must pass
/// identical options.
pub struct QueueFactory;

impl QueueFactory {
    pub fn create_publisher(options: &QueueOptions) -> Result<Publisher> {
        Ok(Publisher::new(QueueCore::open(options)?))
    }

    pub fn create_subscriber(options: &QueueOptions) -> Result<Subscriber> {
        Ok(Subscriber::new(QueueCore::open(options)?))
    }

    /// Opens the two tagged queues forming a duplex. The server passes
    /// `as_client = false`, its peer `true`.
    pub fn create_channel(options: &QueueOptions, as_client: bool) -> Result<Channel> {
        Channel::open(options, as_client)
    }
}
