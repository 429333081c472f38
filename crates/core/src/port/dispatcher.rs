// Dispatcher Port
// Routes events emitted by any source to every registered output

use crate::domain::Event;

/// Fan-out contract consumed by sources.
///
/// `forward` runs on the sampling path, so implementations must only
/// enqueue and never wait on delivery.
pub trait Dispatcher: Send + Sync {
    /// Hand over the events produced by one tick of `source`, in production order
    fn forward(&self, source: &str, events: Vec<Event>);
}

pub mod mocks {
    use super::*;
    use parking_lot::Mutex;

    /// Collects forwarded batches with the emitting source name
    #[derive(Default)]
    pub struct CollectingDispatcher {
        batches: Mutex<Vec<(String, Vec<Event>)>>,
    }

    impl CollectingDispatcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn batches(&self) -> Vec<(String, Vec<Event>)> {
            self.batches.lock().clone()
        }

        pub fn events(&self) -> Vec<Event> {
            self.batches
                .lock()
                .iter()
                .flat_map(|(_, events)| events.clone())
                .collect()
        }
    }

    impl Dispatcher for CollectingDispatcher {
        fn forward(&self, source: &str, events: Vec<Event>) {
            self.batches.lock().push((source.to_string(), events));
        }
    }
}
