// Fan-out dispatcher: every event from every source goes to every output

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::application::output::{Admission, Output};
use crate::domain::Event;
use crate::port::Dispatcher;

/// Routes source batches to all outputs, deriving rates for aggregated events
pub struct FanOutDispatcher {
    outputs: Vec<Arc<Output>>,
    /// Last (timestamp, metric) seen per event id
    previous: Mutex<HashMap<String, (f64, f64)>>,
}

impl FanOutDispatcher {
    pub fn new(outputs: Vec<Arc<Output>>) -> Self {
        Self {
            outputs,
            previous: Mutex::new(HashMap::new()),
        }
    }

    pub fn outputs(&self) -> &[Arc<Output>] {
        &self.outputs
    }

    fn aggregate(&self, events: Vec<Event>) -> Vec<Event> {
        let mut previous = self.previous.lock();
        events
            .into_iter()
            .filter_map(|event| {
                let Some(aggregation) = event.aggregation() else {
                    return Some(event);
                };

                let reading = (event.timestamp(), event.metric());
                let (last_time, last_metric) = previous.insert(event.id(), reading)?;
                aggregation
                    .apply(last_metric, event.metric(), event.timestamp() - last_time)
                    .map(|rate| event.with_metric(rate))
            })
            .collect()
    }
}

impl Dispatcher for FanOutDispatcher {
    fn forward(&self, source: &str, events: Vec<Event>) {
        let events = self.aggregate(events);
        if events.is_empty() {
            return;
        }

        for output in &self.outputs {
            if let Admission::Dropped(count) = output.events_received(events.clone()) {
                trace!(source = %source, output = %output.name(), dropped = count, "Batch not admitted");
            }
        }
    }
}
