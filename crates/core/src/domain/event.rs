// Event Domain Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::aggregation::Aggregation;

/// Check state carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventState::Ok => write!(f, "ok"),
            EventState::Warning => write!(f, "warning"),
            EventState::Critical => write!(f, "critical"),
            EventState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Metric,
    Log,
}

/// Immutable measurement or log record produced by a source.
///
/// Fields are private: once built, an event is only ever read. Derived
/// copies (see [`Event::with_metric`]) are new values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    hostname: String,
    state: Option<EventState>,
    service: String,
    metric: f64,
    ttl: f64,
    tags: Vec<String>,
    #[serde(rename = "time")]
    timestamp: f64,
    #[serde(rename = "type")]
    kind: EventKind,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    aggregation: Option<Aggregation>,
}

impl Event {
    /// Start building a metric event for `service` on `hostname`
    pub fn builder(service: impl Into<String>, hostname: impl Into<String>) -> EventBuilder {
        EventBuilder {
            event: Event {
                hostname: hostname.into(),
                state: None,
                service: service.into(),
                metric: 0.0,
                ttl: 0.0,
                tags: Vec::new(),
                timestamp: 0.0,
                kind: EventKind::Metric,
                description: String::new(),
                attributes: None,
                aggregation: None,
            },
        }
    }

    /// Identity used for de-duplication and rate tracking
    pub fn id(&self) -> String {
        format!("{}.{}", self.hostname, self.service)
    }

    /// Copy of this event carrying a different metric value
    pub fn with_metric(&self, metric: f64) -> Event {
        Event {
            metric,
            ..self.clone()
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn state(&self) -> Option<EventState> {
        self.state
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn metric(&self) -> f64 {
        self.metric
    }

    pub fn ttl(&self) -> f64 {
        self.ttl
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn attributes(&self) -> Option<&BTreeMap<String, String>> {
        self.attributes.as_ref()
    }

    pub fn aggregation(&self) -> Option<Aggregation> {
        self.aggregation
    }
}

/// Builder for [`Event`]; the only way to set fields
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    pub fn state(mut self, state: EventState) -> Self {
        self.event.state = Some(state);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.event.description = description.into();
        self
    }

    pub fn metric(mut self, metric: f64) -> Self {
        self.event.metric = metric;
        self
    }

    pub fn ttl(mut self, ttl: f64) -> Self {
        self.event.ttl = ttl;
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.event.tags = tags;
        self
    }

    pub fn timestamp(mut self, timestamp: f64) -> Self {
        self.event.timestamp = timestamp;
        self
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.event.kind = kind;
        self
    }

    pub fn attributes(mut self, attributes: Option<BTreeMap<String, String>>) -> Self {
        self.event.attributes = attributes.filter(|a| !a.is_empty());
        self
    }

    pub fn aggregation(mut self, aggregation: Option<Aggregation>) -> Self {
        self.event.aggregation = aggregation;
        self
    }

    pub fn build(self) -> Event {
        self.event
    }
}

/// Per-source defaults stamped onto every event the source creates
#[derive(Debug, Clone)]
pub struct EventTemplate {
    pub service: String,
    pub hostname: String,
    pub ttl: f64,
    pub tags: Vec<String>,
    pub attributes: Option<BTreeMap<String, String>>,
}

impl EventTemplate {
    /// Create a metric event. `prefix` is appended to the service name as `service.prefix`.
    pub fn metric_event(
        &self,
        state: Option<EventState>,
        description: impl Into<String>,
        metric: f64,
        prefix: Option<&str>,
        timestamp: f64,
    ) -> EventBuilder {
        let service = match prefix {
            Some(p) => format!("{}.{}", self.service, p),
            None => self.service.clone(),
        };

        let mut builder = Event::builder(service, self.hostname.clone())
            .description(description)
            .metric(metric)
            .ttl(self.ttl)
            .tags(self.tags.clone())
            .timestamp(timestamp)
            .attributes(self.attributes.clone());
        if let Some(state) = state {
            builder = builder.state(state);
        }
        builder
    }

    /// Create a log event: no state, metric 0, `log_type` as the service name
    pub fn log_event(&self, log_type: impl Into<String>, data: impl Into<String>, timestamp: f64) -> Event {
        Event::builder(log_type, self.hostname.clone())
            .description(data)
            .ttl(self.ttl)
            .tags(self.tags.clone())
            .timestamp(timestamp)
            .kind(EventKind::Log)
            .build()
    }
}
