//! End-to-end pipeline tests: local command source -> fan-out -> output backlog
//!
//! Uses the real process runner and plugin catalogue; only the final output
//! plugin is a recording double.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use duct_core::application::{Agent, Admission, ExecutionChannel, FlushOutcome, Output, Source, TickOutcome};
use duct_core::domain::{ComponentConfig, Event, EventState, OutputSettings, SourceSettings};
use duct_core::port::output_plugin::mocks::RecordingOutput;
use duct_core::port::time_provider::FixedTimeProvider;
use duct_core::port::Dispatcher;
use duct_infra_system::ProcessRunner;
use duct_plugins::build_source;

fn unlimited() -> OutputSettings {
    OutputSettings {
        interval: Duration::from_millis(50),
        maxsize: 0,
        maxrate: 0.0,
    }
}

fn command_source(agent: &Agent, config: serde_json::Value) -> Arc<Source> {
    let config = ComponentConfig::from_value(config).unwrap();
    let settings = SourceSettings::from_config(&config, "web01").unwrap();
    let plugin = build_source(&config).unwrap();

    Arc::new(
        Source::new(
            settings,
            plugin,
            ExecutionChannel::Local(Arc::new(ProcessRunner::default())),
            agent.dispatcher(),
            Arc::new(FixedTimeProvider(2_000)),
        )
        .unwrap(),
    )
}

fn events(service: &str, count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| Event::builder(service, "web01").metric(i as f64).build())
        .collect()
}

fn metrics(events: &[Event]) -> Vec<f64> {
    events.iter().map(|e| e.metric()).collect()
}

#[tokio::test]
async fn test_command_check_reaches_output() {
    let recorder = Arc::new(RecordingOutput::new());
    let output = Arc::new(Output::new("recording", unlimited(), recorder.clone()));
    let agent = Agent::new(vec![output.clone()]);
    let source = command_source(
        &agent,
        json!({
            "source": "command",
            "service": "queue",
            "command": "sh",
            "args": ["-c", "echo 7 jobs waiting; exit 1"],
            "tags": "mail,queue",
        }),
    );

    assert_eq!(source.tick().await, TickOutcome::Emitted(1));
    assert_eq!(output.flush().await, FlushOutcome::Delivered(1));

    let delivered = recorder.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].service(), "queue");
    assert_eq!(delivered[0].hostname(), "web01");
    assert_eq!(delivered[0].state(), Some(EventState::Warning));
    assert_eq!(delivered[0].metric(), 7.0);
    assert_eq!(delivered[0].description(), "7 jobs waiting");
    assert_eq!(delivered[0].tags(), &["mail".to_string(), "queue".to_string()]);
    assert_eq!(delivered[0].timestamp(), 2.0);
}

#[tokio::test]
async fn test_sync_source_skips_while_command_runs() {
    let recorder = Arc::new(RecordingOutput::new());
    let output = Arc::new(Output::new("recording", unlimited(), recorder));
    let agent = Agent::new(vec![output.clone()]);
    let source = command_source(
        &agent,
        json!({
            "source": "command",
            "service": "slow",
            "command": "sleep",
            "args": "0.3",
            "sync": true,
        }),
    );

    let (first, second) = tokio::join!(source.tick(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.tick().await
    });

    assert_eq!(first, TickOutcome::Emitted(1));
    assert_eq!(second, TickOutcome::Skipped);
    assert!(!source.is_running());
    assert_eq!(output.backlog_len(), 1);
}

#[tokio::test]
async fn test_command_timeout_is_contained() {
    let recorder = Arc::new(RecordingOutput::new());
    let output = Arc::new(Output::new("recording", unlimited(), recorder));
    let agent = Agent::new(vec![output.clone()]);
    let source = command_source(
        &agent,
        json!({
            "source": "command",
            "service": "hang",
            "command": "sleep",
            "args": "5",
            "timeout": 0.2,
            "sync": true,
        }),
    );

    assert_eq!(source.tick().await, TickOutcome::Failed);
    assert!(!source.is_running());
    assert_eq!(output.backlog_len(), 0);

    // The guard was released, so the next tick runs again
    assert_eq!(source.tick().await, TickOutcome::Failed);
}

#[tokio::test]
async fn test_agent_runs_until_stopped() {
    let recorder = Arc::new(RecordingOutput::new());
    let output = Arc::new(Output::new("recording", unlimited(), recorder.clone()));
    let mut agent = Agent::new(vec![output]);

    let config = ComponentConfig::from_value(json!({
        "source": "command",
        "service": "heartbeat",
        "interval": 0.05,
        "command": "echo",
        "args": "1",
    }))
    .unwrap();
    let source = Source::new(
        SourceSettings::from_config(&config, "web01").unwrap(),
        build_source(&config).unwrap(),
        ExecutionChannel::Local(Arc::new(ProcessRunner::default())),
        agent.dispatcher(),
        Arc::new(FixedTimeProvider(0)),
    )
    .unwrap();
    agent.add_source(source);

    agent.start().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    agent.stop().await;

    let delivered = recorder.delivered();
    assert!(delivered.len() >= 2, "only {} events delivered", delivered.len());
    assert!(delivered.iter().all(|e| e.service() == "heartbeat" && e.metric() == 1.0));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.delivered().len(), delivered.len());
}

#[tokio::test]
async fn test_rate_shaping_and_requeue_preserve_order() {
    let recorder = Arc::new(RecordingOutput::new());
    let settings = OutputSettings {
        interval: Duration::from_secs(1),
        maxsize: 0,
        maxrate: 2.0,
    };
    let output = Arc::new(Output::new("shaped", settings, recorder.clone()));
    let agent = Agent::new(vec![output.clone()]);

    agent.dispatcher().forward("burst", events("burst", 5));

    recorder.fail_with("endpoint down");
    assert_eq!(output.flush().await, FlushOutcome::Requeued(2));
    assert_eq!(output.backlog_len(), 5);

    recorder.recover();
    assert_eq!(output.flush().await, FlushOutcome::Delivered(2));
    assert_eq!(output.flush().await, FlushOutcome::Delivered(2));
    assert_eq!(output.flush().await, FlushOutcome::Delivered(1));
    assert_eq!(output.flush().await, FlushOutcome::Idle);

    let batches: Vec<Vec<f64>> = recorder.batches().iter().map(|b| metrics(b)).collect();
    assert_eq!(batches, vec![vec![0.0, 1.0], vec![2.0, 3.0], vec![4.0]]);
}

#[tokio::test]
async fn test_full_backlog_drops_only_for_that_output() {
    let small = Arc::new(Output::new(
        "small",
        OutputSettings {
            maxsize: 3,
            ..unlimited()
        },
        Arc::new(RecordingOutput::new()),
    ));
    let large = Arc::new(Output::new("large", unlimited(), Arc::new(RecordingOutput::new())));
    let agent = Agent::new(vec![small.clone(), large.clone()]);

    agent.dispatcher().forward("disk", events("disk", 2));
    agent.dispatcher().forward("disk", events("disk", 2));

    assert_eq!(metrics(&small.snapshot()), vec![0.0, 1.0]);
    assert_eq!(metrics(&large.snapshot()), vec![0.0, 1.0, 0.0, 1.0]);

    assert_eq!(small.events_received(events("disk", 1)), Admission::Admitted(1));
    assert_eq!(small.backlog_len(), 3);
}
