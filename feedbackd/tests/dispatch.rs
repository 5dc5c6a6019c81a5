use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use feedback_core::testing::{self, BackendCall, MockBackend, MockSink, SinkCall};
use feedback_core::{PlayMode, Request, RequestId, SignalRx, StreamState};
use feedback_store::{Proplist, Value};
use feedbackd::config::PrototypeConfig;
use feedbackd::{Daemon, DaemonConfig, Rejection, StatusCode, StatusReport};
use rstest::rstest;

struct Fixture {
    daemon: Daemon,
    signals: SignalRx,
    mock: Arc<MockBackend>,
}

impl Fixture {
    fn new() -> Self {
        let config = DaemonConfig::new()
            .with_definition("ringtone", Some("ringtone_long"), Some("ringtone_short"))
            .with_definition("touch", None, Some("touch_short"))
            .with_definition("orphan", Some("missing_long"), None)
            .with_prototype(
                "ringtone_long",
                PrototypeConfig::new()
                    .with_property("audio", "ring.ogg")
                    .with_property("audio.repeat", true)
                    .with_allowed_keys(["audio.volume"]),
            )
            .with_prototype(
                "ringtone_short",
                PrototypeConfig::new().with_property("audio", "beep.ogg"),
            )
            .with_prototype(
                "touch_short",
                PrototypeConfig::new().with_property("vibra.pattern", "Touch"),
            );

        let mock = MockBackend::new();
        let manager = config.build_manager().unwrap();
        let services = Arc::new(testing::services(&mock, manager, Proplist::new()));
        let (daemon, signals) = Daemon::new(services);

        Self {
            daemon,
            signals,
            mock,
        }
    }

    /// Route every queued signal through the daemon
    fn pump(&mut self) {
        while let Ok((id, signal)) = self.signals.try_recv() {
            self.daemon.handle_signal(id, signal);
        }
    }

    fn complete_last_stream(&mut self) {
        let stream = self.mock.last_stream().unwrap();
        self.mock.notify(stream, StreamState::Completed);
        self.pump();
    }
}

fn request(mode: Option<&str>, policy: Option<u32>, audio: bool) -> Proplist {
    let mut props = Proplist::new();
    if let Some(mode) = mode {
        props.set_string("play.mode", mode);
    }
    if let Some(policy) = policy {
        props.set_uint("policy.id", policy);
    }
    props.set_bool("media.audio", audio);
    props
}

fn report(id: u32, code: StatusCode) -> StatusReport {
    StatusReport {
        id: RequestId::new(id),
        code,
    }
}

#[rstest]
#[case::unknown_event("nope", request(Some("long"), Some(1), true), Rejection::UnknownEvent("nope".to_string()))]
#[case::missing_play_mode("ringtone", request(None, Some(1), true), Rejection::MissingPlayMode)]
#[case::unknown_play_mode("ringtone", request(Some("medium"), Some(1), true), Rejection::UnknownPlayMode("medium".to_string()))]
#[case::missing_policy("ringtone", request(Some("long"), None, true), Rejection::MissingPolicyId)]
#[case::zero_policy("ringtone", request(Some("long"), Some(0), true), Rejection::MissingPolicyId)]
#[case::no_resources("ringtone", request(Some("long"), Some(1), false), Rejection::NoResources)]
#[case::no_prototype_for_mode(
    "touch",
    request(Some("long"), Some(1), true),
    Rejection::UnresolvedPrototype { event: "touch".to_string(), mode: PlayMode::Long }
)]
#[case::prototype_not_registered(
    "orphan",
    request(Some("long"), Some(1), true),
    Rejection::PrototypeNotFound("missing_long".to_string())
)]
fn test_play_rejections(
    #[case] event: &str,
    #[case] properties: Proplist,
    #[case] expected: Rejection,
) {
    let mut fx = Fixture::new();

    assert_eq!(fx.daemon.play(event, properties), Err(expected));
    assert_eq!(fx.daemon.active_count(), 0);
    assert!(fx.mock.calls().is_empty());
    assert!(fx.daemon.take_reports().is_empty());
}

#[test]
fn test_accepted_play_reports_completion_once() {
    let mut fx = Fixture::new();

    let id = fx
        .daemon
        .play("ringtone", request(Some("short"), Some(1), true))
        .unwrap();
    assert_eq!(id, RequestId::new(1));
    assert!(fx.daemon.is_active(id));
    assert_eq!(fx.mock.prepared_sources(), vec!["beep.ogg"]);

    fx.complete_last_stream();
    assert_eq!(fx.daemon.take_reports(), vec![report(1, StatusCode::Completed)]);
    assert_eq!(fx.daemon.active_count(), 0);

    // Late signals for a finished request go nowhere
    fx.complete_last_stream();
    assert!(fx.daemon.take_reports().is_empty());
}

#[test]
fn test_request_ids_increase() {
    let mut fx = Fixture::new();
    let first = fx
        .daemon
        .play("ringtone", request(Some("long"), Some(1), true))
        .unwrap();
    let second = fx
        .daemon
        .play("ringtone", request(Some("long"), Some(2), true))
        .unwrap();

    assert_eq!(first.as_u32(), 1);
    assert_eq!(second.as_u32(), 2);
    assert_eq!(fx.daemon.active_count(), 2);
}

#[test]
fn test_stop_reports_stopped() {
    let mut fx = Fixture::new();
    let id = fx
        .daemon
        .play("ringtone", request(Some("long"), Some(1), true))
        .unwrap();

    fx.daemon.stop(id);
    assert_eq!(fx.daemon.take_reports(), vec![report(1, StatusCode::Stopped)]);
    assert_eq!(fx.mock.count(|c| matches!(c, BackendCall::StopStream(_))), 1);

    // Unknown ids are still answered
    fx.daemon.stop(RequestId::new(42));
    assert_eq!(fx.daemon.take_reports(), vec![report(42, StatusCode::Stopped)]);
}

#[test]
fn test_client_overrides_respect_allowed_keys() {
    let mut fx = Fixture::new();
    let mut props = request(Some("long"), Some(1), true);
    props.set_string("audio", "/tmp/other.ogg");
    props.set_int("audio.volume", 30);

    fx.daemon.play("ringtone", props).unwrap();

    assert_eq!(
        fx.mock.calls()[0],
        BackendCall::Prepare {
            stream: fx.mock.last_stream().unwrap(),
            source: "ring.ogg".to_string(),
            volume: Some(30),
        }
    );
}

#[test]
fn test_new_request_hook_can_rewrite_overrides() {
    let mut fx = Fixture::new();
    fx.daemon
        .services()
        .hooks
        .new_request
        .connect(0, |request: &mut Request| {
            request.properties.set_int("audio.volume", 55);
        });

    fx.daemon
        .play("ringtone", request(Some("long"), Some(1), true))
        .unwrap();

    assert!(matches!(
        &fx.mock.calls()[0],
        BackendCall::Prepare { volume: Some(55), .. }
    ));
}

#[test]
fn test_new_request_hook_runs_before_resolution() {
    let mut fx = Fixture::new();
    fx.daemon
        .services()
        .hooks
        .new_request
        .connect(0, |request: &mut Request| {
            if request.name == "alias" {
                request.name = "ringtone".to_string();
            }
            if !request.properties.contains("play.mode") {
                request.properties.set_string("play.mode", "short");
            }
            request.store_data("origin", "hook");
        });

    let id = fx
        .daemon
        .play("alias", request(None, Some(1), true))
        .unwrap();

    assert!(fx.daemon.is_active(id));
    assert_eq!(fx.mock.prepared_sources(), vec!["beep.ogg"]);
}

#[test]
fn test_rejected_play_does_not_consume_an_id() {
    let mut fx = Fixture::new();

    assert!(fx.daemon.play("nope", request(Some("long"), Some(1), true)).is_err());
    let id = fx
        .daemon
        .play("ringtone", request(Some("long"), Some(1), true))
        .unwrap();

    assert_eq!(id, RequestId::new(1));
}

#[test]
fn test_pause_reaches_the_stream() {
    let mut fx = Fixture::new();
    let id = fx
        .daemon
        .play("ringtone", request(Some("long"), Some(1), true))
        .unwrap();
    let stream = fx.mock.last_stream().unwrap();

    fx.daemon.pause(id, true);
    fx.daemon.pause(RequestId::new(99), true);

    assert_eq!(
        fx.mock.count(|c| matches!(c, BackendCall::Pause(_, true))),
        1
    );
    assert!(fx.mock.calls().contains(&BackendCall::Pause(stream, true)));
}

#[test]
fn test_sinks_are_driven_for_accepted_requests() {
    let mut fx = Fixture::new();
    let sink = MockSink::new("recorder");
    fx.daemon.services().sinks.register(sink.clone());

    let inits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&inits);
    fx.daemon
        .services()
        .hooks
        .init_done
        .connect(0, move |_: &mut ()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    fx.daemon.initialize();
    assert_eq!(inits.load(Ordering::SeqCst), 1);

    let id = fx
        .daemon
        .play("ringtone", request(Some("long"), Some(1), true))
        .unwrap();
    fx.pump();
    assert_eq!(sink.calls(), vec![SinkCall::Prepare(id), SinkCall::Play(id)]);

    fx.daemon.stop(id);
    assert_eq!(sink.calls().last(), Some(&SinkCall::Stop(id)));
}

#[test]
fn test_shutdown_stops_everything() {
    let mut fx = Fixture::new();
    fx.daemon
        .play("ringtone", request(Some("long"), Some(1), true))
        .unwrap();
    let mut props = request(Some("short"), Some(1), false);
    props.set(feedback_core::keys::MEDIA_VIBRA, Value::Bool(true));
    fx.daemon.play("touch", props).unwrap();

    fx.daemon.shutdown();

    assert_eq!(
        fx.daemon.take_reports(),
        vec![
            report(1, StatusCode::Stopped),
            report(2, StatusCode::Stopped)
        ]
    );
    assert_eq!(fx.daemon.active_count(), 0);
    assert!(fx
        .mock
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::VibraStop(_))));
}
