use std::sync::Arc;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use codescan_core::{
    map_to_normalized, NormalizedRect, PreviewGeometry, Rect, RegionMask, ScanRegion, Size,
    Symbology, SymbologySet,
};
use codescan_session::sim::{SimFrame, SimScenario, SimulatedCamera};
use codescan_session::{
    Authorization, CaptureSession, ConfigureError, DecodeResult, Detection, DeviceId,
    DeviceRegistry, FaultKind, InputSelector, RuntimeFault, SessionConfig, SessionEvent,
    SessionState, StartError, TorchError,
};
use crossbeam_channel::Receiver;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(150);

fn qr_config() -> SessionConfig {
    SessionConfig::new(SymbologySet::single(Symbology::Qr))
}

fn session_on(camera: &SimulatedCamera, registry: &DeviceRegistry) -> CaptureSession {
    let _ = env_logger::builder().is_test(true).try_init();
    CaptureSession::with_registry(Arc::new(camera.clone()), registry.clone())
}

fn next_decoded(events: &Receiver<SessionEvent>) -> Option<DecodeResult> {
    let deadline = std::time::Instant::now() + WAIT;
    while let Some(left) = deadline.checked_duration_since(std::time::Instant::now()) {
        match events.recv_timeout(left) {
            Ok(SessionEvent::Decoded(result)) => return Some(result),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
    None
}

fn no_decode_within(events: &Receiver<SessionEvent>, window: Duration) -> bool {
    let deadline = std::time::Instant::now() + window;
    while let Some(left) = deadline.checked_duration_since(std::time::Instant::now()) {
        match events.recv_timeout(left) {
            Ok(SessionEvent::Decoded(_)) => return false,
            Ok(_) => continue,
            Err(_) => return true,
        }
    }
    true
}

fn wait_for_state(session: &CaptureSession, state: SessionState) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if session.state() == state {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn lifecycle_publishes_state_changes_with_epochs() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let session = session_on(&camera, &DeviceRegistry::new());
    let events = session.events();
    assert_eq!(session.state(), SessionState::Idle);

    let epoch = session.configure(qr_config()).expect("configure");
    assert_eq!(epoch, 1);
    session.start().expect("start");
    session.stop();
    session.start().expect("restart");
    assert_eq!(session.epoch(), 2);
    session.stop();

    let states: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            SessionEvent::StateChanged { state, epoch } => Some((state, epoch)),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            (SessionState::Configuring, 1),
            (SessionState::Running, 1),
            (SessionState::Stopped, 1),
            (SessionState::Running, 2),
            (SessionState::Stopped, 2),
        ]
    );
    assert_eq!(camera.open_count(), 2);
}

#[test]
fn configure_rejects_bad_requests() {
    let camera = SimulatedCamera::new(SimScenario {
        supported: SymbologySet::from([Symbology::Qr, Symbology::Ean13]),
        ..SimScenario::default()
    });
    let session = session_on(&camera, &DeviceRegistry::new());

    assert!(matches!(
        session.configure(SessionConfig::new(SymbologySet::new())),
        Err(ConfigureError::EmptySymbologySet)
    ));
    match session.configure(SessionConfig::new(SymbologySet::from([
        Symbology::Qr,
        Symbology::Aztec,
    ]))) {
        Err(ConfigureError::UnsupportedSymbologies { unsupported }) => {
            assert_eq!(unsupported, vec![Symbology::Aztec])
        }
        other => panic!("expected unsupported symbologies, got {other:?}"),
    }
    assert!(matches!(
        session.configure(qr_config().with_input(InputSelector::Id(DeviceId::new("usb")))),
        Err(ConfigureError::NoInputDevice)
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.epoch(), 0);

    session.configure(qr_config()).expect("configure");
    session.start().expect("start");
    assert!(matches!(
        session.configure(qr_config()),
        Err(ConfigureError::SessionRunning)
    ));
    assert_eq!(session.state(), SessionState::Running);
    session.stop();
}

#[test]
fn no_inputs_is_a_configuration_error() {
    let camera = SimulatedCamera::new(SimScenario {
        inputs: Vec::new(),
        ..SimScenario::default()
    });
    let session = session_on(&camera, &DeviceRegistry::new());
    assert!(matches!(
        session.configure(qr_config()),
        Err(ConfigureError::NoInputDevice)
    ));
}

#[test]
fn start_requires_configuration() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let session = session_on(&camera, &DeviceRegistry::new());
    assert!(matches!(
        session.start(),
        Err(StartError::NotConfigured {
            state: SessionState::Idle
        })
    ));
}

#[test]
fn second_session_cannot_start_on_a_held_device() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let registry = DeviceRegistry::new();
    let first = session_on(&camera, &registry);
    let second = session_on(&camera, &registry);

    first.configure(qr_config()).expect("configure first");
    first.start().expect("start first");
    second.configure(qr_config()).expect("configure second");

    match second.start() {
        Err(StartError::DeviceBusy { device, holder }) => {
            assert_eq!(device, DeviceId::new("back"));
            assert_eq!(holder, first.id());
        }
        other => panic!("expected DeviceBusy, got {other:?}"),
    }
    assert_eq!(second.state(), SessionState::Configuring);
    assert_eq!(registry.holder(&DeviceId::new("back")), Some(first.id()));

    first.stop();
    assert_eq!(registry.holder(&DeviceId::new("back")), None);
    second.start().expect("device released");
    assert_eq!(registry.holder(&DeviceId::new("back")), Some(second.id()));
    second.stop();
}

#[test]
fn sessions_on_different_devices_run_together() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let registry = DeviceRegistry::new();
    let back = session_on(&camera, &registry);
    let front = session_on(&camera, &registry);
    back.configure(qr_config()).expect("back");
    front
        .configure(qr_config().with_input(InputSelector::Id(DeviceId::new("front"))))
        .expect("front");
    back.start().expect("start back");
    front.start().expect("start front");
    back.stop();
    front.stop();
}

#[test]
fn permission_revoked_before_start() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let session = session_on(&camera, &DeviceRegistry::new());
    session.configure(qr_config()).expect("configure");

    camera.set_authorization(Authorization::Denied);
    assert!(matches!(session.start(), Err(StartError::PermissionDenied)));
    assert_eq!(session.state(), SessionState::Configuring);

    camera.set_authorization(Authorization::Authorized);
    camera.remove_input(&DeviceId::new("back"));
    assert!(matches!(
        session.start(),
        Err(StartError::DeviceUnavailable(_))
    ));
    assert_eq!(session.state(), SessionState::Configuring);
}

#[test]
fn decodes_are_filtered_and_deduplicated_per_frame() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let session = session_on(&camera, &DeviceRegistry::new());
    let events = session.events();
    session.configure(qr_config()).expect("configure");
    session.start().expect("start");

    let bounds = NormalizedRect::new(0.4, 0.4, 0.2, 0.2);
    camera.push_detections(vec![
        Detection::new("A", Symbology::Qr, bounds),
        Detection::new("4006381333931", Symbology::Ean13, bounds),
        Detection::new("A", Symbology::Qr, bounds),
        Detection::new("B", Symbology::Qr, bounds),
    ]);
    camera.push_frame(SimFrame::qr("A"));

    let first = next_decoded(&events).expect("A");
    let second = next_decoded(&events).expect("B");
    let third = next_decoded(&events).expect("A again, next frame");
    assert_eq!(
        (first.payload.as_str(), second.payload.as_str(), third.payload.as_str()),
        ("A", "B", "A")
    );
    assert_eq!(first.frame, second.frame);
    assert_eq!(third.frame, first.frame + 1);
    assert_eq!(first.epoch, 1);
    assert_abs_diff_eq!(first.bounds.x(), 0.4, epsilon = 1e-12);
    assert_abs_diff_eq!(first.bounds.width(), 0.2, epsilon = 1e-12);
    assert!(no_decode_within(&events, QUIET));
    session.stop();
}

#[test]
fn region_outside_the_preview_disables_scanning_until_updated() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let session = session_on(&camera, &DeviceRegistry::new());
    let events = session.events();

    let geometry = PreviewGeometry::new(Size::new(375.0, 667.0), Size::new(1920.0, 1080.0));
    let outside = ScanRegion::from_rect(Rect::new(500.0, 900.0, 100.0, 100.0), geometry.display_size);
    let mapped = map_to_normalized(&outside, &geometry).expect("not the sentinel");
    assert!(mapped.is_empty());

    session
        .configure(qr_config().with_mask(RegionMask::from_mapping(Some(mapped))))
        .expect("configure");
    session.start().expect("start");
    camera.push_frame(SimFrame::qr("hidden"));
    assert!(no_decode_within(&events, QUIET));
    assert_eq!(session.state(), SessionState::Running);

    session.update_region(RegionMask::Unrestricted);
    camera.push_frame(SimFrame::qr("visible"));
    assert_eq!(next_decoded(&events).map(|r| r.payload), Some("visible".into()));
    session.stop();
}

#[test]
fn live_region_update_applies_to_later_frames() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let session = session_on(&camera, &DeviceRegistry::new());
    let events = session.events();
    session.configure(qr_config()).expect("configure");
    session.start().expect("start");

    let left = NormalizedRect::new(0.0, 0.0, 0.3, 1.0);
    let right_code = Detection::new("right", Symbology::Qr, NormalizedRect::new(0.7, 0.4, 0.2, 0.2));
    camera.push_detections(vec![right_code.clone()]);
    assert_eq!(next_decoded(&events).map(|r| r.payload), Some("right".into()));

    session.update_region(RegionMask::Restricted(left));
    assert_eq!(session.current_mask(), RegionMask::Restricted(left));
    camera.push_detections(vec![right_code]);
    assert!(no_decode_within(&events, QUIET));
    session.stop();
}

#[test]
fn region_update_while_configuring_applies_at_start() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let session = session_on(&camera, &DeviceRegistry::new());
    let events = session.events();
    session.configure(qr_config()).expect("configure");

    let mask = RegionMask::Restricted(NormalizedRect::EMPTY);
    session.update_region(mask);
    assert_eq!(session.config().map(|c| c.mask), Some(mask));

    session.start().expect("start");
    camera.push_frame(SimFrame::qr("masked"));
    assert!(no_decode_within(&events, QUIET));
    session.stop();
}

#[test]
fn torch_rules() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let session = session_on(&camera, &DeviceRegistry::new());
    let back = DeviceId::new("back");

    assert!(matches!(
        session.toggle_torch(),
        Err(TorchError::NotRunning {
            state: SessionState::Idle
        })
    ));
    session.configure(qr_config()).expect("configure");
    assert!(session.torch_state().available);
    assert!(matches!(
        session.toggle_torch(),
        Err(TorchError::NotRunning {
            state: SessionState::Configuring
        })
    ));

    session.start().expect("start");
    assert!(session.toggle_torch().expect("on"));
    assert!(camera.torch_engaged(&back));
    assert!(session.torch_state().engaged);

    session.stop();
    assert!(!session.torch_state().engaged);
    assert!(!camera.torch_engaged(&back));
    let before = session.torch_state();
    assert!(matches!(
        session.toggle_torch(),
        Err(TorchError::NotRunning {
            state: SessionState::Stopped
        })
    ));
    assert_eq!(session.torch_state(), before);
}

#[test]
fn torch_unsupported_on_front_camera() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let session = session_on(&camera, &DeviceRegistry::new());
    session
        .configure(qr_config().with_input(InputSelector::Id(DeviceId::new("front"))))
        .expect("configure");
    assert!(!session.torch_state().available);
    session.start().expect("start");
    assert!(matches!(session.toggle_torch(), Err(TorchError::Unsupported)));
    session.stop();
}

#[test]
fn stop_is_idempotent() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let session = session_on(&camera, &DeviceRegistry::new());
    let events = session.events();
    session.stop();
    session.configure(qr_config()).expect("configure");
    session.stop();
    assert_eq!(session.state(), SessionState::Configuring);
    session.start().expect("start");
    session.stop();
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);

    let stops = events
        .try_iter()
        .filter(|e| {
            matches!(
                e,
                SessionEvent::StateChanged {
                    state: SessionState::Stopped,
                    ..
                }
            )
        })
        .count();
    assert_eq!(stops, 1);
}

#[test]
fn device_removal_faults_the_session() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let registry = DeviceRegistry::new();
    let session = session_on(&camera, &registry);
    let events = session.events();
    session.configure(qr_config()).expect("configure");
    session.start().expect("start");

    camera.remove_input(&DeviceId::new("back"));
    assert!(wait_for_state(&session, SessionState::Faulted));
    assert_eq!(registry.holder(&DeviceId::new("back")), None);

    let fault = events.try_iter().find_map(|event| match event {
        SessionEvent::Fault { fault, epoch } => Some((fault, epoch)),
        _ => None,
    });
    let (fault, epoch) = fault.expect("fault event");
    assert_eq!(fault.kind, FaultKind::DeviceRemoved);
    assert_eq!(epoch, 1);

    assert!(matches!(
        session.start(),
        Err(StartError::NotConfigured {
            state: SessionState::Faulted
        })
    ));
    session.stop();
    assert_eq!(session.state(), SessionState::Faulted);

    // only the front camera is left
    let epoch = session.configure(qr_config()).expect("reconfigure");
    assert_eq!(epoch, 2);
    assert_eq!(session.device().map(|d| d.id), Some(DeviceId::new("front")));
    assert_eq!(session.state(), SessionState::Configuring);
}

#[test]
fn interruption_and_host_fault() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let session = session_on(&camera, &DeviceRegistry::new());
    session.configure(qr_config()).expect("configure");
    session.start().expect("start");
    camera.interrupt("incoming call");
    assert!(wait_for_state(&session, SessionState::Faulted));

    session.configure(qr_config()).expect("reconfigure");
    session.fault(RuntimeFault::new(FaultKind::Other, "host gave up"));
    assert_eq!(session.state(), SessionState::Faulted);
}

#[test]
fn dropping_a_running_session_releases_the_device() {
    let camera = SimulatedCamera::new(SimScenario::default());
    let registry = DeviceRegistry::new();
    {
        let session = session_on(&camera, &registry);
        session.configure(qr_config()).expect("configure");
        session.start().expect("start");
        assert!(registry.holder(&DeviceId::new("back")).is_some());
    }
    assert_eq!(registry.holder(&DeviceId::new("back")), None);
}
