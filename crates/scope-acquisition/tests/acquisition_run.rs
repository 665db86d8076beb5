//! End-to-end runs against the mock microscope.

use parking_lot::Mutex;
use scope_acquisition::{
    AcquisitionCallbacks, AcquisitionError, AcquisitionParameters, AcquisitionParametersBuilder,
    AcquisitionState, AutofocusPolicy, Microscope, MultiPointController, RunOutcome, RunSummary,
    ScopeConfig, ZStacking,
};
use scope_core::channel::ChannelMode;
use scope_core::mode_gate::{AtomicModeGate, ModeGate};
use scope_core::planner::{FixedPlanner, FovCoordinate, RegionPlan};
use scope_driver_mock::{
    ErrorConfig, ErrorScenario, EventLog, HardwareEvent, MockAutofocus, MockCamera, MockFluidics,
    MockIlluminator, MockPiezo, MockStage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Rig {
    stage: MockStage,
    camera: MockCamera,
    lights: MockIlluminator,
    events: EventLog,
    gate: Arc<AtomicModeGate>,
}

impl Rig {
    fn new() -> Self {
        Self::with_faults(ErrorConfig::none(), ErrorConfig::none())
    }

    fn with_faults(stage_errors: ErrorConfig, camera_errors: ErrorConfig) -> Self {
        let events = EventLog::new();
        let stage = MockStage::builder()
            .error_config(stage_errors)
            .event_log(events.clone())
            .build();
        let camera = MockCamera::builder(16, 16)
            .error_config(camera_errors)
            .event_log(events.clone())
            .build();
        let lights = MockIlluminator::new().with_event_log(events.clone());
        Self {
            stage,
            camera,
            lights,
            events,
            gate: Arc::new(AtomicModeGate::new()),
        }
    }

    fn microscope(&self) -> Microscope {
        Microscope::new(
            Arc::new(self.stage.clone()),
            Arc::new(self.camera.clone()),
            Arc::new(self.lights.clone()),
        )
    }

    fn controller(&self, microscope: Microscope, regions: Vec<RegionPlan>) -> MultiPointController {
        self.controller_with(microscope, regions, fast_config())
    }

    fn controller_with(
        &self,
        microscope: Microscope,
        regions: Vec<RegionPlan>,
        config: ScopeConfig,
    ) -> MultiPointController {
        MultiPointController::new(
            microscope,
            Arc::new(FixedPlanner::new(regions)),
            self.gate.clone(),
            config,
        )
    }
}

fn fast_config() -> ScopeConfig {
    let mut config = ScopeConfig::default();
    config.acquisition.stabilization_x_ms = 0;
    config.acquisition.stabilization_y_ms = 0;
    config.acquisition.stabilization_z_ms = 0;
    config.acquisition.piezo_delay_ms = 0;
    config.acquisition.frame_timeout_ms = 100;
    config.pipeline.drain_timeout_ms = 10_000;
    config
}

fn row(name: &str, fovs: usize, z_mm: f64) -> RegionPlan {
    let coords = (0..fovs)
        .map(|i| FovCoordinate::new(i as f64, 0.0, z_mm))
        .collect();
    RegionPlan::new(name, (0.0, 0.0, z_mm), coords)
}

fn bf() -> ChannelMode {
    ChannelMode::brightfield(1, "BF LED matrix full", 5.0)
}

fn gfp() -> ChannelMode {
    ChannelMode::fluorescence(2, "Fluorescence 488 nm Ex", 488, 20.0)
}

fn unsaved(id: &str) -> AcquisitionParametersBuilder {
    AcquisitionParameters::builder(id, "").skip_saving(true).channel(bf())
}

/// Counts `on_finished` calls and keeps the last summary.
#[derive(Clone, Default)]
struct FinishCounter {
    calls: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<RunSummary>>>,
}

impl FinishCounter {
    fn callbacks(&self) -> AcquisitionCallbacks {
        let counter = self.clone();
        AcquisitionCallbacks::new().on_finished(move |summary| {
            counter.calls.fetch_add(1, Ordering::SeqCst);
            *counter.last.lock() = Some(summary.clone());
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn finish(controller: &MultiPointController) -> RunSummary {
    tokio::time::timeout(Duration::from_secs(600), controller.wait_for_completion())
        .await
        .expect("run should finish")
        .expect("run should produce a summary")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_captures_follow_timepoint_region_fov_z_channel_order() {
    let rig = Rig::new();
    let controller = rig.controller(rig.microscope(), vec![row("A1", 2, 1.0), row("B2", 1, 1.0)]);

    type Key = (usize, usize, usize, usize, usize, u64);
    let seen: Arc<Mutex<Vec<Key>>> = Arc::default();
    let overall: Arc<Mutex<Vec<(usize, usize)>>> = Arc::default();
    let counter = FinishCounter::default();
    let callbacks = {
        let seen = seen.clone();
        let overall = overall.clone();
        let counter = counter.clone();
        counter
            .callbacks()
            .on_capture(move |info| {
                seen.lock().push((
                    info.timepoint,
                    info.region_index,
                    info.fov,
                    info.z_level,
                    info.channel_index,
                    info.capture_index,
                ));
            })
            .on_overall_progress(move |p| overall.lock().push(p.key()))
    };
    controller.register_callbacks(callbacks);

    let params = unsaved("order")
        .channel(gfp())
        .z_stack(2, 0.001, ZStacking::FromBottom)
        .timepoints(2, 0.0)
        .build();
    assert_eq!(controller.expected_image_count(&params).unwrap(), 24);

    controller.run_acquisition(params).await.unwrap();
    let summary = finish(&controller).await;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.captures, 24);
    assert_eq!(summary.expected_captures, 24);
    assert_eq!(counter.calls(), 1);
    assert_eq!(controller.state(), AcquisitionState::Idle);
    assert!(!controller.acquisition_in_progress());
    assert!(!rig.gate.is_engaged());

    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 24);
    let mut sorted = seen.clone();
    sorted.sort();
    assert_eq!(seen, sorted, "captures must be in nesting order");
    for (i, key) in seen.iter().enumerate() {
        assert_eq!(key.5, i as u64, "capture_index is sequential");
    }

    let overall = overall.lock().clone();
    assert_eq!(overall, vec![(0, 1), (0, 2), (1, 1), (1, 2)]);

    // Channels alternate within every z-level.
    let applied = rig.lights.applied_names();
    assert_eq!(applied.len(), 24);
    assert_eq!(applied[0], "BF LED matrix full");
    assert_eq!(applied[1], "Fluorescence 488 nm Ex");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_z_stack_of_three_writes_three_images() {
    let dir = TempDir::new().unwrap();
    let rig = Rig::new();
    let controller = rig.controller(rig.microscope(), vec![row("A1", 1, 1.0)]);

    let results = Arc::new(AtomicUsize::new(0));
    let counter = FinishCounter::default();
    controller.register_callbacks({
        let results = results.clone();
        counter.callbacks().on_job_result(move |r| {
            assert!(r.is_ok(), "{:?}", r);
            results.fetch_add(1, Ordering::SeqCst);
        })
    });

    let params = AcquisitionParameters::builder("stack", dir.path())
        .channel(bf())
        .z_stack(3, 0.002, ZStacking::FromBottom)
        .build();
    controller.run_acquisition(params).await.unwrap();
    let summary = finish(&controller).await;

    assert!(summary.is_clean(), "{:?}", summary);
    assert_eq!(summary.captures, 3);
    assert_eq!(summary.jobs_submitted, 3);
    assert_eq!(summary.jobs_succeeded, 3);
    assert_eq!(results.load(Ordering::SeqCst), 3);
    assert_eq!(counter.calls(), 1);

    let exp = dir.path().join("stack");
    for z in 0..3 {
        let image = exp.join(format!("000/A1_000_{:03}_BF_LED_matrix_full.tiff", z));
        assert!(image.exists(), "missing {:?}", image);
    }
    assert!(exp.join("acquisition_parameters.json").exists());
    assert!(exp.join("coordinates.csv").exists());

    let visited = std::fs::read_to_string(exp.join("000/coordinates.csv")).unwrap();
    assert_eq!(visited.lines().count(), 4, "header plus one row per z-level");

    assert!(exp.join("000/.done").exists());

    // The stack returns to where it started.
    assert!((rig.stage.current_position().z_mm - 1.0).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_led_matrix_rgb_channels_add_a_composite() {
    let dir = TempDir::new().unwrap();
    let rig = Rig::new();
    let controller = rig.controller(rig.microscope(), vec![row("A1", 2, 1.0)]);

    let params = AcquisitionParameters::builder("rgb", dir.path())
        .channels([
            ChannelMode::brightfield(11, "BF LED matrix full_R", 5.0),
            ChannelMode::brightfield(12, "BF LED matrix full_G", 5.0),
            ChannelMode::brightfield(13, "BF LED matrix full_B", 5.0),
        ])
        .timepoints(2, 0.0)
        .build();
    controller.run_acquisition(params).await.unwrap();
    let summary = finish(&controller).await;

    assert!(summary.is_clean(), "{:?}", summary);
    assert_eq!(summary.captures, 12);
    assert_eq!(summary.expected_captures, 12);
    assert_eq!(summary.jobs_submitted, 16, "one composite per FOV per timepoint");
    assert_eq!(summary.jobs_succeeded, 16);

    let exp = dir.path().join("rgb");
    for t in 0..2 {
        let timepoint = exp.join(format!("{:03}", t));
        for fov in 0..2 {
            for label in ["R", "G", "B", "RGB"] {
                let image =
                    timepoint.join(format!("A1_{:03}_000_BF_LED_matrix_full_{}.tiff", fov, label));
                assert!(image.exists(), "missing {:?}", image);
            }
        }
        assert!(timepoint.join(".done").exists());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aborted_timepoint_is_not_marked_done() {
    let dir = TempDir::new().unwrap();
    let rig = Rig::new();
    let controller = rig.controller(rig.microscope(), vec![row("A1", 10, 1.0)]);
    let handle = controller.abort_handle();
    controller.register_callbacks(AcquisitionCallbacks::new().on_region_progress(move |p| {
        if p.current_fov == 2 {
            handle.abort();
        }
    }));

    let params = AcquisitionParameters::builder("cut_short", dir.path())
        .channel(bf())
        .build();
    controller.run_acquisition(params).await.unwrap();
    let summary = finish(&controller).await;

    assert_eq!(summary.outcome, RunOutcome::Aborted);
    let timepoint = dir.path().join("cut_short/000");
    assert!(timepoint.join("coordinates.csv").exists());
    assert!(!timepoint.join(".done").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_autofocus_runs_once_before_first_z_level() {
    let rig = Rig::new();
    let af = MockAutofocus::new().with_event_log(rig.events.clone());
    let microscope = rig.microscope().with_contrast_autofocus(Arc::new(af.clone()));
    let controller = rig.controller(microscope, vec![row("A1", 1, 1.0)]);

    let params = unsaved("af")
        .z_stack(5, 0.001, ZStacking::FromCenter)
        .autofocus(true)
        .build();
    controller.run_acquisition(params).await.unwrap();
    let summary = finish(&controller).await;

    assert_eq!(summary.captures, 5);
    assert_eq!(af.run_count(), 1);
    let events = &rig.events;
    assert_eq!(
        events.count(|e| matches!(e, HardwareEvent::Autofocus { .. })),
        1
    );
    let af_at = events
        .position(|e| matches!(e, HardwareEvent::Autofocus { .. }))
        .unwrap();
    let first_trigger = events
        .position(|e| matches!(e, HardwareEvent::Trigger))
        .unwrap();
    assert!(af_at < first_trigger);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abort_after_two_fovs_leaves_stage_at_last_completed_fov() {
    let rig = Rig::new();
    let controller = rig.controller(rig.microscope(), vec![row("A1", 10, 1.0)]);
    let handle = controller.abort_handle();
    let counter = FinishCounter::default();
    controller.register_callbacks(counter.callbacks().on_region_progress(move |p| {
        if p.current_fov == 2 {
            handle.abort();
        }
    }));

    controller
        .run_acquisition(unsaved("abort").build())
        .await
        .unwrap();
    let summary = finish(&controller).await;

    assert_eq!(summary.outcome, RunOutcome::Aborted);
    assert_eq!(summary.captures, 2);
    assert!(summary.captures < 10);
    assert_eq!(rig.stage.current_position().x_mm, 1.0);
    assert_eq!(counter.calls(), 1);
    assert_eq!(
        counter.last.lock().as_ref().map(|s| s.outcome.clone()),
        Some(RunOutcome::Aborted)
    );
    assert_eq!(controller.state(), AcquisitionState::Idle);
    assert!(!rig.gate.is_engaged());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abort_is_idempotent() {
    let rig = Rig::new();
    let controller = rig.controller(rig.microscope(), vec![row("A1", 1, 1.0)]);
    let counter = FinishCounter::default();
    controller.register_callbacks(counter.callbacks());

    // Idle: nothing to abort.
    controller.abort_acquisition();
    assert_eq!(controller.state(), AcquisitionState::Idle);

    // A long inter-timepoint wait keeps the run alive until aborted.
    let params = unsaved("idempotent").timepoints(2, 3600.0).build();
    controller.run_acquisition(params).await.unwrap();

    let handle = controller.abort_handle();
    assert!(handle.abort());
    assert!(!handle.abort());
    controller.abort_acquisition();

    let summary = finish(&controller).await;
    assert_eq!(summary.outcome, RunOutcome::Aborted);
    assert!(summary.elapsed < Duration::from_secs(60));
    assert_eq!(counter.calls(), 1);

    controller.abort_acquisition();
    assert_eq!(controller.state(), AcquisitionState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_run_is_rejected_while_running() {
    let rig = Rig::new();
    let controller = rig.controller(rig.microscope(), vec![row("A1", 1, 1.0)]);

    let params = unsaved("busy").timepoints(2, 3600.0).build();
    controller.run_acquisition(params.clone()).await.unwrap();
    assert!(controller.acquisition_in_progress());
    assert!(rig.gate.is_engaged());

    let err = controller.run_acquisition(params).await.unwrap_err();
    assert!(matches!(err, AcquisitionError::AlreadyRunning));

    controller.abort_acquisition();
    finish(&controller).await;

    // Back to Idle: a new run is accepted.
    controller
        .run_acquisition(unsaved("again").build())
        .await
        .unwrap();
    assert_eq!(finish(&controller).await.outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn test_invalid_requests_start_nothing() {
    let rig = Rig::new();
    let counter = FinishCounter::default();

    let controller = rig.controller(rig.microscope(), vec![row("A1", 1, 1.0)]);
    controller.register_callbacks(counter.callbacks());
    let bad = unsaved("bad").z_stack(0, 0.001, ZStacking::FromBottom).build();
    assert!(matches!(
        controller.run_acquisition(bad).await,
        Err(AcquisitionError::InvalidParameters(_))
    ));

    let no_af = unsaved("no-af").autofocus(true).build();
    assert!(matches!(
        controller.run_acquisition(no_af).await,
        Err(AcquisitionError::InvalidParameters(_))
    ));

    let endless = unsaved("endless").timepoints(2, 1e20).build();
    assert!(matches!(
        controller.run_acquisition(endless).await,
        Err(AcquisitionError::InvalidParameters(_))
    ));
    assert!(matches!(
        controller.expected_image_count(&unsaved("many").timepoints(usize::MAX, 0.0).build()),
        Ok(n) if n == u64::try_from(usize::MAX).unwrap()
    ));

    let empty = rig.controller(rig.microscope(), vec![]);
    assert!(matches!(
        empty.run_acquisition(unsaved("empty").build()).await,
        Err(AcquisitionError::InvalidParameters(_))
    ));

    assert_eq!(controller.state(), AcquisitionState::Idle);
    assert!(!rig.gate.is_engaged());
    assert_eq!(counter.calls(), 0);
    assert!(controller.wait_for_completion().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stage_failure_ends_run_in_error() {
    let rig = Rig::with_faults(
        ErrorConfig::scenario(ErrorScenario::FailOnCall {
            operation: "move_xy",
            call: 2,
        }),
        ErrorConfig::none(),
    );
    let controller = rig.controller(rig.microscope(), vec![row("A1", 3, 1.0)]);
    let finished_state = Arc::new(Mutex::new(None));
    controller.register_callbacks({
        let handle = controller.abort_handle();
        let finished_state = finished_state.clone();
        AcquisitionCallbacks::new().on_finished(move |_| {
            *finished_state.lock() = Some(handle.state());
        })
    });

    controller
        .run_acquisition(unsaved("stage-fault").build())
        .await
        .unwrap();
    let summary = finish(&controller).await;

    assert!(matches!(summary.outcome, RunOutcome::Failed(ref msg) if msg.contains("Stage move failed")));
    assert_eq!(summary.captures, 1);
    assert_eq!(*finished_state.lock(), Some(AcquisitionState::Error));
    assert_eq!(controller.state(), AcquisitionState::Idle);
    assert!(!rig.gate.is_engaged());
    assert!(!rig.camera.is_streaming());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exhausted_camera_retries_skip_the_region() {
    // Three attempts (two retries) all fail for the first frame only.
    let camera_errors = ErrorConfig::scenarios(
        (1..=3)
            .map(|call| ErrorScenario::FailOnCall {
                operation: "read_frame",
                call,
            })
            .collect(),
    );
    let rig = Rig::with_faults(ErrorConfig::none(), camera_errors);
    let controller = rig.controller(rig.microscope(), vec![row("A", 2, 1.0), row("B", 1, 1.0)]);

    controller
        .run_acquisition(unsaved("camera").build())
        .await
        .unwrap();
    let summary = finish(&controller).await;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.captures, 1, "only region B is imaged");
    assert_eq!(summary.region_errors.len(), 1);
    assert_eq!(summary.region_errors[0].region, "A");
    assert_eq!(rig.camera.trigger_count(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transient_camera_errors_are_retried() {
    let rig = Rig::with_faults(
        ErrorConfig::none(),
        ErrorConfig::scenario(ErrorScenario::FailFirstN {
            operation: "read_frame",
            times: 2,
        }),
    );
    let controller = rig.controller(rig.microscope(), vec![row("A", 2, 1.0)]);
    controller
        .run_acquisition(unsaved("retry").build())
        .await
        .unwrap();
    let summary = finish(&controller).await;

    assert!(summary.is_clean(), "{:?}", summary);
    assert_eq!(summary.captures, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_autofocus_policy_decides_between_continue_and_skip() {
    for (policy, expected_captures, expected_region_errors) in [
        (AutofocusPolicy::Continue, 2, 0),
        (AutofocusPolicy::SkipRegion, 1, 1),
    ] {
        let rig = Rig::new();
        let af = MockAutofocus::new().with_results([false]);
        let microscope = rig.microscope().with_laser_autofocus(Arc::new(af));
        let mut config = fast_config();
        config.acquisition.autofocus_policy = policy;
        let controller =
            rig.controller_with(microscope, vec![row("A", 1, 1.0), row("B", 1, 1.0)], config);

        let params = unsaved("af-policy").reflection_autofocus(true).build();
        controller.run_acquisition(params).await.unwrap();
        let summary = finish(&controller).await;

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.captures, expected_captures, "{:?}", policy);
        assert_eq!(summary.autofocus_failures.len(), 1);
        assert_eq!(summary.autofocus_failures[0].region, "A");
        assert_eq!(summary.region_errors.len(), expected_region_errors);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_contrast_autofocus_runs_every_kth_fov() {
    let rig = Rig::new();
    let af = MockAutofocus::new();
    let microscope = rig.microscope().with_contrast_autofocus(Arc::new(af.clone()));
    let mut config = fast_config();
    config.acquisition.fovs_per_autofocus = 3;
    let controller = rig.controller_with(microscope, vec![row("A1", 7, 1.0)], config);

    controller
        .run_acquisition(unsaved("kth").autofocus(true).build())
        .await
        .unwrap();
    finish(&controller).await;

    // FOVs 0, 3 and 6.
    assert_eq!(af.run_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_later_timepoints_start_from_the_focused_z() {
    let rig = Rig::new();
    let af = MockAutofocus::new().with_focus(rig.stage.clone(), 2.5);
    let microscope = rig.microscope().with_contrast_autofocus(Arc::new(af));
    let controller = rig.controller(microscope, vec![row("A1", 1, 1.0)]);

    let params = unsaved("refocus").autofocus(true).timepoints(2, 0.0).build();
    controller.run_acquisition(params).await.unwrap();
    finish(&controller).await;

    let events = rig.events.snapshot();
    let second_visit = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, HardwareEvent::MoveXy { .. }))
        .nth(1)
        .map(|(i, _)| i)
        .unwrap();
    let next_z = events[second_visit..].iter().find_map(|e| match e {
        HardwareEvent::MoveZ { z_mm } => Some(*z_mm),
        _ => None,
    });
    assert_eq!(next_z, Some(2.5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_piezo_stack_keeps_the_stage_still() {
    let rig = Rig::new();
    let piezo = MockPiezo::new(150.0).with_event_log(rig.events.clone());
    let microscope = rig.microscope().with_piezo(Arc::new(piezo.clone()));
    let controller = rig.controller(microscope, vec![row("A1", 1, 1.0)]);

    let piezo_positions: Arc<Mutex<Vec<Option<f64>>>> = Arc::default();
    controller.register_callbacks({
        let piezo_positions = piezo_positions.clone();
        AcquisitionCallbacks::new().on_capture(move |info| piezo_positions.lock().push(info.z_piezo_um))
    });

    let params = unsaved("piezo")
        .z_stack(3, 0.001, ZStacking::FromCenter)
        .use_piezo(true)
        .build();
    controller.run_acquisition(params).await.unwrap();
    finish(&controller).await;

    let positions: Vec<f64> = piezo_positions.lock().iter().map(|p| p.unwrap()).collect();
    assert_eq!(positions.len(), 3);
    for (got, want) in positions.iter().zip([149.0, 150.0, 151.0]) {
        assert!((got - want).abs() < 1e-9, "{:?}", positions);
    }
    assert!((piezo.current_um() - 150.0).abs() < 1e-9);
    // Only the FOV's own focus move touches the stage z.
    assert_eq!(
        rig.events.count(|e| matches!(e, HardwareEvent::MoveZ { .. })),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_channel_z_offset_applies_to_single_plane() {
    let rig = Rig::new();
    let controller = rig.controller(rig.microscope(), vec![row("A1", 1, 1.0)]);
    let zs: Arc<Mutex<Vec<f64>>> = Arc::default();
    controller.register_callbacks({
        let zs = zs.clone();
        AcquisitionCallbacks::new().on_fov_position(move |p| zs.lock().push(p.z_mm))
    });

    let params = unsaved("offset")
        .channel(gfp().with_z_offset_um(5.0))
        .build();
    controller.run_acquisition(params).await.unwrap();
    finish(&controller).await;

    let zs = zs.lock().clone();
    assert_eq!(zs.len(), 2);
    assert!((zs[0] - 1.0).abs() < 1e-9);
    assert!((zs[1] - 1.005).abs() < 1e-9);
    assert!((rig.stage.current_position().z_mm - 1.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_timepoints_are_spaced_and_wrapped_by_fluidics() {
    let rig = Rig::new();
    let fluidics = MockFluidics::new();
    let microscope = rig.microscope().with_fluidics(Arc::new(fluidics.clone()));
    let controller = rig.controller(microscope, vec![row("A1", 1, 1.0)]);

    let params = unsaved("timelapse")
        .timepoints(3, 10.0)
        .use_fluidics(true)
        .build();
    controller.run_acquisition(params).await.unwrap();
    let summary = finish(&controller).await;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.captures, 3);
    assert!(summary.elapsed >= Duration::from_secs(20));
    assert_eq!(fluidics.before_calls(), vec![0, 1, 2]);
    assert_eq!(fluidics.after_calls(), vec![0, 1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_positions_only_visits_without_imaging() {
    let rig = Rig::new();
    let controller = rig.controller(rig.microscope(), vec![row("A1", 4, 1.0)]);
    let params = AcquisitionParameters::builder("visit", "")
        .skip_saving(true)
        .positions_only(true)
        .build();
    controller.run_acquisition(params).await.unwrap();
    let summary = finish(&controller).await;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.captures, 0);
    assert_eq!(rig.camera.trigger_count(), 0);
    assert_eq!(
        rig.events.count(|e| matches!(e, HardwareEvent::MoveXy { .. })),
        4
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_jobs_are_reported_and_can_abort_the_run() {
    for abort_on_failed_jobs in [false, true] {
        let dir = TempDir::new().unwrap();
        // A file where the timepoint directory should go makes every save fail.
        let exp = dir.path().join("broken");
        std::fs::create_dir_all(&exp).unwrap();
        std::fs::write(exp.join("000"), b"not a directory").unwrap();

        let rig = Rig::new();
        let mut config = fast_config();
        config.acquisition.abort_on_failed_jobs = abort_on_failed_jobs;
        config.acquisition.stabilization_x_ms = 5;
        let controller = rig.controller_with(rig.microscope(), vec![row("A1", 100, 1.0)], config);

        let params = AcquisitionParameters::builder("broken", dir.path())
            .channel(bf())
            .build();
        controller.run_acquisition(params).await.unwrap();
        let summary = finish(&controller).await;

        assert!(!summary.failed_jobs.is_empty());
        assert_eq!(
            summary.failed_jobs.len() as u64 + summary.jobs_succeeded,
            summary.jobs_submitted
        );
        if abort_on_failed_jobs {
            assert_eq!(summary.outcome, RunOutcome::Aborted);
            assert!(summary.captures < 100);
        } else {
            assert_eq!(summary.outcome, RunOutcome::Completed);
            assert_eq!(summary.captures, 100);
            assert_eq!(summary.failed_jobs.len(), 100);
        }
    }
}
