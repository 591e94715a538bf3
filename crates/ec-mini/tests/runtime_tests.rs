use std::thread;
use std::time::{Duration, Instant};

use ec_master::Stage;
use ec_mini::sim::{SimFaults, SimMaster, SimProbe};
use ec_mini::{
    AppConfig, ConfigError, CycleConfig, CyclePhase, Runtime, StartError,
};
use ec_mini_icd::{DeviceKind, DeviceTable};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(cycle: CycleConfig) -> AppConfig {
    use DeviceKind::*;
    AppConfig {
        devices: DeviceTable::from_kinds(&[EK1100, EL2004, EL1014, EL2004])
            .unwrap(),
        cycle,
    }
}

fn fast_cycle() -> CycleConfig {
    CycleConfig {
        period_us: 500,
        start_delay_ms: 0,
        rotate_after_ticks: 2,
        ..Default::default()
    }
}

fn sim_for(config: &AppConfig, faults: SimFaults) -> (SimMaster, SimProbe) {
    let sim = SimMaster::mirroring(&config.devices).with_faults(faults);
    let probe = sim.probe();
    (sim, probe)
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    done()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn start_then_stop_releases_everything() {
    let config = config(fast_cycle());
    let (sim, probe) = sim_for(&config, SimFaults::default());

    let runtime = Runtime::start(sim, config).ok().unwrap();
    assert!(wait_until(Duration::from_secs(2), || probe.frames_written() > 20));
    assert!(runtime.is_cycling());
    assert!(runtime.stats().running);

    let state = runtime.stop().unwrap().unwrap();

    assert_eq!(state.phase, CyclePhase::Stopped);
    assert_eq!(probe.live(), 0);
    assert!(!probe.is_active());
    assert_eq!(probe.clears(), 1);
    assert_eq!(probe.output(1, 0), Some(0));

    // Nothing touches the bus after stop returns.
    let frames = probe.frames_written();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(probe.frames_written(), frames);
}

#[test]
fn outputs_follow_the_rotation() {
    let config = config(fast_cycle());
    let (sim, probe) = sim_for(&config, SimFaults::default());

    let runtime = Runtime::start(sim, config).ok().unwrap();
    // Two ticks per channel, four channels per device. The eighth tick
    // completes the first device and the sixteenth wraps back to it.
    assert!(wait_until(Duration::from_secs(2), || probe.writes().len() >= 16));
    runtime.stop().unwrap();

    let writes = probe.writes();
    let targets: Vec<usize> = writes.iter().map(|w| w.0).collect();
    assert!(targets[..7].iter().all(|p| *p == 1));
    assert!(targets[7..15].iter().all(|p| *p == 3));
    assert_eq!(targets[15], 1);
    assert!(writes[..15].iter().all(|w| w.2 == 0));
    assert_eq!(writes[15].2, 1);
}

#[test]
fn acquire_failure_reports_the_stage() {
    let config = config(fast_cycle());
    let faults = SimFaults {
        fail_stage: Some(Stage::ActivateDevices),
        ..Default::default()
    };
    let (sim, probe) = sim_for(&config, faults);

    match Runtime::start(sim, config) {
        Err(StartError::Acquire(err)) => {
            assert_eq!(err.stage(), Stage::ActivateDevices);
            let message = StartError::<ec_mini::sim::SimError>::Acquire(err)
                .to_string();
            assert!(message.contains("activate devices"), "{message}");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("start should fail"),
    }

    assert_eq!(probe.live(), 0);
    assert_eq!(probe.frames_written(), 0);
}

#[test]
fn invalid_config_acquires_nothing() {
    let mut config = config(fast_cycle());
    config.devices = DeviceTable::default();
    let (sim, probe) = sim_for(&config, SimFaults::default());

    let result = Runtime::start(sim, config);

    assert!(matches!(
        result,
        Err(StartError::Config(ConfigError::EmptyTable))
    ));
    assert_eq!(probe.live(), 0);
}

#[test]
fn faulted_cycle_holds_master_until_stop() {
    let config = config(CycleConfig {
        max_consecutive_failures: 5,
        ..fast_cycle()
    });
    let faults = SimFaults { fail_reads: true, ..Default::default() };
    let (sim, probe) = sim_for(&config, faults);

    let runtime = Runtime::start(sim, config).ok().unwrap();
    assert!(wait_until(Duration::from_secs(2), || !runtime.is_cycling()));

    let stats = runtime.stats();
    assert_eq!(stats.ticks, 6);
    assert_eq!(stats.read_failures, 5);
    assert!(!stats.running);
    assert!(probe.is_active());

    let state = runtime.stop().unwrap().unwrap();
    assert_eq!(state.phase, CyclePhase::Faulted);
    assert_eq!(probe.live(), 0);
}

#[test]
fn disabled_cycle_only_holds_the_master() {
    let config = config(CycleConfig { enabled: false, ..fast_cycle() });
    let (sim, probe) = sim_for(&config, SimFaults::default());

    let runtime = Runtime::start(sim, config).ok().unwrap();
    thread::sleep(Duration::from_millis(10));

    assert!(!runtime.is_cycling());
    assert!(probe.is_active());
    assert_eq!(probe.frames_written(), 0);

    assert_eq!(runtime.stop(), Ok(None));
    assert_eq!(probe.live(), 0);
}

#[test]
fn dropping_the_runtime_stops_it() {
    let config = config(fast_cycle());
    let (sim, probe) = sim_for(&config, SimFaults::default());

    let runtime = Runtime::start(sim, config).ok().unwrap();
    assert!(wait_until(Duration::from_secs(2), || probe.frames_written() > 0));
    drop(runtime);

    assert_eq!(probe.live(), 0);
    assert!(!probe.is_active());
}
