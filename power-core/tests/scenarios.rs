use core::cell::Cell;

use power_core::activity::{ActivityFlags, ActivityMonitor, ActivityTimer};
use power_core::control::{
    ControlLoop, LoopConfig, LoopDecision, LoopState, RESUME_RECOVERY_DELAY, WakeOutcome,
};
use power_core::link::{LinkStatus, LinkStatusSource};
use power_core::report::{ACTIVE_MESSAGE, StatusReporter};
use power_core::transition::{
    Indicator, PowerTransitionCoordinator, SleepError, SleepPrimitive, SleepSequencer,
    TimerService, TransitionCallback, TransitionPhase, TransitionVerdict,
};

#[test]
fn scenario_a_suspend_sleep_resume_applies_recovery_once() {
    let flags = ActivityFlags::new();
    let hw = Hardware::default();
    let monitor = ActivityMonitor::new(&flags, &hw.timer, &hw.link);
    let mut led = MockLed::default();
    let mut coordinator = PowerTransitionCoordinator::new(&flags, &hw.timer, &hw.service, &mut led);
    let mut sequencer = SleepSequencer::new(WfiCounter::default());
    let mut control = ControlLoop::default();

    hw.link.set(LinkStatus::DETACHED);
    monitor.on_tick();
    assert!(flags.suspend_requested());

    let decision = control.poll(&flags, hw.link.status());
    assert!(matches!(decision, LoopDecision::EnterSleep { .. }));

    let result = sequencer.enter(&mut [&mut coordinator]);
    assert_eq!(result, Ok(()));
    assert_eq!(control.finish_sleep(result), WakeOutcome::Woke);
    assert_eq!(sequencer.primitive().waits, 1);
    assert!(hw.timer.is_running(), "after-transition must re-arm detection");
    assert!(hw.service.running.get());

    hw.link.set(LinkStatus::ACTIVE);
    monitor.on_tick();
    assert!(flags.resume_detected());

    let mut recoveries = 0;
    for _ in 0..4 {
        if let LoopDecision::Resumed { recovery_delay } = control.poll(&flags, hw.link.status()) {
            assert_eq!(recovery_delay, RESUME_RECOVERY_DELAY);
            recoveries += 1;
        }
        monitor.on_tick();
    }

    assert_eq!(recoveries, 1);
    assert_eq!(control.state(), LoopState::Active);
    assert_eq!(control.stats().resumes, 1);
}

#[test]
fn resume_seen_before_sleep_does_not_trigger_recovery() {
    let flags = ActivityFlags::new();
    let hw = Hardware::default();
    let monitor = ActivityMonitor::new(&flags, &hw.timer, &hw.link);
    let mut control = ControlLoop::default();

    for _ in 0..10 {
        monitor.on_tick();
    }
    hw.link.set(LinkStatus::SUSPENDED);
    monitor.on_tick();

    control.poll(&flags, hw.link.status());
    control.finish_sleep(Ok(()));

    assert!(matches!(
        control.poll(&flags, hw.link.status()),
        LoopDecision::EnterSleep { .. }
    ));
    control.finish_sleep(Ok(()));
    assert_eq!(control.stats().resumes, 0);
}

#[test]
fn scenario_b_heartbeat_fires_once_after_threshold() {
    let flags = ActivityFlags::new();
    let hw = Hardware::default();
    let monitor = ActivityMonitor::new(&flags, &hw.timer, &hw.link);
    let mut control = ControlLoop::new(LoopConfig::new().with_report_threshold(3_000));
    let mut reporter = StatusReporter::default();
    let mut reports = 0;

    for sample in 1..=3_001u32 {
        monitor.on_tick();
        match control.poll(&flags, hw.link.status()) {
            LoopDecision::Report { count } => {
                assert_eq!(sample, 3_001);
                assert_eq!(count, 3_001);
                let frame = reporter.prepare().expect("heartbeat fits");
                assert!(frame.starts_with(ACTIVE_MESSAGE.as_bytes()));
                reports += 1;
            }
            LoopDecision::Idle => {}
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    assert_eq!(reports, 1);
    assert_eq!(flags.activity_count(), 0);
    assert_eq!(reporter.sent(), 1);
}

#[test]
fn scenario_c_peer_veto_restores_and_next_attempt_is_independent() {
    let flags = ActivityFlags::new();
    let hw = Hardware::default();
    let monitor = ActivityMonitor::new(&flags, &hw.timer, &hw.link);
    let mut led = MockLed::default();
    let mut coordinator = PowerTransitionCoordinator::new(&flags, &hw.timer, &hw.service, &mut led);
    let mut peer = Peer {
        verdict: TransitionVerdict::Deny,
    };
    let mut sequencer = SleepSequencer::new(WfiCounter::default());
    let mut control = ControlLoop::default();

    hw.link.set(LinkStatus::DETACHED);
    monitor.on_tick();

    control.poll(&flags, hw.link.status());
    let result = sequencer.enter(&mut [&mut coordinator, &mut peer]);
    assert_eq!(result, Err(SleepError::Denied { callback: 1 }));
    assert!(!coordinator.is_quiesced());
    assert!(hw.timer.is_running());
    assert_eq!(hw.timer.stops.get(), 1);
    assert_eq!(hw.timer.starts.get(), 1);
    assert!(matches!(
        control.finish_sleep(result),
        WakeOutcome::EntryFailed(SleepError::Denied { callback: 1 })
    ));

    assert!(flags.suspend_requested());
    peer.verdict = TransitionVerdict::Allow;
    control.poll(&flags, hw.link.status());
    let result = sequencer.enter(&mut [&mut coordinator, &mut peer]);
    assert_eq!(result, Ok(()));
    assert_eq!(control.finish_sleep(result), WakeOutcome::Woke);

    assert_eq!(hw.timer.stops.get(), 2);
    assert_eq!(hw.timer.starts.get(), 2);
    assert_eq!(sequencer.primitive().waits, 1);
    assert_eq!(sequencer.denials(), 1);
}

#[test]
fn deny_without_suspend_request_is_not_an_error() {
    let flags = ActivityFlags::new();
    let hw = Hardware::default();
    let mut led = MockLed::default();
    let mut coordinator = PowerTransitionCoordinator::new(&flags, &hw.timer, &hw.service, &mut led);

    assert_eq!(
        coordinator.on_phase(TransitionPhase::CheckReady),
        TransitionVerdict::Deny
    );
    assert_eq!(hw.timer.stops.get(), 0);
    assert!(hw.timer.is_running());
}

#[derive(Default)]
struct Hardware {
    timer: MockTimer,
    service: MockService,
    link: MockLink,
}

struct MockTimer {
    running: Cell<bool>,
    starts: Cell<u32>,
    stops: Cell<u32>,
}

impl Default for MockTimer {
    fn default() -> Self {
        Self {
            running: Cell::new(true),
            starts: Cell::new(0),
            stops: Cell::new(0),
        }
    }
}

impl ActivityTimer for MockTimer {
    fn start(&self) {
        self.running.set(true);
        self.starts.set(self.starts.get() + 1);
    }

    fn stop(&self) {
        self.running.set(false);
        self.stops.set(self.stops.get() + 1);
    }

    fn acknowledge(&self) {}

    fn is_running(&self) -> bool {
        self.running.get()
    }
}

struct MockService {
    running: Cell<bool>,
}

impl Default for MockService {
    fn default() -> Self {
        Self {
            running: Cell::new(true),
        }
    }
}

impl TimerService for MockService {
    fn start(&self) {
        self.running.set(true);
    }

    fn stop(&self) {
        self.running.set(false);
    }
}

#[derive(Default)]
struct MockLed {
    on: bool,
}

impl Indicator for MockLed {
    fn set_active(&mut self, on: bool) {
        self.on = on;
    }

    fn toggle(&mut self) {
        self.on = !self.on;
    }
}

struct MockLink {
    status: Cell<LinkStatus>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self {
            status: Cell::new(LinkStatus::ACTIVE),
        }
    }
}

impl MockLink {
    fn set(&self, status: LinkStatus) {
        self.status.set(status);
    }
}

impl LinkStatusSource for MockLink {
    fn status(&self) -> LinkStatus {
        self.status.get()
    }
}

#[derive(Default)]
struct WfiCounter {
    waits: u32,
}

impl SleepPrimitive for WfiCounter {
    fn wait_for_interrupt(&mut self) {
        self.waits += 1;
    }
}

struct Peer {
    verdict: TransitionVerdict,
}

impl TransitionCallback for Peer {
    fn on_phase(&mut self, phase: TransitionPhase) -> TransitionVerdict {
        match phase {
            TransitionPhase::CheckReady => self.verdict,
            _ => TransitionVerdict::Allow,
        }
    }
}
