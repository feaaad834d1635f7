use core::cell::Cell;

use power_core::activity::{ActivityFlags, ActivityMonitor, ActivityTimer};
use power_core::link::{LinkStatus, LinkStatusSource};
use power_core::transition::{
    Indicator, PowerTransitionCoordinator, SleepPrimitive, SleepSequencer, TimerService,
    TransitionCallback, TransitionPhase, TransitionVerdict,
};

const STATUSES: [LinkStatus; 4] = [
    LinkStatus::ACTIVE,
    LinkStatus::DETACHED,
    LinkStatus::SUSPENDED,
    LinkStatus::new(false, true),
];

#[test]
fn every_quiesce_is_restored_exactly_once() {
    let flags = ActivityFlags::new();
    let timer = PairedTimer::default();
    let service = PairedService::default();
    let link = Link(Cell::new(LinkStatus::ACTIVE));
    let monitor = ActivityMonitor::new(&flags, &timer, &link);
    let mut led = Led;
    let mut coordinator = PowerTransitionCoordinator::new(&flags, &timer, &service, &mut led);
    let mut peer = CoinPeer { allow: true };
    let mut sequencer = SleepSequencer::new(Wfi);
    let mut rng = Lcg(0x2545_f491);

    for _ in 0..2_000 {
        match rng.next() % 3 {
            0 | 1 => {
                let status = STATUSES[(rng.next() % 4) as usize];
                link.0.set(status);
                monitor.on_tick();
                assert_eq!(flags.suspend_requested(), !status.is_active());
            }
            _ => {
                peer.allow = rng.next() % 2 == 0;
                let _ = sequencer.enter(&mut [&mut coordinator, &mut peer]);

                assert!(!coordinator.is_quiesced());
                assert!(timer.is_running());
                assert!(service.running.get());
                assert_eq!(timer.stops.get(), timer.restarts_after_stop.get());
                assert_eq!(service.stops.get(), service.starts.get());
            }
        }
    }

    assert!(sequencer.entries() > 0);
    assert!(sequencer.denials() > 0);
}

#[test]
fn check_ready_cannot_allow_twice_without_restore() {
    let flags = ActivityFlags::new();
    flags.record_sample(LinkStatus::DETACHED);
    let timer = PairedTimer::default();
    let service = PairedService::default();
    let mut led = Led;
    let mut coordinator = PowerTransitionCoordinator::new(&flags, &timer, &service, &mut led);

    assert!(coordinator.on_phase(TransitionPhase::CheckReady).is_allowed());
    assert!(coordinator.on_phase(TransitionPhase::CheckReady).is_allowed());
    assert_eq!(timer.stops.get(), 1);

    coordinator.on_phase(TransitionPhase::CheckFail);
    coordinator.on_phase(TransitionPhase::CheckFail);
    assert_eq!(timer.restarts_after_stop.get(), 1);

    assert!(coordinator.on_phase(TransitionPhase::CheckReady).is_allowed());
    assert_eq!(timer.stops.get(), 2);
}

struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.0 >> 8
    }
}

struct PairedTimer {
    running: Cell<bool>,
    stops: Cell<u32>,
    restarts_after_stop: Cell<u32>,
}

impl Default for PairedTimer {
    fn default() -> Self {
        Self {
            running: Cell::new(true),
            stops: Cell::new(0),
            restarts_after_stop: Cell::new(0),
        }
    }
}

impl ActivityTimer for PairedTimer {
    fn start(&self) {
        if !self.running.get() {
            self.restarts_after_stop
                .set(self.restarts_after_stop.get() + 1);
        }
        self.running.set(true);
    }

    fn stop(&self) {
        assert!(self.running.get(), "timer stopped twice without restore");
        self.running.set(false);
        self.stops.set(self.stops.get() + 1);
    }

    fn acknowledge(&self) {}

    fn is_running(&self) -> bool {
        self.running.get()
    }
}

struct PairedService {
    running: Cell<bool>,
    starts: Cell<u32>,
    stops: Cell<u32>,
}

impl Default for PairedService {
    fn default() -> Self {
        Self {
            running: Cell::new(true),
            starts: Cell::new(0),
            stops: Cell::new(0),
        }
    }
}

impl TimerService for PairedService {
    fn start(&self) {
        if !self.running.get() {
            self.starts.set(self.starts.get() + 1);
        }
        self.running.set(true);
    }

    fn stop(&self) {
        self.running.set(false);
        self.stops.set(self.stops.get() + 1);
    }
}

struct Led;

impl Indicator for Led {
    fn set_active(&mut self, _: bool) {}

    fn toggle(&mut self) {}
}

struct Link(Cell<LinkStatus>);

impl LinkStatusSource for Link {
    fn status(&self) -> LinkStatus {
        self.0.get()
    }
}

struct Wfi;

impl SleepPrimitive for Wfi {
    fn wait_for_interrupt(&mut self) {}
}

struct CoinPeer {
    allow: bool,
}

impl TransitionCallback for CoinPeer {
    fn on_phase(&mut self, phase: TransitionPhase) -> TransitionVerdict {
        match phase {
            TransitionPhase::CheckReady if !self.allow => TransitionVerdict::Deny,
            _ => TransitionVerdict::Allow,
        }
    }
}
