//! Discrete-event scheduler driving the emulated medium.
//!
//! Uses a `BinaryHeap` with reversed `Ord` to act as a min-heap keyed by
//! `(time, event id)`. Event ids are strictly increasing, so events due at the
//! same instant run in the order they were scheduled, which is what keeps the
//! per-node delivery order stable.
//!
//! Reader threads never touch the scheduler directly. They push frames through
//! an [`Injector`] into a channel that the scheduler drains before every step;
//! each drained frame becomes an ordinary event in its node's context.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::cmp::Ordering;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, error, trace};

use super::clock::{ClockMode, WallClock};
use super::time::{NodeId, SimTime};
use crate::error::BridgeResult;
use crate::frame::Frame;

/// Longest single wait in realtime mode, so injected frames are picked up promptly.
const MAX_WAIT_SLICE: Duration = Duration::from_millis(25);

/// Work carried by a scheduled event.
pub type EventFn = Box<dyn FnOnce(&mut Simulator) -> BridgeResult<()>>;

type InjectHandler = Rc<dyn Fn(&mut Simulator, Frame) -> BridgeResult<()>>;

/// Identifier of a scheduled event, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

/// Identifier of a registered cross-thread injection handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InjectorId(u64);

struct ScheduledEvent {
    at: SimTime,
    id: EventId,
    context: Option<NodeId>,
    action: EventFn,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the earliest (time, id) first.
        other.at.cmp(&self.at).then_with(|| other.id.cmp(&self.id))
    }
}

struct InjectedFrame {
    context: NodeId,
    source: InjectorId,
    frame: Frame,
}

/// Thread-safe handle a reader thread uses to hand frames to the simulation.
///
/// Frames injected through one handle keep their relative order and are
/// dispatched in the context of the node the handle was created for.
#[derive(Clone)]
pub struct Injector {
    context: NodeId,
    id: InjectorId,
    tx: Sender<InjectedFrame>,
}

impl Injector {
    pub fn id(&self) -> InjectorId {
        self.id
    }

    pub fn context(&self) -> NodeId {
        self.context
    }

    /// Queue a frame for the simulation thread. Returns `false` once the
    /// scheduler is gone.
    pub fn inject(&self, frame: Frame) -> bool {
        self.tx
            .send(InjectedFrame {
                context: self.context,
                source: self.id,
                frame,
            })
            .is_ok()
    }
}

/// The discrete-event scheduler.
pub struct Simulator {
    now: SimTime,
    queue: BinaryHeap<ScheduledEvent>,
    pending: HashSet<EventId>,
    next_id: u64,
    context: Option<NodeId>,
    stopped: bool,
    clock_mode: ClockMode,
    speed_percent: u32,
    clock: Option<WallClock>,
    injected_tx: Sender<InjectedFrame>,
    injected_rx: Receiver<InjectedFrame>,
    handlers: HashMap<InjectorId, InjectHandler>,
    next_injector: u64,
}

impl Simulator {
    /// A scheduler that dispatches events back to back.
    pub fn new() -> Self {
        Self::with_clock(ClockMode::AsFastAsPossible)
    }

    pub fn with_clock(clock_mode: ClockMode) -> Self {
        let (injected_tx, injected_rx) = unbounded();
        Simulator {
            now: SimTime::ZERO,
            queue: BinaryHeap::new(),
            pending: HashSet::new(),
            next_id: 0,
            context: None,
            stopped: false,
            clock_mode,
            speed_percent: 100,
            clock: None,
            injected_tx,
            injected_rx,
            handlers: HashMap::new(),
            next_injector: 0,
        }
    }

    pub fn clock_mode(&self) -> ClockMode {
        self.clock_mode
    }

    /// Realtime speed factor in percent (1..=1000). Ignored when running as fast as possible.
    pub fn set_speed_percent(&mut self, percent: u32) {
        self.speed_percent = percent.clamp(1, 1000);
        if let Some(clock) = self.clock.as_mut() {
            clock.set_speed_percent(self.speed_percent);
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Node context of the event currently being dispatched, if any.
    pub fn context(&self) -> Option<NodeId> {
        self.context
    }

    /// Schedule `action` after `delay`, inheriting the current node context.
    pub fn schedule<F>(&mut self, delay: Duration, action: F) -> EventId
    where
        F: FnOnce(&mut Simulator) -> BridgeResult<()> + 'static,
    {
        let context = self.context;
        self.push(delay, context, Box::new(action))
    }

    /// Schedule `action` after `delay` in the context of `node`.
    pub fn schedule_with_context<F>(&mut self, node: NodeId, delay: Duration, action: F) -> EventId
    where
        F: FnOnce(&mut Simulator) -> BridgeResult<()> + 'static,
    {
        self.push(delay, Some(node), Box::new(action))
    }

    /// Schedule `action` at the current time, after everything already due now.
    pub fn schedule_now<F>(&mut self, action: F) -> EventId
    where
        F: FnOnce(&mut Simulator) -> BridgeResult<()> + 'static,
    {
        self.schedule(Duration::ZERO, action)
    }

    fn push(&mut self, delay: Duration, context: Option<NodeId>, action: EventFn) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        let at = self.now.after(delay);
        trace!("scheduling {} at {} (context {:?})", id, at, context);
        self.pending.insert(id);
        self.queue.push(ScheduledEvent { at, id, context, action });
        id
    }

    /// Cancel a pending event. Cancelling an event that already ran is a no-op.
    pub fn cancel(&mut self, id: EventId) {
        if self.pending.remove(&id) {
            trace!("cancelled {}", id);
        }
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains(&id)
    }

    /// Number of events that are scheduled and not cancelled.
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    /// Stop the run loop `delay` from now.
    pub fn stop_at(&mut self, delay: Duration) -> EventId {
        self.schedule(delay, |sim| {
            debug!("simulation stop reached at {}", sim.now);
            sim.stopped = true;
            Ok(())
        })
    }

    /// Stop the run loop after the current event.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Register a handler for frames injected from another thread and return
    /// the `Send` handle that thread should use.
    pub fn injector<F>(&mut self, node: NodeId, handler: F) -> Injector
    where
        F: Fn(&mut Simulator, Frame) -> BridgeResult<()> + 'static,
    {
        let id = InjectorId(self.next_injector);
        self.next_injector += 1;
        self.handlers.insert(id, Rc::new(handler));
        Injector {
            context: node,
            id,
            tx: self.injected_tx.clone(),
        }
    }

    /// Drop a handler. Frames still queued for it are discarded.
    pub fn remove_injector(&mut self, id: InjectorId) {
        self.handlers.remove(&id);
    }

    /// Number of registered injection handlers.
    pub fn injectors(&self) -> usize {
        self.handlers.len()
    }

    fn accept_injected(&mut self, injected: InjectedFrame) {
        let Some(handler) = self.handlers.get(&injected.source).cloned() else {
            debug!("dropping injected frame for {}: handler removed", injected.context);
            return;
        };
        // In realtime mode the frame is stamped with the simulated time it arrived at.
        let delay = match &self.clock {
            Some(clock) => clock.to_virtual(Instant::now()).saturating_since(self.now),
            None => Duration::ZERO,
        };
        let frame = injected.frame;
        self.schedule_with_context(injected.context, delay, move |sim| handler(sim, frame));
    }

    /// Move every frame waiting in the injection channel onto the event queue.
    pub fn drain_injected(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(injected) = self.injected_rx.try_recv() {
            self.accept_injected(injected);
            drained += 1;
        }
        drained
    }

    fn wait_injected(&mut self, timeout: Duration) {
        match self.injected_rx.recv_timeout(timeout.min(MAX_WAIT_SLICE)) {
            Ok(injected) => self.accept_injected(injected),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {}
        }
    }

    fn next_live_time(&mut self) -> Option<SimTime> {
        while let Some(head) = self.queue.peek() {
            if self.pending.contains(&head.id) {
                return Some(head.at);
            }
            self.queue.pop();
        }
        None
    }

    /// Dispatch the next pending event. Returns `Ok(false)` when nothing is pending.
    pub fn step(&mut self) -> BridgeResult<bool> {
        while let Some(event) = self.queue.pop() {
            if !self.pending.remove(&event.id) {
                continue;
            }
            self.now = event.at;
            let previous = std::mem::replace(&mut self.context, event.context);
            let result = (event.action)(self);
            self.context = previous;
            if let Err(err) = &result {
                error!("event {} at {} failed: {}", event.id, self.now, err);
            }
            return result.map(|()| true);
        }
        Ok(false)
    }

    /// Run until the queue is empty or a stop is reached. The first fatal
    /// error aborts the run and is returned.
    ///
    /// In realtime mode the loop also keeps waiting for injected frames while
    /// any injection handler is registered.
    pub fn run(&mut self) -> BridgeResult<u64> {
        self.stopped = false;
        if self.clock_mode == ClockMode::Realtime && self.clock.is_none() {
            self.clock = Some(WallClock::start(self.now, self.speed_percent));
        }
        let mut processed = 0u64;
        loop {
            self.drain_injected();
            if self.stopped {
                break;
            }
            let next = self.next_live_time();
            let realtime_deadline = self.clock.as_ref().zip(next).map(|(clock, at)| clock.to_real(at));
            match (self.clock_mode, next) {
                (ClockMode::AsFastAsPossible, None) => break,
                (ClockMode::Realtime, None) => {
                    if self.handlers.is_empty() {
                        break;
                    }
                    self.wait_injected(MAX_WAIT_SLICE);
                    continue;
                }
                (ClockMode::Realtime, Some(_)) => {
                    if let Some(deadline) = realtime_deadline {
                        let host_now = Instant::now();
                        if deadline > host_now {
                            self.wait_injected(deadline - host_now);
                            continue;
                        }
                    }
                }
                (ClockMode::AsFastAsPossible, Some(_)) => {}
            }
            if self.step()? {
                processed += 1;
            }
        }
        self.clock = None;
        debug!("run finished at {} after {} events", self.now, processed);
        Ok(processed)
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::error::BridgeError;

    fn recorder() -> Rc<RefCell<Vec<(SimTime, Option<NodeId>, &'static str)>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn fifo_at_same_time() {
        let mut sim = Simulator::new();
        let log = recorder();
        for name in ["first", "second", "third"] {
            let log = log.clone();
            sim.schedule(Duration::from_millis(10), move |sim| {
                log.borrow_mut().push((sim.now(), sim.context(), name));
                Ok(())
            });
        }
        assert_eq!(sim.run().unwrap(), 3);
        let names: Vec<_> = log.borrow().iter().map(|e| e.2).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(sim.now(), SimTime::from_millis(10));
    }

    #[test]
    fn time_ordering() {
        let mut sim = Simulator::new();
        let log = recorder();
        for (ms, name) in [(30, "late"), (10, "early"), (20, "mid")] {
            let log = log.clone();
            sim.schedule(Duration::from_millis(ms), move |sim| {
                log.borrow_mut().push((sim.now(), None, name));
                Ok(())
            });
        }
        sim.run().unwrap();
        let times: Vec<_> = log.borrow().iter().map(|e| e.0).collect();
        assert_eq!(times, vec![SimTime::from_millis(10), SimTime::from_millis(20), SimTime::from_millis(30)]);
    }

    #[test]
    fn cancelled_events_never_run() {
        let mut sim = Simulator::new();
        let log = recorder();
        let l = log.clone();
        let id = sim.schedule(Duration::from_millis(1), move |_| {
            l.borrow_mut().push((SimTime::ZERO, None, "cancelled"));
            Ok(())
        });
        assert!(sim.is_pending(id));
        assert_eq!(sim.pending_events(), 1);
        sim.cancel(id);
        assert!(!sim.is_pending(id));
        assert_eq!(sim.pending_events(), 0);
        assert_eq!(sim.run().unwrap(), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn context_is_inherited_by_nested_schedules() {
        let mut sim = Simulator::new();
        let log = recorder();
        let l = log.clone();
        sim.schedule_with_context(NodeId::new(4), Duration::from_millis(1), move |sim| {
            let l2 = l.clone();
            sim.schedule(Duration::from_millis(1), move |sim| {
                l2.borrow_mut().push((sim.now(), sim.context(), "nested"));
                Ok(())
            });
            Ok(())
        });
        sim.run().unwrap();
        assert_eq!(log.borrow()[0], (SimTime::from_millis(2), Some(NodeId::new(4)), "nested"));
        assert_eq!(sim.context(), None);
    }

    #[test]
    fn stop_at_halts_the_run() {
        let mut sim = Simulator::new();
        let log = recorder();
        sim.stop_at(Duration::from_millis(5));
        let l = log.clone();
        sim.schedule(Duration::from_millis(6), move |_| {
            l.borrow_mut().push((SimTime::ZERO, None, "after stop"));
            Ok(())
        });
        sim.run().unwrap();
        assert!(log.borrow().is_empty());
        assert!(sim.is_stopped());
        assert_eq!(sim.now(), SimTime::from_millis(5));
        assert_eq!(sim.pending_events(), 1);
    }

    #[test]
    fn first_error_aborts_the_run() {
        let mut sim = Simulator::new();
        let log = recorder();
        sim.schedule(Duration::from_millis(1), |_| Err(BridgeError::LossModelUnset));
        let l = log.clone();
        sim.schedule(Duration::from_millis(2), move |_| {
            l.borrow_mut().push((SimTime::ZERO, None, "never"));
            Ok(())
        });
        let err = sim.run().unwrap_err();
        assert!(matches!(err, BridgeError::LossModelUnset));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn injected_frames_run_in_node_context_and_order() {
        let mut sim = Simulator::new();
        let seen: Rc<RefCell<Vec<(Option<NodeId>, Vec<u8>)>>> = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let injector = sim.injector(NodeId::new(9), move |sim, frame| {
            s.borrow_mut().push((sim.context(), frame.as_bytes().to_vec()));
            Ok(())
        });
        let remote = injector.clone();
        std::thread::spawn(move || {
            for i in 0..5u8 {
                assert!(remote.inject(Frame::from(vec![i])));
            }
        })
        .join()
        .unwrap();
        sim.run().unwrap();
        let seen = seen.borrow();
        assert_eq!(seen.len(), 5);
        for (i, (context, bytes)) in seen.iter().enumerate() {
            assert_eq!(*context, Some(NodeId::new(9)));
            assert_eq!(bytes, &vec![i as u8]);
        }
    }

    #[test]
    fn frames_for_removed_injectors_are_dropped() {
        let mut sim = Simulator::new();
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        let injector = sim.injector(NodeId::new(1), move |_, _| {
            *h.borrow_mut() += 1;
            Ok(())
        });
        assert_eq!(sim.injectors(), 1);
        assert!(injector.inject(Frame::from(vec![1, 2, 3])));
        sim.remove_injector(injector.id());
        assert_eq!(sim.injectors(), 0);
        sim.run().unwrap();
        assert_eq!(*hits.borrow(), 0);
    }

    #[test]
    fn realtime_run_paces_against_the_host_clock() {
        let mut sim = Simulator::with_clock(ClockMode::Realtime);
        sim.schedule(Duration::from_millis(40), |_| Ok(()));
        let started = Instant::now();
        assert_eq!(sim.run().unwrap(), 1);
        assert!(started.elapsed() >= Duration::from_millis(35));
        assert_eq!(sim.now(), SimTime::from_millis(40));
    }
}
