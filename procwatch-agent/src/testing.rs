//! Test doubles for the agent pipeline
//!
//! - `ManualClock`: virtual time, sleeps are recorded and advance the clock
//! - `FakeTable`: scripted process table, one reading set per refresh
//! - `ScriptedTransport`: scripted delivery results, records what was sent

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::delivery::{DeliveryError, Transport};
use crate::sampler::{ProcessReading, ProcessTable};
use crate::snapshot::Snapshot;

pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap();
        *elapsed = elapsed.saturating_add(by);
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
        std::future::ready(())
    }
}

pub struct FakeTable {
    passes: VecDeque<Vec<ProcessReading>>,
    current: Vec<ProcessReading>,
    refreshes: usize,
}

impl FakeTable {
    pub fn new(passes: Vec<Vec<ProcessReading>>) -> Self {
        Self {
            passes: passes.into(),
            current: Vec::new(),
            refreshes: 0,
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes
    }
}

impl ProcessTable for FakeTable {
    fn refresh(&mut self) {
        self.refreshes += 1;
        self.current = self.passes.pop_front().unwrap_or_default();
    }

    fn readings(&self) -> Vec<ProcessReading> {
        self.current.clone()
    }
}

pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    fail_when_exhausted: bool,
    calls: AtomicU32,
    sent: Mutex<Vec<Snapshot>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<(), DeliveryError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fail_when_exhausted: false,
            calls: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        Self {
            fail_when_exhausted: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Snapshot> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, snapshot: &Snapshot) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(snapshot.clone());

        let next = self.script.lock().unwrap().pop_front();
        let result = match next {
            Some(result) => result,
            None if self.fail_when_exhausted => Err(DeliveryError::Status(500)),
            None => Ok(()),
        };
        std::future::ready(result)
    }
}
