// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Serialized access to the single-threaded graph engine.
//!
//! The engine must only ever be touched by one thread, one call at a time.
//! [`RuntimeBroker`] owns a dedicated OS thread that builds the engine and
//! then runs submitted jobs strictly in order. Callers never see the engine
//! outside a job, so there is no lock to forget or to hold too long.
//!
//! ```text
//!  session A ──with_engine(f)──┐
//!  session B ──with_engine(g)──┼──▶ [ mpsc ] ──▶ flowstream-engine thread
//!  teardown  ──dispatch(h)─────┘                  f(&mut engine)
//!                                                 g(&mut engine)
//!                                                 pump() every tick
//! ```
//!
//! # Guarantees
//!
//! * Jobs never overlap. A job that calls back into the broker from the
//!   engine thread gets [`EngineError::Reentrant`] instead of a deadlock.
//! * A panicking job is caught and reported as [`EngineError::Fault`]; the
//!   engine thread keeps serving later jobs.
//! * While idle, and between jobs once the tick interval has passed, the
//!   broker calls [`GraphEngine::pump`] so running graphs make progress.
//! * After [`RuntimeBroker::shutdown`] every call returns
//!   [`EngineError::Unavailable`].

use std::any::Any;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::config::consts::DEFAULT_TICK_INTERVAL_MS;
use crate::errors::{EngineError, EngineResult};
use crate::observability::messages::broker::{BrokerStarted, BrokerStopped, JobPanicked};
use crate::observability::messages::StructuredLog;
use crate::traits::GraphEngine;

const ENGINE_THREAD_NAME: &str = "flowstream-engine";

thread_local! {
    static ON_ENGINE_THREAD: Cell<bool> = const { Cell::new(false) };
}

type Job = Box<dyn FnOnce(&mut dyn GraphEngine) + Send>;

enum BrokerMessage {
    Run(Job),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// How often an idle engine thread pumps running graphs.
    pub tick_interval: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
        }
    }
}

struct BrokerInner {
    jobs: mpsc::Sender<BrokerMessage>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to the engine thread.
#[derive(Clone)]
pub struct RuntimeBroker {
    inner: Arc<BrokerInner>,
}

impl RuntimeBroker {
    /// Starts the engine thread and builds the engine on it with `factory`.
    ///
    /// Returns once the engine exists; a factory error is returned here and
    /// the thread exits.
    pub fn spawn<F>(factory: F, settings: BrokerSettings) -> EngineResult<Self>
    where
        F: FnOnce() -> EngineResult<Box<dyn GraphEngine>> + Send + 'static,
    {
        let (jobs_tx, jobs_rx) = mpsc::channel::<BrokerMessage>();
        let (ready_tx, ready_rx) = mpsc::channel::<EngineResult<()>>();

        let thread = thread::Builder::new()
            .name(ENGINE_THREAD_NAME.to_string())
            .spawn(move || {
                ON_ENGINE_THREAD.with(|flag| flag.set(true));
                let engine = match factory() {
                    Ok(engine) => {
                        let _ = ready_tx.send(Ok(()));
                        engine
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                engine_loop(engine, jobs_rx, settings.tick_interval);
            })
            .map_err(|err| EngineError::Fault(format!("failed to start engine thread: {err}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(EngineError::Fault(
                    "engine factory panicked".to_string(),
                ));
            }
        }

        Ok(Self {
            inner: Arc::new(BrokerInner {
                jobs: jobs_tx,
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Runs `f` on the engine thread and awaits its result.
    pub async fn with_engine<T, F>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&mut dyn GraphEngine) -> EngineResult<T> + Send + 'static,
        T: Send + 'static,
    {
        if on_engine_thread() {
            return Err(EngineError::Reentrant);
        }
        let (tx, rx) = oneshot::channel();
        self.submit(Box::new(move |engine| {
            let _ = tx.send(run_guarded(engine, f));
        }))?;
        rx.await.map_err(|_| EngineError::Unavailable)?
    }

    /// [`with_engine`](Self::with_engine) for native threads outside the
    /// async runtime.
    pub fn with_engine_blocking<T, F>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&mut dyn GraphEngine) -> EngineResult<T> + Send + 'static,
        T: Send + 'static,
    {
        if on_engine_thread() {
            return Err(EngineError::Reentrant);
        }
        let (tx, rx) = mpsc::sync_channel(1);
        self.submit(Box::new(move |engine| {
            let _ = tx.send(run_guarded(engine, f));
        }))?;
        rx.recv().map_err(|_| EngineError::Unavailable)?
    }

    /// Queues `f` without waiting for it. Its result is discarded.
    pub fn dispatch<F>(&self, f: F) -> EngineResult<()>
    where
        F: FnOnce(&mut dyn GraphEngine) + Send + 'static,
    {
        self.submit(Box::new(move |engine| {
            let _ = run_guarded(engine, |engine| {
                f(engine);
                Ok(())
            });
        }))
    }

    /// Stops the engine thread after the jobs already queued, and joins it.
    /// Later calls are no-ops.
    pub fn shutdown(&self) {
        let thread = match self.inner.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(thread) = thread {
            let _ = self.inner.jobs.send(BrokerMessage::Shutdown);
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }

    fn submit(&self, job: Job) -> EngineResult<()> {
        self.inner
            .jobs
            .send(BrokerMessage::Run(job))
            .map_err(|_| EngineError::Unavailable)
    }
}

fn on_engine_thread() -> bool {
    ON_ENGINE_THREAD.with(|flag| flag.get())
}

fn engine_loop(
    mut engine: Box<dyn GraphEngine>,
    jobs: mpsc::Receiver<BrokerMessage>,
    tick_interval: Duration,
) {
    BrokerStarted {
        tick_interval_ms: tick_interval.as_millis() as u64,
    }
    .log();

    let mut jobs_run: u64 = 0;
    let mut last_pump = Instant::now();

    loop {
        let wait = tick_interval.saturating_sub(last_pump.elapsed());
        match jobs.recv_timeout(wait) {
            Ok(BrokerMessage::Run(job)) => {
                job(engine.as_mut());
                jobs_run += 1;
                if last_pump.elapsed() >= tick_interval {
                    pump_guarded(engine.as_mut());
                    last_pump = Instant::now();
                }
            }
            Ok(BrokerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                pump_guarded(engine.as_mut());
                last_pump = Instant::now();
            }
        }
    }

    drop(engine);
    BrokerStopped { jobs_run }.log();
}

fn run_guarded<T, F>(engine: &mut dyn GraphEngine, f: F) -> EngineResult<T>
where
    F: FnOnce(&mut dyn GraphEngine) -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(|| f(engine))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            JobPanicked { message: &message }.log();
            Err(EngineError::Fault(format!("engine job panicked: {message}")))
        }
    }
}

fn pump_guarded(engine: &mut dyn GraphEngine) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| engine.pump())) {
        let message = panic_message(payload.as_ref());
        JobPanicked { message: &message }.log();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::StubEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stub_broker() -> (RuntimeBroker, crate::backends::stub::StubProbe) {
        let engine = StubEngine::new();
        let probe = engine.probe();
        let broker = RuntimeBroker::spawn(
            move || Ok(Box::new(engine) as Box<dyn GraphEngine>),
            BrokerSettings {
                tick_interval: Duration::from_millis(5),
            },
        )
        .unwrap();
        (broker, probe)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_jobs_never_overlap() {
        let (broker, _probe) = stub_broker();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let broker = broker.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    let active = active.clone();
                    let max_seen = max_seen.clone();
                    broker
                        .with_engine(move |_engine| {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_micros(200));
                            active.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        broker.shutdown();
    }

    #[tokio::test]
    async fn test_reentrant_access_is_reported() {
        let (broker, _probe) = stub_broker();
        let inner = broker.clone();

        let nested = broker
            .with_engine(move |_engine| Ok(inner.with_engine_blocking(|_| Ok(1u32))))
            .await
            .unwrap();

        assert_eq!(nested, Err(EngineError::Reentrant));
        broker.shutdown();
    }

    #[tokio::test]
    async fn test_panic_becomes_fault_and_thread_survives() {
        let (broker, _probe) = stub_broker();

        let result: EngineResult<()> = broker
            .with_engine(|_engine| panic!("graph exploded"))
            .await;
        match result {
            Err(EngineError::Fault(message)) => assert!(message.contains("graph exploded")),
            other => panic!("expected fault, got {other:?}"),
        }

        let value = broker.with_engine(|_engine| Ok(7)).await.unwrap();
        assert_eq!(value, 7);
        broker.shutdown();
    }

    #[tokio::test]
    async fn test_idle_engine_is_pumped() {
        let (broker, probe) = stub_broker();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(probe.pump_count() > 0);
        broker.shutdown();
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_are_unavailable() {
        let (broker, _probe) = stub_broker();
        broker.shutdown();
        broker.shutdown();

        let result = broker.with_engine(|_engine| Ok(())).await;
        assert_eq!(result, Err(EngineError::Unavailable));
        assert_eq!(
            broker.dispatch(|_engine| {}),
            Err(EngineError::Unavailable)
        );
    }

    #[test]
    fn test_factory_error_is_returned() {
        let result = RuntimeBroker::spawn(
            || Err(EngineError::Fault("no engine".into())),
            BrokerSettings::default(),
        );
        assert!(matches!(result, Err(EngineError::Fault(m)) if m == "no engine"));
    }

    #[test]
    fn test_blocking_access_from_native_thread() {
        let (broker, _probe) = stub_broker();
        let worker = {
            let broker = broker.clone();
            thread::spawn(move || broker.with_engine_blocking(|_engine| Ok("done")))
        };
        assert_eq!(worker.join().unwrap(), Ok("done"));
        broker.shutdown();
    }
}
