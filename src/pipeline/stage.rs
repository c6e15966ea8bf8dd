//! Stage abstraction and the cancellable conduit operations stages share.
//!
//! Every blocking wait a stage performs goes through [`receive`] or
//! [`forward`], which race the conduit against the shutdown signal. Shutdown
//! is re-checked after every wake-up so it wins over ready input.

use crate::error::PipelineError;
use crate::pipeline::shutdown::Shutdown;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// A worker with at most one inbound and one outbound conduit.
///
/// A stage owns both conduit ends, so returning from [`Stage::run`] closes
/// its output and propagates termination downstream.
pub trait Stage: Send {
    fn name(&self) -> &'static str;

    /// Process items until input ends or shutdown is signalled.
    fn run(self: Box<Self>, shutdown: &Shutdown) -> Result<(), PipelineError>;
}

/// Completion notice sent by every stage thread.
#[derive(Debug)]
pub struct StageReport {
    pub stage: &'static str,
    pub result: Result<(), PipelineError>,
}

/// An unbuffered rendezvous channel between two stages.
pub fn conduit<T>() -> (Sender<T>, Receiver<T>) {
    bounded(0)
}

/// Outcome of waiting for the next inbound item.
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    Item(T),
    /// The upstream stage finished.
    Closed,
    Cancelled,
}

/// Outcome of handing an item downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forward {
    Delivered,
    /// The downstream stage is gone.
    Closed,
    Cancelled,
}

/// Wait for the next item on `input`, or for shutdown.
pub fn receive<T>(input: &Receiver<T>, shutdown: &Shutdown) -> Received<T> {
    if shutdown.is_triggered() {
        return Received::Cancelled;
    }

    select! {
        recv(input) -> msg => {
            if shutdown.is_triggered() {
                return Received::Cancelled;
            }
            match msg {
                Ok(item) => Received::Item(item),
                Err(_) => Received::Closed,
            }
        }
        recv(shutdown.signal()) -> _ => Received::Cancelled,
    }
}

/// Hand `item` to the next stage, giving up if shutdown is signalled first.
pub fn forward<T>(output: &Sender<T>, item: T, shutdown: &Shutdown) -> Forward {
    if shutdown.is_triggered() {
        return Forward::Cancelled;
    }

    select! {
        send(output, item) -> res => match res {
            Ok(()) => Forward::Delivered,
            Err(_) => Forward::Closed,
        },
        recv(shutdown.signal()) -> _ => Forward::Cancelled,
    }
}

/// Run `stage` on its own named thread, reporting its result on `reports`.
///
/// A panic inside the stage is reported as [`PipelineError::StagePanicked`],
/// so every stage thread sends exactly one report.
pub fn spawn(
    stage: Box<dyn Stage>,
    shutdown: Shutdown,
    reports: Sender<StageReport>,
) -> Result<(&'static str, JoinHandle<()>), PipelineError> {
    let name = stage.name();

    let handle = thread::Builder::new()
        .name(format!("stage-{name}"))
        .spawn(move || {
            debug!(stage = name, "Stage started");
            let result = panic::catch_unwind(AssertUnwindSafe(|| stage.run(&shutdown)))
                .unwrap_or_else(|_| Err(PipelineError::StagePanicked(name)));
            match &result {
                Ok(()) => info!(stage = name, "Stage finished"),
                Err(e) => error!(stage = name, error = %e, "Stage failed"),
            }
            let _ = reports.send(StageReport {
                stage: name,
                result,
            });
        })?;

    Ok((name, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    #[test]
    fn test_receive_item_and_close() {
        let shutdown = Shutdown::new();
        let (tx, rx) = unbounded();
        tx.send(7).unwrap();
        drop(tx);

        assert_eq!(receive(&rx, &shutdown), Received::Item(7));
        assert_eq!(receive(&rx, &shutdown), Received::Closed);
    }

    #[test]
    fn test_shutdown_wins_over_ready_input() {
        let shutdown = Shutdown::new();
        let (tx, rx) = unbounded();
        tx.send(1).unwrap();

        shutdown.trigger();
        assert_eq!(receive(&rx, &shutdown), Received::Cancelled);
    }

    #[test]
    fn test_receive_unblocks_on_shutdown() {
        let shutdown = Shutdown::new();
        let (_tx, rx) = conduit::<u32>();

        let trigger = shutdown.clone();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.trigger();
        });

        assert_eq!(receive(&rx, &shutdown), Received::Cancelled);
        waker.join().unwrap();
    }

    #[test]
    fn test_forward_rendezvous() {
        let shutdown = Shutdown::new();
        let (tx, rx) = conduit();

        let consumer = thread::spawn(move || rx.recv().unwrap());
        assert_eq!(forward(&tx, "reading", &shutdown), Forward::Delivered);
        assert_eq!(consumer.join().unwrap(), "reading");
    }

    #[test]
    fn test_forward_to_closed_and_cancelled() {
        let shutdown = Shutdown::new();
        let (tx, rx) = conduit::<u8>();
        drop(rx);
        assert_eq!(forward(&tx, 1, &shutdown), Forward::Closed);

        // Nobody ever receives; only shutdown can end the wait.
        let (tx, _rx) = conduit::<u8>();
        let trigger = shutdown.clone();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.trigger();
        });
        assert_eq!(forward(&tx, 2, &shutdown), Forward::Cancelled);
        waker.join().unwrap();
    }

    struct Failing;

    impl Stage for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run(self: Box<Self>, _shutdown: &Shutdown) -> Result<(), PipelineError> {
            Err(PipelineError::StagePanicked("inner"))
        }
    }

    #[test]
    fn test_spawn_reports_result() {
        let (reports_tx, reports_rx) = unbounded();
        let (name, handle) = spawn(Box::new(Failing), Shutdown::new(), reports_tx).unwrap();
        handle.join().unwrap();

        assert_eq!(name, "failing");
        let report = reports_rx.recv().unwrap();
        assert_eq!(report.stage, "failing");
        assert!(report.result.is_err());
    }

    struct Panicking;

    impl Stage for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn run(self: Box<Self>, _shutdown: &Shutdown) -> Result<(), PipelineError> {
            panic!("stage bug");
        }
    }

    #[test]
    fn test_spawn_reports_panic() {
        let (reports_tx, reports_rx) = unbounded();
        let (_, handle) = spawn(Box::new(Panicking), Shutdown::new(), reports_tx).unwrap();
        assert!(handle.join().is_ok());

        let report = reports_rx.recv().unwrap();
        assert_eq!(report.stage, "panicking");
        assert!(matches!(
            report.result,
            Err(PipelineError::StagePanicked("panicking"))
        ));
    }
}
