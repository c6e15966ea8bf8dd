//! Wires the stages together and supervises a run.

use crate::broker::BrokerConnection;
use crate::core::clock::{Clock, SystemClock};
use crate::counters::{PipelineCounters, SharedCounters};
use crate::error::PipelineError;
use crate::pipeline::shutdown::Shutdown;
use crate::pipeline::sink::PublishStage;
use crate::pipeline::source::{SourceInput, SourceStage};
use crate::pipeline::stage::{self, conduit, Stage, StageReport};
use crate::pipeline::transform::WeatherStage;
use crate::weather::{SynthesisTable, Synthesizer, TopicBuilder};
use crossbeam_channel::{select, unbounded, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info};

/// A source → transform → publish pipeline, ready to run once.
pub struct Pipeline<B> {
    source: SourceInput,
    broker: B,
    topics: TopicBuilder,
    table: SynthesisTable,
    clock: Arc<dyn Clock>,
    counters: SharedCounters,
}

impl<B: BrokerConnection + 'static> Pipeline<B> {
    pub fn new(source: SourceInput, broker: B) -> Self {
        Self {
            source,
            broker,
            topics: TopicBuilder::default(),
            table: SynthesisTable::default(),
            clock: Arc::new(SystemClock),
            counters: Arc::new(PipelineCounters::new()),
        }
    }

    pub fn with_topics(mut self, topics: TopicBuilder) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_synthesis_table(mut self, table: SynthesisTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Counters updated by the stages during [`Pipeline::run`].
    pub fn counters(&self) -> SharedCounters {
        Arc::clone(&self.counters)
    }

    /// Run until the source ends, `shutdown` is triggered, or a stage fails.
    ///
    /// A stage failure triggers `shutdown` for everyone else. All stage
    /// threads are joined before returning; the first failure is returned.
    pub fn run(self, shutdown: &Shutdown) -> Result<(), PipelineError> {
        let (readings_tx, readings_rx) = conduit();
        let (messages_tx, messages_rx) = conduit();
        let (reports_tx, reports_rx) = unbounded();

        let synthesizer = Synthesizer::new(&self.table, self.clock);
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(PublishStage::new(
                messages_rx,
                self.broker,
                Arc::clone(&self.counters),
            )),
            Box::new(WeatherStage::new(
                readings_rx,
                messages_tx,
                self.topics,
                synthesizer,
                Arc::clone(&self.counters),
            )),
            Box::new(SourceStage::new(
                self.source,
                readings_tx,
                Arc::clone(&self.counters),
            )),
        ];

        let mut handles: Vec<(&'static str, JoinHandle<()>)> = Vec::with_capacity(stages.len());
        for stage in stages {
            match stage::spawn(stage, shutdown.clone(), reports_tx.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!(error = %e, "Failed to start pipeline");
                    shutdown.trigger();
                    join_all(handles);
                    return Err(e);
                }
            }
        }
        drop(reports_tx);
        info!("Pipeline running");

        let mut failure = supervise(&reports_rx, shutdown);

        if let Some(panicked) = join_all(handles) {
            failure.get_or_insert(panicked);
        }

        match failure {
            Some(e) => Err(e),
            None => {
                info!("Pipeline stopped");
                Ok(())
            }
        }
    }
}

/// Collect stage reports until every stage has finished.
///
/// Returns the first failure. A failure triggers `shutdown`.
fn supervise(reports: &Receiver<StageReport>, shutdown: &Shutdown) -> Option<PipelineError> {
    let mut failure = None;
    let mut record = |report: StageReport| {
        if let Err(e) = report.result {
            if !shutdown.is_triggered() {
                error!(stage = report.stage, error = %e, "Stage failed, shutting down pipeline");
                shutdown.trigger();
            }
            failure.get_or_insert(e);
        }
    };

    loop {
        select! {
            recv(reports) -> report => match report {
                Ok(report) => record(report),
                // Every stage has reported
                Err(_) => break,
            },
            recv(shutdown.signal()) -> _ => {
                info!("Shutdown requested, waiting for stages");
                for report in reports.iter() {
                    record(report);
                }
                break;
            }
        }
    }

    failure
}

/// Join every stage thread. Returns an error for the first one that panicked.
fn join_all(handles: Vec<(&'static str, JoinHandle<()>)>) -> Option<PipelineError> {
    let mut panicked = None;
    for (name, handle) in handles {
        if handle.join().is_err() {
            error!(stage = name, "Stage panicked");
            panicked.get_or_insert(PipelineError::StagePanicked(name));
        }
    }
    panicked
}
