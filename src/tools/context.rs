//! Collaborators shared by every tool handler.

use crate::analysis::{AnalysisStrategy, SimulatedAnalysis};
use crate::instrument::{Instrument, SimulatedInstrument};
use crate::streams::StreamSessionManager;
use crate::types::Config;
use crate::workflows::{SimulatedWorkflowExecutor, WorkflowExecutor, WorkflowValidator};
use std::fmt;
use std::sync::Arc;

/// Everything a handler may touch. Cheap to clone.
#[derive(Clone)]
pub struct ToolContext {
    pub instrument: Arc<dyn Instrument>,
    pub analysis: Arc<dyn AnalysisStrategy>,
    pub streams: Arc<StreamSessionManager>,
    pub workflows: WorkflowValidator,
    pub executor: Arc<dyn WorkflowExecutor>,
    /// `(width, height)` of frames returned by `get_stream_frame`.
    pub frame_size: (usize, usize),
}

impl ToolContext {
    /// Context around the given instrument with simulated analysis and
    /// workflow execution.
    pub fn new(config: &Config, instrument: Arc<dyn Instrument>) -> Self {
        Self {
            instrument,
            analysis: Arc::new(SimulatedAnalysis::new()),
            streams: Arc::new(StreamSessionManager::new(config.streams.clone())),
            workflows: WorkflowValidator::default(),
            executor: Arc::new(SimulatedWorkflowExecutor),
            frame_size: (config.instrument.frame_width, config.instrument.frame_height),
        }
    }

    /// Fully simulated context, runnable without hardware.
    pub fn simulated(config: &Config) -> Self {
        Self::new(config, Arc::new(SimulatedInstrument::new(&config.instrument)))
    }

    pub fn with_analysis(mut self, analysis: Arc<dyn AnalysisStrategy>) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn WorkflowExecutor>) -> Self {
        self.executor = executor;
        self
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("streams", &self.streams)
            .field("workflows", &self.workflows)
            .field("frame_size", &self.frame_size)
            .finish_non_exhaustive()
    }
}
