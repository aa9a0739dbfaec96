use std::sync::Arc;
use std::time::Duration;

use crate::clock::SessionClock;
use crate::config::MonitorConfig;
use crate::device::{DeviceStreamManager, MediaProvider};
use crate::level::{LevelMonitor, SignalSource, SpectrumAnalyzer};
use crate::schedule::Scheduler;

use super::config::TaskConfig;
use super::controller::TaskSessionController;

#[derive(Clone)]
enum SignalSupply {
    /// Fresh analyzer per controller (smoothing state is per stream)
    Analyzer(MonitorConfig),
    /// One shared source for every controller
    Shared(Arc<dyn SignalSource>),
}

/// Collaborators shared by every task session: platform provider, scheduler
/// and signal source. Builds one independent controller per task.
#[derive(Clone)]
pub struct SessionEngine {
    provider: Arc<dyn MediaProvider>,
    scheduler: Arc<dyn Scheduler>,
    signal: SignalSupply,
    level_period: Duration,
}

impl SessionEngine {
    pub fn new(
        provider: Arc<dyn MediaProvider>,
        scheduler: Arc<dyn Scheduler>,
        monitor: &MonitorConfig,
    ) -> Self {
        Self {
            provider,
            scheduler,
            signal: SignalSupply::Analyzer(monitor.clone()),
            level_period: Duration::from_millis(monitor.tick_ms.max(1)),
        }
    }

    /// Use `source` for every controller instead of a per-stream analyzer
    pub fn with_signal_source(mut self, source: Arc<dyn SignalSource>) -> Self {
        self.signal = SignalSupply::Shared(source);
        self
    }

    pub fn provider(&self) -> &Arc<dyn MediaProvider> {
        &self.provider
    }

    /// A level monitor with its own signal source (fresh analyzer state)
    pub fn level_monitor(&self) -> LevelMonitor {
        let source: Arc<dyn SignalSource> = match &self.signal {
            SignalSupply::Analyzer(config) => Arc::new(SpectrumAnalyzer::new(config)),
            SignalSupply::Shared(source) => Arc::clone(source),
        };
        LevelMonitor::new(Arc::clone(&self.scheduler), source, self.level_period)
    }

    /// New controller for `task`, owning its own device manager, level
    /// monitor and clock
    pub fn controller(&self, task: TaskConfig) -> TaskSessionController {
        TaskSessionController::new(
            task,
            DeviceStreamManager::new(Arc::clone(&self.provider)),
            self.level_monitor(),
            SessionClock::new(Arc::clone(&self.scheduler)),
        )
    }
}
