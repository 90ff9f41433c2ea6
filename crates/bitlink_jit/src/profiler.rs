//! Compilation profiling for tracking what lazy compilation costs

use std::collections::VecDeque;
use std::time::Duration;

use ahash::AHashMap;
use bitlink_symbol::ContextId;
use parking_lot::RwLock;

/// Compilation event
#[derive(Debug, Clone)]
pub struct CompilationEvent {
    /// Module name
    pub module: String,

    /// Context the module was compiled for
    pub context: ContextId,

    /// Compilation duration
    pub duration: Duration,

    /// Timestamp
    pub timestamp_ms: u64,
}

/// Per-module compilation statistics, summed over every context
#[derive(Debug, Clone)]
pub struct ModuleCompilationStats {
    pub module: String,

    /// Number of times compiled
    pub compilation_count: u64,

    /// Total compilation time (microseconds)
    pub total_time_us: u64,

    /// Minimum compilation time (microseconds)
    pub min_time_us: u64,

    /// Maximum compilation time (microseconds)
    pub max_time_us: u64,
}

impl ModuleCompilationStats {
    pub fn new(module: String) -> Self {
        Self {
            module,
            compilation_count: 0,
            total_time_us: 0,
            min_time_us: u64::MAX,
            max_time_us: 0,
        }
    }

    pub fn record_compilation(&mut self, duration_us: u64) {
        self.compilation_count += 1;
        self.total_time_us += duration_us;
        self.min_time_us = self.min_time_us.min(duration_us);
        self.max_time_us = self.max_time_us.max(duration_us);
    }

    /// Get average compilation time (microseconds)
    pub fn avg_time_us(&self) -> f64 {
        if self.compilation_count == 0 {
            0.0
        } else {
            self.total_time_us as f64 / self.compilation_count as f64
        }
    }
}

/// Compilation profiler
pub struct CompilationProfiler {
    module_stats: RwLock<AHashMap<String, ModuleCompilationStats>>,
    event_history: RwLock<VecDeque<CompilationEvent>>,
    max_history_size: usize,
}

impl CompilationProfiler {
    pub fn new() -> Self {
        Self::with_history_size(1000)
    }

    pub fn with_history_size(max_history_size: usize) -> Self {
        Self {
            module_stats: RwLock::new(AHashMap::new()),
            event_history: RwLock::new(VecDeque::new()),
            max_history_size,
        }
    }

    /// Record a completed compilation
    pub fn record_compilation(&self, context: ContextId, module: &str, duration: Duration) {
        let duration_us = duration.as_micros() as u64;

        self.module_stats
            .write()
            .entry(module.to_string())
            .or_insert_with(|| ModuleCompilationStats::new(module.to_string()))
            .record_compilation(duration_us);

        let mut history = self.event_history.write();
        if self.max_history_size > 0 && history.len() >= self.max_history_size {
            history.pop_front();
        }
        history.push_back(CompilationEvent {
            module: module.to_string(),
            context,
            duration,
            timestamp_ms: current_time_ms(),
        });
    }

    /// How many times `module` has been compiled, across all contexts
    pub fn compile_count(&self, module: &str) -> u64 {
        self.module_stats
            .read()
            .get(module)
            .map(|stats| stats.compilation_count)
            .unwrap_or(0)
    }

    /// How many times `module` has been compiled for `context`, as far as the
    /// retained history reaches
    pub fn compile_count_in(&self, context: ContextId, module: &str) -> u64 {
        self.event_history
            .read()
            .iter()
            .filter(|event| event.context == context && event.module == module)
            .count() as u64
    }

    pub fn get_module_stats(&self, module: &str) -> Option<ModuleCompilationStats> {
        self.module_stats.read().get(module).cloned()
    }

    pub fn get_all_module_stats(&self) -> Vec<ModuleCompilationStats> {
        let mut stats: Vec<_> = self.module_stats.read().values().cloned().collect();
        stats.sort_by(|a, b| a.module.cmp(&b.module));
        stats
    }

    /// Get compilation event history, oldest first
    pub fn get_event_history(&self) -> Vec<CompilationEvent> {
        self.event_history.read().iter().cloned().collect()
    }

    pub fn total_compilations(&self) -> u64 {
        self.module_stats
            .read()
            .values()
            .map(|stats| stats.compilation_count)
            .sum()
    }

    pub fn total_compilation_time(&self) -> Duration {
        let total_us: u64 = self
            .module_stats
            .read()
            .values()
            .map(|stats| stats.total_time_us)
            .sum();
        Duration::from_micros(total_us)
    }

    /// Clear all statistics
    pub fn clear(&self) {
        self.module_stats.write().clear();
        self.event_history.write().clear();
    }
}

impl Default for CompilationProfiler {
    fn default() -> Self {
        Self::new()
    }
}

fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
