use std::collections::HashSet;
use std::sync::Arc;

use bitlink_config::BridgeConfig;
use bitlink_symbol::{CallableUnit, SymbolEntry, SymbolTable};
use bitlink_utils::Stopwatch;
use tracing::{debug, info};

use crate::error::{CompileError, JitError};
use crate::profiler::CompilationProfiler;
use crate::service::CompileService;

/// Compiles modules on first need and resolves their imports.
///
/// The compiler holds no per-context state: everything it touches lives in the
/// [`SymbolTable`] passed to each call, and the compile lock is the entry itself.
pub struct LazyCompiler {
    service: Arc<dyn CompileService>,
    profiler: Arc<CompilationProfiler>,
    config: BridgeConfig,
}

struct Pending {
    symbol: String,
    entry: Arc<SymbolEntry>,
    init: bool,
}

impl LazyCompiler {
    pub fn new(service: Arc<dyn CompileService>, config: &BridgeConfig) -> Self {
        Self::with_profiler(service, config, Arc::new(CompilationProfiler::new()))
    }

    pub fn with_profiler(
        service: Arc<dyn CompileService>,
        config: &BridgeConfig,
        profiler: Arc<CompilationProfiler>,
    ) -> Self {
        Self {
            service,
            profiler,
            config: config.clone(),
        }
    }

    pub fn profiler(&self) -> &Arc<CompilationProfiler> {
        &self.profiler
    }

    /// Make sure the module exporting `symbol` is compiled in the context owning
    /// `table`, together with everything it imports.
    ///
    /// An unknown symbol is only an error when `required` is set. Imports not present
    /// in the table are left to the native side. When `symbol` is an initialization
    /// entry point, imports provided by its own library are not followed; they are
    /// compiled when first looked up or called.
    ///
    /// The import walk runs even when the root is already compiled: the root may have
    /// been compiled by a caller that is still working through its imports, or whose
    /// walk stopped at a failing import.
    pub fn ensure_compiled(
        &self,
        table: &SymbolTable,
        symbol: &str,
        required: bool,
    ) -> Result<(), JitError> {
        let Some(root) = table.get(symbol) else {
            if required {
                return Err(JitError::MissingSymbol {
                    symbol: symbol.to_string(),
                });
            }
            return Ok(());
        };

        let mut visited = HashSet::new();
        let mut worklist = vec![Pending {
            symbol: symbol.to_string(),
            init: self.config.is_init_symbol(symbol),
            entry: root,
        }];

        while let Some(pending) = worklist.pop() {
            if !visited.insert(Arc::as_ptr(&pending.entry)) {
                continue;
            }
            self.compile_entry(table, &pending.symbol, &pending.entry)?;

            for import in pending.entry.module().imports() {
                let Some(dependency) = table.get(import) else {
                    debug!(symbol = %import, "import not in bitcode, left to native resolution");
                    continue;
                };
                if pending.init && dependency.library() == pending.entry.library() {
                    continue;
                }
                if visited.contains(&Arc::as_ptr(&dependency)) {
                    continue;
                }
                worklist.push(Pending {
                    symbol: import.clone(),
                    init: self.config.is_init_symbol(import),
                    entry: dependency,
                });
            }
        }
        Ok(())
    }

    /// Compile a single entry without following imports, returning its unit.
    pub fn compile_entry(
        &self,
        table: &SymbolTable,
        symbol: &str,
        entry: &SymbolEntry,
    ) -> Result<Arc<dyn CallableUnit>, CompileError> {
        let context = table.context();
        let (unit, _) = entry.get_or_compile(|module| {
            info!(
                module = %module.name(),
                library = %entry.library(),
                symbol,
                %context,
                "compiling"
            );
            let stopwatch = Stopwatch::start_new();
            let unit = self.service.compile(context, module)?;
            let elapsed = stopwatch.elapsed();
            self.profiler
                .record_compilation(context, module.name(), elapsed);
            debug!(
                module = %module.name(),
                %context,
                seconds = stopwatch.elapsed_secs(),
                "compiled"
            );
            Ok(unit)
        })?;
        Ok(unit)
    }
}
