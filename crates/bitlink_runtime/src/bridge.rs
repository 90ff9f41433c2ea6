use std::path::Path;
use std::sync::Arc;

use bitlink_config::BridgeConfig;
use bitlink_ffi::{LibloadingBackend, LibraryHandle, ModuleLoader, NativeBackend};
use bitlink_jit::{CompilationProfiler, CompileService, LazyCompiler};
use bitlink_symbol::Value;

use crate::context::ExecutionContext;
use crate::dispatch::{CallInfo, Dispatcher, SymbolRef};
use crate::error::BridgeError;
use crate::globals::GlobalValues;
use crate::lifecycle::ContextManager;

/// The host-facing entry point of the dual-backend linker.
///
/// A bridge is shared by every execution context of the process. All per-context
/// state is reached through the `&ExecutionContext` passed to each call.
pub struct Bridge {
    pub(crate) config: BridgeConfig,
    pub(crate) loader: Arc<ModuleLoader>,
    pub(crate) compiler: Arc<LazyCompiler>,
    pub(crate) native: Arc<dyn NativeBackend>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) contexts: ContextManager,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        service: Arc<dyn CompileService>,
        native: Arc<dyn NativeBackend>,
    ) -> Self {
        let loader = Arc::new(ModuleLoader::new(config.clone(), Arc::clone(&native)));
        let compiler = Arc::new(LazyCompiler::new(service, &config));
        let dispatcher = Dispatcher::new(
            Arc::clone(&compiler),
            Arc::clone(&native),
            GlobalValues::new(),
        );
        let contexts = ContextManager::new(Arc::clone(&loader), Arc::clone(&native));
        Self {
            config,
            loader,
            compiler,
            native,
            dispatcher,
            contexts,
        }
    }

    /// Bridge over the platform dynamic loader, configured from the environment.
    pub fn from_env(service: Arc<dyn CompileService>) -> Self {
        Self::new(
            BridgeConfig::from_env(),
            service,
            Arc::new(LibloadingBackend::new()),
        )
    }

    /// Initial values of the base library's global slots, applied once per context
    /// before its first compiled call.
    pub fn with_globals(mut self, globals: GlobalValues) -> Self {
        self.dispatcher.set_globals(globals);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn profiler(&self) -> &Arc<CompilationProfiler> {
        self.compiler.profiler()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Create an isolated context with the base library registered.
    pub fn create_context(&self) -> Result<ExecutionContext, BridgeError> {
        let ctx = ExecutionContext::isolated();
        self.contexts.on_context_created(&ctx, None)?;
        Ok(ctx)
    }

    /// Create a read-only fork of `parent`.
    pub fn fork_context(&self, parent: &ExecutionContext) -> Result<ExecutionContext, BridgeError> {
        parent.ensure_live()?;
        let ctx = ExecutionContext::fork_of(parent);
        self.contexts.on_context_created(&ctx, Some(parent))?;
        Ok(ctx)
    }

    pub fn destroy_context(&self, ctx: &ExecutionContext) {
        self.contexts.on_context_destroyed(ctx);
    }

    pub fn open(
        &self,
        ctx: &ExecutionContext,
        path: &Path,
        local: bool,
        now: bool,
    ) -> Result<LibraryHandle, BridgeError> {
        self.dlopen(ctx, path, local, now)
    }

    pub fn lookup(
        &self,
        ctx: &ExecutionContext,
        handle: &LibraryHandle,
        name: &str,
    ) -> Result<Option<SymbolRef>, BridgeError> {
        self.dlsym(ctx, handle, name)
    }

    pub fn invoke(
        &self,
        ctx: &ExecutionContext,
        call: &CallInfo,
        args: &[Value],
    ) -> Result<Value, BridgeError> {
        self.dispatcher.invoke(call, args, ctx)
    }

    pub fn invoke_void(
        &self,
        ctx: &ExecutionContext,
        call: &CallInfo,
        args: &[Value],
    ) -> Result<(), BridgeError> {
        self.dispatcher.invoke_void(call, args, ctx)
    }

    pub fn close(&self, handle: &LibraryHandle) -> i32 {
        self.dlclose(handle)
    }
}
