use std::fmt;
use std::sync::Arc;

use bitlink_ffi::{NativeAddress, NativeBackend};
use bitlink_jit::LazyCompiler;
use bitlink_symbol::{CallableUnit, ContextId, Value};
use parking_lot::Mutex;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::BridgeError;
use crate::globals::{self, GlobalValues};

/// Where a resolved symbol lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAddress {
    Native(NativeAddress),
    /// Dispatched through the module's compiled unit in the calling context.
    Bitcode,
}

/// A symbol returned by `dlsym`/`lookup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRef {
    pub library: String,
    pub name: String,
    pub address: CallAddress,
}

impl SymbolRef {
    pub fn is_native(&self) -> bool {
        matches!(self.address, CallAddress::Native(_))
    }
}

/// Resolved call target cached at a call site.
#[derive(Clone)]
pub enum CallTarget {
    Native(NativeAddress),
    Compiled(Arc<dyn CallableUnit>),
}

impl fmt::Debug for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallTarget::Native(address) => write!(f, "Native({:#x})", address.as_usize()),
            CallTarget::Compiled(unit) => write!(f, "Compiled({})", unit.module_name()),
        }
    }
}

/// Per call site cache of the resolved target, valid for one context.
#[derive(Default)]
pub struct CallSite {
    cache: Mutex<Option<(ContextId, CallTarget)>>,
}

impl CallSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached target, if it was resolved in `context`.
    pub fn cached(&self, context: ContextId) -> Option<CallTarget> {
        match &*self.cache.lock() {
            Some((cached, target)) if *cached == context => Some(target.clone()),
            _ => None,
        }
    }

    pub fn cached_context(&self) -> Option<ContextId> {
        self.cache.lock().as_ref().map(|(context, _)| *context)
    }

    fn store(&self, context: ContextId, target: CallTarget) {
        *self.cache.lock() = Some((context, target));
    }
}

/// Everything a call needs: the symbol and the cache of its call site.
pub struct CallInfo {
    symbol: SymbolRef,
    site: CallSite,
}

impl CallInfo {
    pub fn new(symbol: SymbolRef) -> Self {
        Self {
            symbol,
            site: CallSite::new(),
        }
    }

    pub fn bitcode(library: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(SymbolRef {
            library: library.into(),
            name: name.into(),
            address: CallAddress::Bitcode,
        })
    }

    pub fn native(
        library: impl Into<String>,
        name: impl Into<String>,
        address: NativeAddress,
    ) -> Self {
        Self::new(SymbolRef {
            library: library.into(),
            name: name.into(),
            address: CallAddress::Native(address),
        })
    }

    pub fn symbol(&self) -> &SymbolRef {
        &self.symbol
    }

    pub fn library(&self) -> &str {
        &self.symbol.library
    }

    pub fn name(&self) -> &str {
        &self.symbol.name
    }

    pub fn site(&self) -> &CallSite {
        &self.site
    }
}

impl From<SymbolRef> for CallInfo {
    fn from(symbol: SymbolRef) -> Self {
        Self::new(symbol)
    }
}

impl fmt::Debug for CallInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallInfo")
            .field("symbol", &self.symbol)
            .field("cached", &self.site.cached_context())
            .finish()
    }
}

/// Chooses between the native and the compiled path for each call.
pub struct Dispatcher {
    compiler: Arc<LazyCompiler>,
    native: Arc<dyn NativeBackend>,
    globals: GlobalValues,
}

impl Dispatcher {
    pub fn new(
        compiler: Arc<LazyCompiler>,
        native: Arc<dyn NativeBackend>,
        globals: GlobalValues,
    ) -> Self {
        Self {
            compiler,
            native,
            globals,
        }
    }

    pub fn globals(&self) -> &GlobalValues {
        &self.globals
    }

    pub(crate) fn set_globals(&mut self, globals: GlobalValues) {
        self.globals = globals;
    }

    pub fn invoke(
        &self,
        call: &CallInfo,
        args: &[Value],
        ctx: &ExecutionContext,
    ) -> Result<Value, BridgeError> {
        ctx.ensure_live()?;
        match self.resolve(call, ctx)? {
            CallTarget::Native(address) => Ok(self.native.invoke(address, call.name(), args)?),
            CallTarget::Compiled(unit) => {
                globals::ensure_initialized(ctx, &self.globals, &self.compiler)?;
                Ok(unit.invoke(call.name(), args)?)
            }
        }
    }

    pub fn invoke_void(
        &self,
        call: &CallInfo,
        args: &[Value],
        ctx: &ExecutionContext,
    ) -> Result<(), BridgeError> {
        self.invoke(call, args, ctx).map(|_| ())
    }

    /// Resolve the target of `call` in `ctx`, going through the call site cache.
    pub fn resolve(&self, call: &CallInfo, ctx: &ExecutionContext) -> Result<CallTarget, BridgeError> {
        if let Some(target) = call.site.cached(ctx.id()) {
            return Ok(target);
        }
        if let Some(stale) = call.site.cached_context() {
            debug!(
                symbol = %call.name(),
                stale = %stale,
                context = %ctx.id(),
                "call site cache invalidated"
            );
        }

        let target = match call.symbol.address {
            CallAddress::Native(address) => CallTarget::Native(address),
            CallAddress::Bitcode => CallTarget::Compiled(self.compiled_unit(call, ctx)?),
        };
        call.site.store(ctx.id(), target.clone());
        Ok(target)
    }

    fn compiled_unit(
        &self,
        call: &CallInfo,
        ctx: &ExecutionContext,
    ) -> Result<Arc<dyn CallableUnit>, BridgeError> {
        let table = ctx.table();
        let missing = || BridgeError::MissingSymbol {
            library: call.library().to_string(),
            symbol: call.name().to_string(),
        };

        let entry = table
            .get_in_library(call.library(), call.name())
            .ok_or_else(missing)?;
        self.compiler
            .ensure_compiled(table, call.name(), true)
            .map_err(|err| BridgeError::from_jit(call.library(), err))?;
        Ok(self.compiler.compile_entry(table, call.name(), &entry)?)
    }
}
