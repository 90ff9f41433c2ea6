//! Shared fixtures: a recording compile service, a scripted native backend and
//! helpers writing library files with embedded modules.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bitlink_config::BridgeConfig;
use bitlink_ffi::{ContainerWriter, NativeAddress, NativeBackend, NativeHandle, OpenError};
use bitlink_jit::{CompileError, CompileService};
use bitlink_runtime::Bridge;
use bitlink_symbol::{CallError, CallableUnit, ContextId, IrKind, Module, Value};
use parking_lot::Mutex;

pub type CallLog = Arc<Mutex<Vec<(ContextId, String, Vec<Value>)>>>;

/// Unit produced by [`RecordingCompiler`]. `add` sums its arguments like the native
/// backend does; every call is logged.
pub struct RecordedUnit {
    context: ContextId,
    module: Arc<Module>,
    calls: CallLog,
}

impl CallableUnit for RecordedUnit {
    fn context(&self) -> ContextId {
        self.context
    }

    fn module_name(&self) -> &str {
        self.module.name()
    }

    fn invoke(&self, symbol: &str, args: &[Value]) -> Result<Value, CallError> {
        if !self.module.exports_symbol(symbol) {
            return Err(CallError::UnknownSymbol {
                symbol: symbol.to_string(),
                module: self.module.name().to_string(),
            });
        }
        self.calls
            .lock()
            .push((self.context, symbol.to_string(), args.to_vec()));
        match symbol {
            "add" => Ok(Value::Pointer(sum_words(args))),
            "explode" => Err(CallError::failed(symbol, "boom")),
            _ => Ok(Value::Str(format!("{}::{symbol}", self.module.name()))),
        }
    }
}

#[derive(Default)]
pub struct RecordingCompiler {
    compiled: Mutex<Vec<(ContextId, String)>>,
    pub calls: CallLog,
    fail: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl RecordingCompiler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn fail_module(&self, module: &str) {
        self.fail.lock().push(module.to_string());
    }

    pub fn compiled(&self) -> Vec<(ContextId, String)> {
        self.compiled.lock().clone()
    }

    pub fn compiled_in(&self, context: ContextId) -> Vec<String> {
        self.compiled
            .lock()
            .iter()
            .filter(|(ctx, _)| *ctx == context)
            .map(|(_, module)| module.clone())
            .collect()
    }

    pub fn compile_count(&self) -> usize {
        self.compiled.lock().len()
    }

    pub fn calls(&self) -> Vec<(ContextId, String, Vec<Value>)> {
        self.calls.lock().clone()
    }
}

impl CompileService for RecordingCompiler {
    fn compile(
        &self,
        context: ContextId,
        module: &Module,
    ) -> Result<Arc<dyn CallableUnit>, CompileError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail.lock().iter().any(|name| name == module.name()) {
            return Err(CompileError::new(module.name(), "invalid IR"));
        }
        self.compiled
            .lock()
            .push((context, module.name().to_string()));
        Ok(Arc::new(RecordedUnit {
            context,
            module: Arc::new(module.clone()),
            calls: Arc::clone(&self.calls),
        }))
    }
}

/// Native backend resolving a fixed set of symbol names in every library.
#[derive(Default)]
pub struct ScriptedNative {
    symbols: Vec<String>,
    opened: Mutex<Vec<PathBuf>>,
    closed: Mutex<Vec<NativeHandle>>,
    pub invoked: Mutex<Vec<(String, Vec<Value>)>>,
    close_status: Mutex<i32>,
}

impl ScriptedNative {
    pub fn with_symbols(symbols: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().clone()
    }

    pub fn closed(&self) -> Vec<NativeHandle> {
        self.closed.lock().clone()
    }

    pub fn invoked(&self) -> Vec<(String, Vec<Value>)> {
        self.invoked.lock().clone()
    }

    pub fn fail_closes_with(&self, status: i32) {
        *self.close_status.lock() = status;
    }
}

impl NativeBackend for ScriptedNative {
    fn dlopen(&self, path: &Path, _local: bool, _now: bool) -> Result<NativeHandle, OpenError> {
        if !path.exists() {
            return Err(OpenError::Native {
                path: path.to_path_buf(),
                message: "no such file".into(),
            });
        }
        let mut opened = self.opened.lock();
        opened.push(path.to_path_buf());
        Ok(NativeHandle::new(opened.len() as u64))
    }

    fn dlsym(&self, _handle: NativeHandle, name: &str) -> Option<NativeAddress> {
        self.symbols
            .iter()
            .position(|symbol| symbol == name)
            .map(|index| NativeAddress::new(0x1000 + index * 0x10))
    }

    fn dlclose(&self, handle: NativeHandle) -> i32 {
        self.closed.lock().push(handle);
        *self.close_status.lock()
    }

    fn invoke(
        &self,
        _address: NativeAddress,
        symbol: &str,
        args: &[Value],
    ) -> Result<Value, CallError> {
        self.invoked.lock().push((symbol.to_string(), args.to_vec()));
        Ok(Value::Pointer(sum_words(args)))
    }
}

fn sum_words(args: &[Value]) -> usize {
    args.iter()
        .map(|arg| match arg {
            Value::Int(value) => *value as usize,
            Value::Pointer(value) => *value,
            _ => 0,
        })
        .sum()
}

pub fn module(name: &str, exports: &[&str], imports: &[&str]) -> Module {
    Module::new(
        name,
        IrKind::Binary,
        exports.iter().map(|s| s.to_string()).collect(),
        imports.iter().map(|s| s.to_string()).collect(),
        format!("; module {name}").into_bytes(),
    )
}

/// Write `file` into `dir`: some native bytes followed by `modules`.
pub fn write_library(dir: &Path, file: &str, modules: &[Module]) -> PathBuf {
    let path = dir.join(file);
    let mut writer = ContainerWriter::new();
    writer.raw(b"\x7fELF native section");
    for module in modules {
        writer.module(module).unwrap();
    }
    writer.write_to(&path).unwrap();
    path
}

/// `libFoo` as in the init-boundary scenario, plus `libExt` providing `extLib_util`.
pub struct FooFixture {
    pub dir: tempfile::TempDir,
    pub foo: PathBuf,
    pub ext: PathBuf,
}

pub fn foo_fixture() -> FooFixture {
    let dir = tempfile::tempdir().unwrap();
    let foo = write_library(
        dir.path(),
        "libFoo.so",
        &[
            module("initFoo", &["init_libFoo"], &["doWork", "extLib_util"]),
            module("helperFoo", &["doWork", "add", "explode"], &[]),
        ],
    );
    let ext = write_library(
        dir.path(),
        "libExt.so",
        &[module("extUtil", &["extLib_util"], &[])],
    );
    FooFixture { dir, foo, ext }
}

pub fn bridge(
    libs: &[&str],
    compiler: &Arc<RecordingCompiler>,
    native: &Arc<ScriptedNative>,
) -> Bridge {
    Bridge::new(
        BridgeConfig::with_bitcode_libs(libs.iter().copied()),
        compiler.clone(),
        native.clone(),
    )
}

/// Base library exporting `X` and the global setters.
pub fn write_base(dir: &Path) -> PathBuf {
    write_library(
        dir,
        "libbase.so",
        &[
            module("baseX", &["X"], &[]),
            module(
                "baseVars",
                &[
                    "bitlink_initvar_obj",
                    "bitlink_initvar_double",
                    "bitlink_initvar_int",
                ],
                &[],
            ),
        ],
    )
}
