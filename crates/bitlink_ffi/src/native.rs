use std::collections::HashMap;
use std::ffi::c_void;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use bitlink_symbol::{CallError, Value};
use libloading::Library;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::OpenError;

/// Largest argument count the native calling path supports.
pub const MAX_NATIVE_ARGS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(u64);

impl NativeHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeAddress(usize);

impl NativeAddress {
    pub fn new(address: usize) -> Self {
        Self(address)
    }

    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// The classic dynamic-loading path, used for every library that is not dispatched
/// through its bitcode.
pub trait NativeBackend: Send + Sync {
    fn dlopen(&self, path: &Path, local: bool, now: bool) -> Result<NativeHandle, OpenError>;
    fn dlsym(&self, handle: NativeHandle, name: &str) -> Option<NativeAddress>;
    /// Zero on success, like `dlclose(3)`.
    fn dlclose(&self, handle: NativeHandle) -> i32;
    fn invoke(
        &self,
        address: NativeAddress,
        symbol: &str,
        args: &[Value],
    ) -> Result<Value, CallError>;
}

/// Thin wrapper around a `libloading::Library` with reference counting so handles
/// can be shared across the runtime.
#[derive(Clone)]
pub struct DynamicLibrary {
    inner: Arc<Library>,
}

impl DynamicLibrary {
    pub fn new(library: Library) -> Self {
        Self {
            inner: Arc::new(library),
        }
    }
}

impl Deref for DynamicLibrary {
    type Target = Library;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

struct OpenLibrary {
    path: PathBuf,
    library: DynamicLibrary,
    open_count: usize,
}

#[derive(Default)]
struct LoadedLibraries {
    by_handle: AHashMap<u64, OpenLibrary>,
    by_path: HashMap<PathBuf, u64>,
}

/// [`NativeBackend`] on top of `libloading`.
///
/// Opening the same path twice yields the same handle; the library is unloaded when
/// every open has been matched by a close.
pub struct LibloadingBackend {
    libraries: Mutex<LoadedLibraries>,
    next_id: AtomicU64,
}

impl Default for LibloadingBackend {
    fn default() -> Self {
        Self {
            libraries: Mutex::new(LoadedLibraries::default()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl LibloadingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn library(&self, handle: NativeHandle) -> Option<DynamicLibrary> {
        self.libraries
            .lock()
            .by_handle
            .get(&handle.0)
            .map(|open| open.library.clone())
    }
}

#[cfg(unix)]
fn open_library(path: &Path, local: bool, now: bool) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{
        Library as UnixLibrary, RTLD_GLOBAL, RTLD_LAZY, RTLD_LOCAL, RTLD_NOW,
    };

    let visibility = if local { RTLD_LOCAL } else { RTLD_GLOBAL };
    let binding = if now { RTLD_NOW } else { RTLD_LAZY };
    // SAFETY: running library initializers is inherent to loading native code.
    let library = unsafe { UnixLibrary::open(Some(path), visibility | binding) }?;
    Ok(Library::from(library))
}

#[cfg(not(unix))]
fn open_library(path: &Path, _local: bool, _now: bool) -> Result<Library, libloading::Error> {
    // SAFETY: running library initializers is inherent to loading native code.
    unsafe { Library::new(path) }
}

impl NativeBackend for LibloadingBackend {
    fn dlopen(&self, path: &Path, local: bool, now: bool) -> Result<NativeHandle, OpenError> {
        let mut libraries = self.libraries.lock();
        if let Some(id) = libraries.by_path.get(path).copied() {
            if let Some(open) = libraries.by_handle.get_mut(&id) {
                open.open_count += 1;
                return Ok(NativeHandle(id));
            }
        }

        let library = open_library(path, local, now).map_err(|err| OpenError::Native {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(path = %path.display(), handle = id, "opened native library");

        libraries.by_path.insert(path.to_path_buf(), id);
        libraries.by_handle.insert(
            id,
            OpenLibrary {
                path: path.to_path_buf(),
                library: DynamicLibrary::new(library),
                open_count: 1,
            },
        );
        Ok(NativeHandle(id))
    }

    fn dlsym(&self, handle: NativeHandle, name: &str) -> Option<NativeAddress> {
        let library = self.library(handle)?;
        // SAFETY: the symbol is only read as an address, never dereferenced here.
        let address = unsafe { library.get::<*const c_void>(name.as_bytes()) }
            .map(|symbol| *symbol as usize)
            .ok()?;
        (address != 0).then_some(NativeAddress(address))
    }

    fn dlclose(&self, handle: NativeHandle) -> i32 {
        let mut libraries = self.libraries.lock();
        let Some(open) = libraries.by_handle.get_mut(&handle.0) else {
            return -1;
        };

        open.open_count -= 1;
        if open.open_count == 0 {
            if let Some(closed) = libraries.by_handle.remove(&handle.0) {
                libraries.by_path.remove(&closed.path);
                debug!(path = %closed.path.display(), handle = handle.0, "closed native library");
            }
        }
        0
    }

    fn invoke(
        &self,
        address: NativeAddress,
        symbol: &str,
        args: &[Value],
    ) -> Result<Value, CallError> {
        if address.0 == 0 {
            return Err(CallError::InvalidAddress {
                symbol: symbol.to_string(),
                address: address.0,
            });
        }
        let words = to_words(symbol, args)?;
        // SAFETY: the address came from dlsym on a library that is still open, and the
        // word calling convention is the contract for natively dispatched routines.
        let result = unsafe { call_words(address.0, &words) };
        Ok(Value::Pointer(result))
    }
}

/// Marshal arguments for the word calling convention: every argument and the result
/// travel as one pointer-sized integer.
fn to_words(symbol: &str, args: &[Value]) -> Result<Vec<usize>, CallError> {
    if args.len() > MAX_NATIVE_ARGS {
        return Err(CallError::Arity {
            symbol: symbol.to_string(),
            got: args.len(),
            max: MAX_NATIVE_ARGS,
        });
    }

    args.iter()
        .enumerate()
        .map(|(index, arg)| match arg {
            Value::Int(value) => Ok(*value as usize),
            Value::Pointer(value) => Ok(*value),
            other => Err(CallError::Marshal {
                symbol: symbol.to_string(),
                index,
                kind: other.kind(),
            }),
        })
        .collect()
}

unsafe fn call_words(address: usize, words: &[usize]) -> usize {
    type F0 = unsafe extern "C" fn() -> usize;
    type F1 = unsafe extern "C" fn(usize) -> usize;
    type F2 = unsafe extern "C" fn(usize, usize) -> usize;
    type F3 = unsafe extern "C" fn(usize, usize, usize) -> usize;
    type F4 = unsafe extern "C" fn(usize, usize, usize, usize) -> usize;
    type F5 = unsafe extern "C" fn(usize, usize, usize, usize, usize) -> usize;
    type F6 = unsafe extern "C" fn(usize, usize, usize, usize, usize, usize) -> usize;

    // SAFETY: forwarded from the caller.
    unsafe {
        match *words {
            [] => std::mem::transmute::<usize, F0>(address)(),
            [a] => std::mem::transmute::<usize, F1>(address)(a),
            [a, b] => std::mem::transmute::<usize, F2>(address)(a, b),
            [a, b, c] => std::mem::transmute::<usize, F3>(address)(a, b, c),
            [a, b, c, d] => std::mem::transmute::<usize, F4>(address)(a, b, c, d),
            [a, b, c, d, e] => std::mem::transmute::<usize, F5>(address)(a, b, c, d, e),
            [a, b, c, d, e, f] => std::mem::transmute::<usize, F6>(address)(a, b, c, d, e, f),
            _ => unreachable!("argument count checked by to_words"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitlink_symbol::ValueKind;

    extern "C" fn add3(a: usize, b: usize, c: usize) -> usize {
        a + b + c
    }

    extern "C" fn answer() -> usize {
        42
    }

    #[test]
    fn test_word_marshalling() {
        assert_eq!(
            to_words("f", &[Value::Int(2), Value::Pointer(8)]).unwrap(),
            vec![2, 8]
        );

        let err = to_words("f", &[Value::Int(1), Value::Double(1.0)]).unwrap_err();
        assert_eq!(
            err,
            CallError::Marshal {
                symbol: "f".into(),
                index: 1,
                kind: ValueKind::Double,
            }
        );

        let too_many = vec![Value::Int(0); MAX_NATIVE_ARGS + 1];
        assert!(matches!(
            to_words("f", &too_many),
            Err(CallError::Arity { got: 7, .. })
        ));
    }

    #[test]
    fn test_invoke_in_process_functions() {
        let backend = LibloadingBackend::new();
        let add = NativeAddress::new(add3 as usize);
        let result = backend
            .invoke(add, "add3", &[Value::Int(1), Value::Int(2), Value::Pointer(3)])
            .unwrap();
        assert_eq!(result, Value::Pointer(6));

        let result = backend
            .invoke(NativeAddress::new(answer as usize), "answer", &[])
            .unwrap();
        assert_eq!(result, Value::Pointer(42));
    }

    #[test]
    fn test_null_address_is_rejected() {
        let backend = LibloadingBackend::new();
        let err = backend
            .invoke(NativeAddress::new(0), "nothing", &[])
            .unwrap_err();
        assert!(matches!(err, CallError::InvalidAddress { .. }));
    }

    #[test]
    fn test_open_failure_reports_path() {
        let backend = LibloadingBackend::new();
        let err = backend
            .dlopen(Path::new("/nonexistent/libNothing.so"), true, true)
            .unwrap_err();
        assert!(matches!(err, OpenError::Native { .. }));
        assert!(err.to_string().contains("libNothing.so"));
    }

    #[test]
    fn test_unknown_handles() {
        let backend = LibloadingBackend::new();
        assert_eq!(backend.dlclose(NativeHandle::new(99)), -1);
        assert!(backend.dlsym(NativeHandle::new(99), "f").is_none());
    }
}
