//! Package loading: init hooks, the per-context loaded list and teardown.

mod common;

use bitlink_runtime::{BridgeError, LibraryHandle, NativeHandle, Value};
use common::{RecordingCompiler, ScriptedNative, bridge, foo_fixture, write_library};

#[test]
fn bitcode_package_runs_its_init_entry_point() {
    let fixture = foo_fixture();
    let compiler = RecordingCompiler::new();
    let native = ScriptedNative::with_symbols(&[]);
    let bridge = bridge(&["libFoo", "libExt"], &compiler, &native);
    let ctx = bridge.create_context().unwrap();

    bridge.load_package(&ctx, &fixture.ext, true, true).unwrap();
    let foo = bridge.load_package(&ctx, &fixture.foo, true, true).unwrap();
    assert_eq!(foo.name, "libFoo");
    assert_eq!(foo.handle, LibraryHandle::Bridge("libFoo".into()));

    let init_calls: Vec<_> = compiler
        .calls()
        .into_iter()
        .filter(|(_, symbol, _)| symbol == "init_libFoo")
        .map(|(_, _, args)| args)
        .collect();
    assert_eq!(init_calls, vec![vec![Value::Str("libFoo".into())]]);
    assert_eq!(ctx.table().is_compiled("doWork"), Some(false));

    // loading the same path again is a no-op
    let again = bridge.load_package(&ctx, &fixture.foo, true, true).unwrap();
    assert_eq!(again, foo);
    assert_eq!(bridge.loaded_libraries(&ctx).len(), 2);
    assert_eq!(compiler.calls().len(), 1);
}

#[test]
fn native_package_init_takes_no_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("libNat.so");
    std::fs::write(&path, b"native only").unwrap();
    let compiler = RecordingCompiler::new();
    let native = ScriptedNative::with_symbols(&["init_libNat", "nat_fn"]);
    let bridge = bridge(&["libNat"], &compiler, &native);
    let ctx = bridge.create_context().unwrap();

    let library = bridge.load_package(&ctx, &path, false, false).unwrap();
    assert!(library.handle.is_native());
    assert_eq!(native.invoked(), vec![("init_libNat".to_string(), vec![])]);

    let symbol = bridge.find_symbol(&ctx, "nat_fn", None).unwrap().unwrap();
    assert_eq!(symbol.library, "libNat");
    assert!(symbol.is_native());
    assert_eq!(compiler.compile_count(), 0);
}

#[test]
fn failing_init_unloads_the_package() {
    let fixture = foo_fixture();
    let compiler = RecordingCompiler::new();
    compiler.fail_module("initFoo");
    let native = ScriptedNative::with_symbols(&[]);
    let bridge = bridge(&["libFoo"], &compiler, &native);
    let ctx = bridge.create_context().unwrap();

    let err = bridge
        .load_package(&ctx, &fixture.foo, true, true)
        .unwrap_err();
    match err {
        BridgeError::PackageInit { library, source } => {
            assert_eq!(library, "libFoo");
            assert!(matches!(*source, BridgeError::Compile(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(bridge.loaded_libraries(&ctx).is_empty());
}

#[test]
fn find_symbol_searches_loaded_libraries() {
    let fixture = foo_fixture();
    let compiler = RecordingCompiler::new();
    let native = ScriptedNative::with_symbols(&[]);
    let bridge = bridge(&["libFoo", "libExt"], &compiler, &native);
    let ctx = bridge.create_context().unwrap();
    bridge.load_package(&ctx, &fixture.ext, true, true).unwrap();
    bridge.load_package(&ctx, &fixture.foo, true, true).unwrap();

    let found = bridge.find_symbol(&ctx, "doWork", None).unwrap().unwrap();
    assert_eq!(found.library, "libFoo");
    assert!(
        bridge
            .find_symbol(&ctx, "doWork", Some("libExt"))
            .unwrap()
            .is_none()
    );
    assert!(bridge.find_symbol(&ctx, "missing", None).unwrap().is_none());

    let owner = bridge
        .find_library_containing_symbol(&ctx, "extLib_util")
        .unwrap()
        .unwrap();
    assert_eq!(owner.name, "libExt");
    assert_eq!(bridge.find_library(&ctx, "libFoo").unwrap().path, fixture.foo);
}

#[test]
fn unload_reports_unknown_paths_and_close_failures() {
    let fixture = foo_fixture();
    let dir = tempfile::tempdir().unwrap();
    let nat = write_library(dir.path(), "libNat.so", &[]);
    let compiler = RecordingCompiler::new();
    let native = ScriptedNative::with_symbols(&[]);
    let bridge = bridge(&["libFoo"], &compiler, &native);
    let ctx = bridge.create_context().unwrap();

    assert!(matches!(
        bridge.unload_package(&ctx, &fixture.foo),
        Err(BridgeError::NotLoaded { .. })
    ));

    bridge.load_package(&ctx, &fixture.foo, true, true).unwrap();
    bridge.unload_package(&ctx, &fixture.foo).unwrap();
    assert!(bridge.find_library(&ctx, "libFoo").is_none());

    bridge.load_package(&ctx, &nat, true, true).unwrap();
    native.fail_closes_with(1);
    assert!(matches!(
        bridge.unload_package(&ctx, &nat),
        Err(BridgeError::CloseFailed { status: 1, .. })
    ));
}

#[test]
fn destroying_a_context_closes_its_native_libraries() {
    let dir = tempfile::tempdir().unwrap();
    let nat = write_library(dir.path(), "libNat.so", &[]);
    let compiler = RecordingCompiler::new();
    let native = ScriptedNative::with_symbols(&[]);
    let bridge = bridge(&[], &compiler, &native);

    let parent = bridge.create_context().unwrap();
    bridge.load_package(&parent, &nat, true, true).unwrap();
    let fork = bridge.fork_context(&parent).unwrap();
    assert!(bridge.find_library(&fork, "libNat").is_some());

    bridge.destroy_context(&fork);
    assert!(native.closed().is_empty());

    bridge.destroy_context(&parent);
    assert_eq!(native.closed(), vec![NativeHandle::new(1)]);
    assert!(bridge.loaded_libraries(&parent).is_empty());

    // a second destroy is ignored
    bridge.destroy_context(&parent);
    assert_eq!(native.closed().len(), 1);
}

#[test]
fn fork_loads_stay_out_of_the_parent() {
    let fixture = foo_fixture();
    let dir = tempfile::tempdir().unwrap();
    let inherited = write_library(dir.path(), "libOld.so", &[]);
    let own = write_library(dir.path(), "libNew.so", &[]);
    let compiler = RecordingCompiler::new();
    let native = ScriptedNative::with_symbols(&[]);
    let bridge = bridge(&["libFoo", "libExt"], &compiler, &native);

    let parent = bridge.create_context().unwrap();
    bridge.load_package(&parent, &inherited, true, true).unwrap();
    let fork = bridge.fork_context(&parent).unwrap();

    bridge.load_package(&fork, &fixture.ext, true, true).unwrap();
    bridge.load_package(&fork, &fixture.foo, true, true).unwrap();
    bridge.load_package(&fork, &own, true, true).unwrap();
    assert!(bridge.find_symbol(&fork, "doWork", None).unwrap().is_some());
    assert!(bridge.find_library(&parent, "libFoo").is_none());
    assert!(bridge.find_library(&parent, "libNew").is_none());
    assert_eq!(bridge.loaded_libraries(&parent).len(), 1);

    // forgetting an inherited package leaves the parent's handle open
    bridge.unload_package(&fork, &inherited).unwrap();
    assert!(native.closed().is_empty());
    assert!(bridge.find_library(&parent, "libOld").is_some());

    bridge.destroy_context(&fork);
    assert_eq!(native.closed(), vec![NativeHandle::new(2)]);

    bridge.destroy_context(&parent);
    assert_eq!(
        native.closed(),
        vec![NativeHandle::new(2), NativeHandle::new(1)]
    );
}
