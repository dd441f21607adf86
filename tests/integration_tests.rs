//! Integration tests for the copy engine and resolver working together
//! against mock source trees.

mod helpers;

use helpers::{assert_file_exists, assert_symlink, create_mock_binary, TestEnv};
use minroot::copy;
use std::fs;
use std::os::unix::fs::symlink;

#[test]
fn test_copy_lifts_single_file_without_siblings() {
    let env = TestEnv::new();
    let mut ctx = env.context();

    let deep = env.source.join("opt/app/cfg");
    create_mock_binary(&deep.join("wanted"));
    fs::write(deep.join("unwanted"), b"x").unwrap();

    copy::copy(&mut ctx, &deep.join("wanted"), false).unwrap();

    assert_file_exists(&env.in_output(&deep.join("wanted")));
    assert!(!env.in_output(&deep.join("unwanted")).exists());
}

#[test]
fn test_symlink_chain_is_mirrored_relative() {
    let env = TestEnv::new();
    let mut ctx = env.context();

    // bin -> usr/bin, with the real file at usr/bin/tool
    create_mock_binary(&env.source.join("usr/bin/tool"));
    symlink("usr/bin", env.source.join("bin")).unwrap();

    copy::copy(&mut ctx, &env.source.join("bin/tool"), false).unwrap();

    assert_symlink(&env.in_output(&env.source.join("bin")), "usr/bin");
    assert_file_exists(&env.in_output(&env.source.join("usr/bin/tool")));
}

#[test]
fn test_leaf_symlink_is_mirrored() {
    let env = TestEnv::new();
    let mut ctx = env.context();

    let lib_dir = env.source.join("usr/lib");
    fs::create_dir_all(&lib_dir).unwrap();
    fs::write(lib_dir.join("libdemo.so.1.2"), b"\x7fELF").unwrap();
    symlink("libdemo.so.1.2", lib_dir.join("libdemo.so.1")).unwrap();

    copy::copy(&mut ctx, &lib_dir.join("libdemo.so.1"), false).unwrap();

    assert_symlink(
        &env.in_output(&lib_dir.join("libdemo.so.1")),
        "libdemo.so.1.2",
    );
    assert_file_exists(&env.in_output(&lib_dir.join("libdemo.so.1.2")));
}

#[test]
fn test_copy_is_idempotent() {
    let env = TestEnv::new();
    let mut ctx = env.context();

    let file = env.source.join("etc/app.conf");
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(&file, b"key=value").unwrap();

    copy::copy(&mut ctx, &file, false).unwrap();
    copy::copy(&mut ctx, &file, false).unwrap();

    assert_eq!(ctx.ledger.len(), 1);
    assert_eq!(fs::read(env.in_output(&file)).unwrap(), b"key=value");
}

#[test]
fn test_recursion_flag_is_part_of_the_ledger_key() {
    let env = TestEnv::new();
    let mut ctx = env.context();

    let dir = env.source.join("opt/data");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("f"), b"x").unwrap();

    copy::copy(&mut ctx, &dir, false).unwrap();
    assert!(!env.in_output(&dir.join("f")).exists());

    copy::copy(&mut ctx, &dir, true).unwrap();
    assert_file_exists(&env.in_output(&dir.join("f")));
    assert_eq!(ctx.ledger.len(), 2);
}

#[test]
fn test_recursive_directory_copy_preserves_links() {
    let env = TestEnv::new();
    let mut ctx = env.context();

    let dir = env.source.join("opt/app");
    fs::create_dir_all(dir.join("sub")).unwrap();
    fs::write(dir.join("sub/data"), b"d").unwrap();
    symlink("sub/data", dir.join("alias")).unwrap();

    copy::copy(&mut ctx, &dir, true).unwrap();

    assert_file_exists(&env.in_output(&dir.join("sub/data")));
    assert_symlink(&env.in_output(&dir.join("alias")), "sub/data");
}

#[test]
fn test_excluded_path_is_skipped() {
    let env = TestEnv::new();
    let prefix = env.source.join("opt/secret").to_string_lossy().into_owned();
    let mut ctx = env.context_with(&[prefix.as_str()], minroot::config::Mode::Skinny);

    let file = env.source.join("opt/secret/key");
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(&file, b"k").unwrap();

    copy::copy(&mut ctx, &file, false).unwrap();

    assert!(!env.in_output(&file).exists());
    assert!(ctx.ledger.is_empty());
}

#[test]
fn test_protected_path_is_never_copied() {
    let env = TestEnv::new();
    let mut ctx = env.context();

    copy::copy(&mut ctx, std::path::Path::new("/proc/self/status"), false).unwrap();

    assert!(!env.output.join("proc").exists());
    assert!(ctx.ledger.is_empty());
}

#[test]
fn test_missing_source_is_an_error() {
    let env = TestEnv::new();
    let mut ctx = env.context();

    let missing = env.source.join("no/such/file");
    assert!(copy::copy(&mut ctx, &missing, false).is_err());
}

#[test]
fn test_rsync_materialize_never_overwrites() {
    // The whitelisting rsync path must leave drifted destination files
    // alone on a rerun, same as the fallback copier.
    let rsync = minroot::process::which("rsync");
    if rsync.is_none() {
        return;
    }

    let env = TestEnv::new();
    let mut ctx = env.context();
    ctx.tools.rsync = rsync.clone();

    let file = env.source.join("etc/app.conf");
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(&file, b"from-source").unwrap();

    copy::copy(&mut ctx, &file, false).unwrap();
    assert_eq!(fs::read(env.in_output(&file)).unwrap(), b"from-source");

    // Rerun with a fresh ledger against a locally edited output tree
    fs::write(env.in_output(&file), b"local-edit").unwrap();
    fs::write(&file, b"changed-upstream").unwrap();
    let mut ctx = env.context();
    ctx.tools.rsync = rsync;
    copy::copy(&mut ctx, &file, false).unwrap();

    assert_eq!(fs::read(env.in_output(&file)).unwrap(), b"local-edit");
}

#[test]
fn test_engine_end_to_end_with_host_shell() {
    // Exercises the full pipeline against the host's /bin/sh; needs the
    // linker introspector.
    if minroot::process::which("ldd").is_none() {
        return;
    }

    let env = TestEnv::new();
    let root = env._temp_dir.path().join("e2e-root");

    let config = minroot::config::Config {
        output_root: root.clone(),
        tarfile: None,
        excludes: vec![],
        includes: vec![],
        exclude_common: true,
        executions: vec![vec!["/bin/sh".to_string()]],
        ldconfig: true,
        loader_path: std::path::PathBuf::from("etc/ld.so.conf"),
        plugins: minroot::plugin::PluginConfig::parse(&[], false).unwrap(),
        mode: minroot::config::Mode::Skinny,
        force: false,
        keep_temp: false,
    };

    minroot::engine::Engine::new(config).unwrap().run().unwrap();

    // The real shell binary must be present in the output tree
    let real_sh = fs::canonicalize("/bin/sh").unwrap();
    let copied = root.join(real_sh.strip_prefix("/").unwrap());
    assert_file_exists(&copied);

    // The loader config is flushed at finalization
    assert_file_exists(&root.join("etc/ld.so.conf"));
}
