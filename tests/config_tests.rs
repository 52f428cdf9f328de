//! Kernel Options Loading Tests
//!
//! Layered option loading: TOML files fill declared fields, serde
//! defaults fill the rest, and the loaded options drive kernel behavior.

use std::io::Write;
use stratum::{Hierarchy, Kernel, KernelOptions, RawNode};
use tempfile::NamedTempFile;

fn write_toml(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file.flush().expect("flush config");
    file
}

#[test]
fn test_full_file_overrides_every_default() {
    let file = write_toml(
        r#"
intern_table_capacity_hint = 64
query_cache_capacity = 16
max_depth = 8
collect_statistics = true
wildcard_tokens = ["*", "%"]
emit_deprecation_signals = false
"#,
    );

    let options = KernelOptions::load_from(file.path()).expect("load options");
    assert_eq!(options.intern_table_capacity_hint, 64);
    assert_eq!(options.query_cache_capacity, 16);
    assert_eq!(options.max_depth, 8);
    assert!(options.collect_statistics);
    assert_eq!(options.wildcard_tokens, vec!["*".to_string(), "%".to_string()]);
    assert!(!options.emit_deprecation_signals);
}

#[test]
fn test_partial_file_keeps_remaining_defaults() {
    let file = write_toml("max_depth = 12\n");
    let options = KernelOptions::load_from(file.path()).expect("load options");
    assert_eq!(options.max_depth, 12);
    assert_eq!(
        options.query_cache_capacity,
        KernelOptions::default().query_cache_capacity
    );
    assert_eq!(options.wildcard_tokens, vec!["*".to_string()]);
}

#[test]
fn test_loaded_options_drive_kernel_behavior() {
    let file = write_toml("max_depth = 3\ncollect_statistics = true\n");
    let options = KernelOptions::load_from(file.path()).expect("load options");
    let kernel = Kernel::new(Hierarchy::new(), options);

    let shallow = RawNode::map([("a", RawNode::from(1))]);
    assert!(kernel.precompile(&shallow).is_ok());
    assert_eq!(kernel.stats().compile.compiles, 1);

    let deep = RawNode::map([(
        "a",
        RawNode::map([("b", RawNode::map([("c", RawNode::from(1))]))]),
    )]);
    assert!(kernel.precompile(&deep).is_err());
}

#[test]
fn test_options_round_trip_through_serde() {
    let options = KernelOptions {
        query_cache_capacity: 7,
        wildcard_tokens: vec!["@".to_string()],
        ..KernelOptions::default()
    };
    let encoded = toml::to_string(&options).expect("encode options");
    let decoded: KernelOptions = toml::from_str(&encoded).expect("decode options");
    assert_eq!(decoded.query_cache_capacity, 7);
    assert_eq!(decoded.wildcard_tokens, vec!["@".to_string()]);
}
