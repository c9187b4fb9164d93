//! Integration tests for the tesela-explain binary

use std::io::Write;
use std::process::Command;

/// Helper to run the tesela-explain binary
fn run_explain(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_tesela-explain"))
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run tesela-explain")
}

fn json_of(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON ({e}): {stdout}"))
}

#[test]
fn help_shows_subcommands() {
    let output = run_explain(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Help should succeed");
    assert!(stdout.contains("layout"), "Should show layout subcommand");
    assert!(stdout.contains("qparams"), "Should show qparams subcommand");
    assert!(stdout.contains("graph"), "Should show graph subcommand");
}

#[test]
fn layout_json_has_derived_fields() {
    let output = run_explain(&["layout", "--sizes", "1,3,17,9", "--json"]);
    assert!(output.status.success(), "layout should succeed");

    let json = json_of(&output);
    assert_eq!(json["dim_order"], serde_json::json!([0, 2, 3, 1]));
    assert_eq!(json["image_extents"], serde_json::json!([9, 17, 1]));
    assert_eq!(json["padded_numel"], 612);
}

#[test]
fn layout_buffer_width_packed() {
    let output = run_explain(&[
        "layout", "--sizes", "2,3,4", "--storage", "buffer", "--layout", "width", "--json",
    ]);
    assert!(output.status.success());

    let json = json_of(&output);
    assert_eq!(json["strides"], serde_json::json!([12, 4, 1]));
    assert!(json["image_extents"].is_null());
}

#[test]
fn layout_optimized_axis_map() {
    let output = run_explain(&["layout", "--sizes", "4,2,8", "--optimized", "--json"]);
    assert!(output.status.success());

    // W=8 is largest -> X, C=4 -> Y, H=2 -> Z
    let json = json_of(&output);
    assert_eq!(json["axis_map"], serde_json::json!([0, 2, 1, 1]));
}

#[test]
fn layout_text_output() {
    let output = run_explain(&["layout", "--sizes", "3,5,7"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("image extents: [7, 5, 1]"));
}

#[test]
fn layout_rejects_zero_size() {
    let output = run_explain(&["layout", "--sizes", "3,0"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("Invalid argument"));
}

#[test]
fn layout_rejects_unaddressable_buffer() {
    let output = run_explain(&["layout", "--sizes", "65536,65536", "--storage", "buffer", "--layout", "width"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("shader-addressable elements"));
}

#[test]
fn qparams_negative_range() {
    let output = run_explain(&["qparams", "--min", "-1.0", "--max", "1.0", "--json"]);
    assert!(output.status.success());

    let json = json_of(&output);
    assert_eq!(json["qmin"], -128);
    assert_eq!(json["qmax"], 127);
}

#[test]
fn qparams_rejects_float_dtype() {
    let output = run_explain(&["qparams", "--min", "0", "--max", "1", "--dtype", "float"]);
    assert!(!output.status.success());
}

#[test]
fn graph_from_file() {
    let dir = std::env::temp_dir().join(format!("tesela-explain-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("graph.json");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        r#"{{
            "version": "0",
            "chain": [],
            "values": [
                {{"type": "Tensor", "value": {{"datatype": 5, "dims": [1, 4, 8, 8], "mem_obj_id": 0}}}},
                {{"type": "Tensor", "value": {{"datatype": 5, "dims": [1, 4, 8, 8], "mem_obj_id": 0}}}}
            ],
            "input_ids": [0],
            "output_ids": [1]
        }}"#
    )
    .unwrap();
    drop(file);

    let output = run_explain(&["graph", path.to_str().unwrap(), "--json"]);
    assert!(output.status.success());
    let json = json_of(&output);
    assert_eq!(json["shared_objects"], 1);
    assert_eq!(json["tensors"].as_array().unwrap().len(), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn graph_missing_file_fails() {
    let output = run_explain(&["graph", "/nonexistent/graph.json"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("IO error"));
}
