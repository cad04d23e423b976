//! Integration tests for the full scan pipeline.
//!
//! These tests run the front end, matcher and renderer against the
//! `testdata/game` fixtures and compare the complete report.

use std::path::{Path, PathBuf};

use bindref::cli::plan_sources;
use bindref::frontend::{Frontend, SourceFile};
use bindref::render::{render_to_string, ClassOrder};
use bindref::{Config, DisplayNamePolicy, Runner};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn game_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata").join("game")
}

fn game_config() -> Config {
    Config {
        include_dirs: vec![game_path().join("include")],
        ..Config::default()
    }
}

fn expected_report() -> String {
    std::fs::read_to_string(game_path().join("expected.txt")).expect("should read expected report")
}

/// Run the pipeline on already planned sources.
fn report(sources: &[SourceFile], config: &Config) -> String {
    let workspace = Frontend::new()
        .follow_includes(config.follow_includes)
        .load(sources)
        .expect("sources should load");
    let catalog = Runner::new(config.display_name_policy)
        .collect(&workspace)
        .expect("matching should succeed");
    render_to_string(&catalog, &config.render_options())
}

fn scan(inputs: &[PathBuf], config: &Config) -> String {
    let sources = plan_sources(inputs, None, config).expect("inputs should expand");
    report(&sources, config)
}

#[test]
fn test_game_report_matches_expected() {
    let config = game_config();
    let output = scan(&[game_path().join("src")], &config);
    assert_eq!(output, expected_report());
}

#[test]
fn test_input_order_does_not_change_sorted_report() {
    let config = Config {
        class_order: ClassOrder::Alphabetical,
        ..game_config()
    };
    let src = game_path().join("src");
    let forward = scan(&[src.join("bind_items.cpp"), src.join("bind_player.cpp")], &config);
    let backward = scan(&[src.join("bind_player.cpp"), src.join("bind_items.cpp")], &config);

    assert_eq!(forward, backward);
    assert_eq!(forward, expected_report());
}

#[test]
fn test_registration_order_follows_inputs() {
    let config = game_config();
    let src = game_path().join("src");
    let output = scan(&[src.join("bind_player.cpp"), src.join("bind_items.cpp")], &config);

    let classes: Vec<&str> = output.lines().filter(|l| !l.starts_with('\t')).collect();
    assert_eq!(classes, vec!["Player", "Inventory", "Item"]);
}

#[test]
fn test_empty_context_marker_keeps_state_parameter() {
    let config = Config {
        context_marker: String::new(),
        ..game_config()
    };
    let output = scan(&[game_path().join("src")], &config);

    assert!(output.contains("\tstring getName(lua_State* L, bool verbose)\n"));
    assert!(output.contains("\tvoid equip(lua_State* L, Item item, int slot)\n"));
}

#[test]
fn test_without_include_following_nothing_resolves() {
    let config = Config {
        follow_includes: false,
        ..game_config()
    };
    let output = scan(&[game_path().join("src")], &config);
    assert_eq!(output, "");
}

#[test]
fn test_compile_database_supplies_include_dirs() {
    let temp = TempDir::new().expect("should create temp dir");
    let build = temp.path();
    let game = game_path();
    let entry = |file: &str| {
        serde_json::json!({
            "directory": game.display().to_string(),
            "file": format!("src/{}", file),
            "command": format!("c++ -std=c++17 -I include -c src/{}", file),
        })
    };
    let db = serde_json::Value::Array(vec![entry("bind_items.cpp"), entry("bind_player.cpp")]);
    std::fs::write(build.join("compile_commands.json"), db.to_string()).expect("should write database");

    let config = Config::default();
    let sources = plan_sources(&[], Some(build), &config).expect("database should load");
    assert_eq!(sources.len(), 2);
    assert_eq!(report(&sources, &config), expected_report());
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("should write fixture");
    path
}

#[test]
fn test_display_name_policies() {
    let temp = TempDir::new().expect("should create temp dir");
    write(
        temp.path(),
        "widget.h",
        "class CWidget {\npublic:\n    void Show();\n    CWidget& Self();\n};\n",
    );
    let first = write(
        temp.path(),
        "a.cpp",
        "#include \"widget.h\"\nvoid A() { class_<CWidget>().def(\"show\", &CWidget::Show); }\n",
    );
    let second = write(
        temp.path(),
        "b.cpp",
        "#include \"widget.h\"\nvoid B() { class_<CWidget>(\"Widget\").def(\"self\", &CWidget::Self); }\n",
    );
    let inputs = [first, second];

    let first_seen = scan(&inputs, &Config::default());
    assert_eq!(first_seen, "CWidget\n\tCWidget self()\n\tvoid show()\n");

    let prefer_literal = scan(
        &inputs,
        &Config {
            display_name_policy: DisplayNamePolicy::PreferLiteral,
            ..Config::default()
        },
    );
    assert_eq!(prefer_literal, "Widget\n\tWidget self()\n\tvoid show()\n");
}

#[test]
fn test_registrations_in_included_header() {
    let temp = TempDir::new().expect("should create temp dir");
    let dir = temp.path();
    write(
        dir,
        "reg.h",
        "#pragma once\nclass P { public: int L(); };\ninline void R() { class_<P>(\"Player\").def(\"level\", &P::L); }\n",
    );
    write(dir, "a.cpp", "#include \"reg.h\"\nvoid A() {}\n");
    write(dir, "b.cpp", "#include \"reg.h\"\nvoid B() {}\n");
    let entry = |file: &str| {
        serde_json::json!({
            "directory": dir.display().to_string(),
            "file": file,
            "arguments": ["c++", "-c", file],
        })
    };
    let db = serde_json::Value::Array(vec![entry("a.cpp"), entry("b.cpp")]);
    std::fs::write(dir.join("compile_commands.json"), db.to_string()).expect("should write database");

    let config = Config::default();
    let sources = plan_sources(&[], Some(dir), &config).expect("database should load");
    assert_eq!(report(&sources, &config), "Player\n\tint level()\n");
}
