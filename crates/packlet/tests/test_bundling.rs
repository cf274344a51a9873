use std::fs;
use std::path::{Path, PathBuf};

use insta::assert_snapshot;
use packlet::bundler::Bundler;
use packlet::config::{Config, OutputConfig};
use tempfile::TempDir;

mod common;

use common::write_project;

const PROJECT: &[(&str, &str)] = &[
    (
        "src/main.js",
        "import { greet } from './greet.js';\nimport config from './config/index.js';\n\nexport const message = greet(config.name);\n",
    ),
    (
        "src/greet.js",
        "import { punctuation } from './config';\n\nexport function greet(name) {\n  return `Hello, ${name}${punctuation}`;\n}\n",
    ),
    (
        "src/config/index.js",
        "export const punctuation = \"!\";\nexport default { name: \"packlet\" };\n",
    ),
];

fn config_for(root: &Path) -> Config {
    Config {
        entry: Some(PathBuf::from("src/main.js")),
        root: Some(root.to_path_buf()),
        ..Config::default()
    }
}

#[test]
fn test_bundle_is_written_to_configured_output() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    write_project(temp_dir.path(), PROJECT);

    let config = Config {
        output: OutputConfig {
            path: PathBuf::from("public/js"),
            filename: "app.js".to_owned(),
        },
        ..config_for(temp_dir.path())
    };
    let written = Bundler::new(config).bundle()?;

    assert_eq!(written, temp_dir.path().join("public/js").join("app.js"));
    let bundle = fs::read_to_string(written)?;
    assert!(bundle.starts_with("(function (modules) {\n"));
    assert!(bundle.contains("  \"/src/config/index.js\": {\n"));
    Ok(())
}

#[test]
fn test_bundles_are_byte_identical_across_runs_and_locations() -> anyhow::Result<()> {
    let first_dir = TempDir::new()?;
    let second_dir = TempDir::new()?;
    write_project(first_dir.path(), PROJECT);
    write_project(second_dir.path(), PROJECT);

    let first = Bundler::new(config_for(first_dir.path())).bundle_to_string()?;
    let again = Bundler::new(config_for(first_dir.path())).bundle_to_string()?;
    let elsewhere = Bundler::new(config_for(second_dir.path())).bundle_to_string()?;

    assert_eq!(first, again);
    assert_eq!(first, elsewhere);
    Ok(())
}

#[test]
fn test_bundle_registry_snapshot() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    write_project(temp_dir.path(), PROJECT);

    let bundle = Bundler::new(config_for(temp_dir.path())).bundle_to_string()?;
    let (_, registry) = bundle
        .split_once("})({\n")
        .expect("bundle contains the registry literal");
    assert_snapshot!(registry, @r#"
      "/src/main.js": {
        dependencies: { "./greet.js": "/src/greet.js", "./config/index.js": "/src/config/index.js" },
        code: function (require, exports) {
    "use strict";
    Object.defineProperty(exports, "message", { enumerable: true, get: function () { return message; } });
    var __dep0 = require("./greet.js");
    var __dep1 = require("./config/index.js");



    const message = (0, __dep0.greet)(__dep1.default.name);
        }
      },
      "/src/greet.js": {
        dependencies: { "./config": "/src/config/index.js" },
        code: function (require, exports) {
    "use strict";
    Object.defineProperty(exports, "greet", { enumerable: true, get: function () { return greet; } });
    var __dep0 = require("./config");


    function greet(name) {
      return `Hello, ${name}${__dep0.punctuation}`;
    }
        }
      },
      "/src/config/index.js": {
        dependencies: {},
        code: function (require, exports) {
    "use strict";
    Object.defineProperty(exports, "punctuation", { enumerable: true, get: function () { return punctuation; } });
    Object.defineProperty(exports, "default", { enumerable: true, get: function () { return __default; } });
    const punctuation = "!";
    const __default = { name: "packlet" };
        }
      }
    });
    "#);
    Ok(())
}

#[test]
fn test_circular_project_bundles() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    write_project(
        temp_dir.path(),
        &[
            ("src/main.js", "import { a } from './a.js';\nexport default a;\n"),
            ("src/a.js", "import { b } from './b.js';\nexport const a = 1;\n"),
            ("src/b.js", "import { a } from './a.js';\nexport const b = 2;\n"),
        ],
    );

    let graph = Bundler::new(config_for(temp_dir.path())).build_graph()?;
    assert_eq!(graph.len(), 3);
    assert_eq!(graph.circular_groups().len(), 1);
    Ok(())
}

#[test]
fn test_errors_carry_context() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    write_project(
        temp_dir.path(),
        &[
            ("src/main.js", "import './util.js';\n"),
            ("src/util.js", "export const broken = 'unterminated;\n"),
        ],
    );

    let err = Bundler::new(config_for(temp_dir.path()))
        .bundle_to_string()
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(
        message.starts_with(
            "Failed to build module graph from src/main.js: failed to parse /src/util.js at 1:23: "
        ),
        "{message}"
    );
    assert!(message.to_lowercase().contains("unterminated string"), "{message}");
    Ok(())
}
