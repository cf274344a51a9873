use criterion::{Criterion, criterion_group, criterion_main};
use packlet::config::Config;
use packlet::emit::BundleEmitter;
use packlet::graph_builder::GraphBuilder;
use packlet::resolver::DEFAULT_EXTENSIONS;
use packlet::source::MemorySourceLoader;
use packlet::transform::EsmTransformer;
use packlet::Bundler;
use std::fs;
use std::hint::black_box;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MODULE_COUNT: usize = 200;

/// Each module imports the next two, so most modules have two importers and
/// the last one closes a cycle back to the entry.
fn module_source(index: usize) -> String {
    let mut source = String::new();
    for next in [index + 1, index + 2] {
        if next < MODULE_COUNT {
            source.push_str(&format!("import {{ value{next} }} from './mod{next}.js';\n"));
        }
    }
    if index == MODULE_COUNT - 1 {
        source.push_str("import * as entry from './mod0.js';\n");
    }
    source.push_str(&format!(
        "\n/* module {index} */\nexport const value{index} = `value ${{{index}}}`;\nexport function read{index}() {{\n  return value{index};\n}}\n"
    ));
    source
}

fn memory_project() -> MemorySourceLoader {
    let mut loader = MemorySourceLoader::new();
    for index in 0..MODULE_COUNT {
        loader.insert(&format!("/src/mod{index}.js"), module_source(index));
    }
    loader
}

fn create_test_project(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir.join("src"))?;
    for index in 0..MODULE_COUNT {
        fs::write(
            dir.join("src").join(format!("mod{index}.js")),
            module_source(index),
        )?;
    }
    Ok(())
}

fn benchmark_graph_and_emit(c: &mut Criterion) {
    let loader = memory_project();
    let extensions: Vec<String> = DEFAULT_EXTENSIONS.iter().map(|ext| (*ext).to_owned()).collect();

    c.bench_function("build_graph_in_memory", |b| {
        b.iter(|| {
            let graph = GraphBuilder::new(&loader, &EsmTransformer, &extensions)
                .build(black_box("src/mod0.js"))
                .expect("graph builds");
            black_box(graph);
        });
    });

    let graph = GraphBuilder::new(&loader, &EsmTransformer, &extensions)
        .build("src/mod0.js")
        .expect("graph builds");
    c.bench_function("emit_bundle", |b| {
        b.iter(|| {
            let artifact = BundleEmitter::new()
                .emit(black_box(&graph), graph.entry())
                .expect("emit succeeds");
            black_box(artifact);
        });
    });
}

fn benchmark_full_bundle(c: &mut Criterion) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    create_test_project(temp_dir.path()).expect("Failed to create test project");

    let config = Config {
        entry: Some(PathBuf::from("src/mod0.js")),
        root: Some(temp_dir.path().to_path_buf()),
        ..Config::default()
    };
    let bundler = Bundler::new(config);

    c.bench_function("bundle_from_filesystem", |b| {
        b.iter(|| {
            let bundle = bundler.bundle_to_string().expect("Bundling failed");
            black_box(bundle);
        });
    });
}

criterion_group!(benches, benchmark_graph_and_emit, benchmark_full_bundle);
criterion_main!(benches);
