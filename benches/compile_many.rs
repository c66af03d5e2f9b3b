//! compile many benches
#[macro_use]
extern crate criterion;

use criterion::Criterion;
use fab::analysis::fortran::AnalysedFortran;
use fab::compile::{CompileFortran, CompilerIdentity};
use fab::config::BuildConfig;
use fab::flags::FlagsConfig;
use std::collections::HashMap;

/// A synthetic build tree: `n` independent leaf files with no dependencies
/// on each other, so a single wave compiles all of them. Exercises the
/// combo-hash derivation and cache-check path without shelling out to a
/// real Fortran compiler.
fn synthetic_files(n: usize) -> Vec<AnalysedFortran> {
    (0..n)
        .map(|i| {
            let mut f = AnalysedFortran::new(format!("file_{i}.f90"), i as u32);
            f.add_module_def(format!("mod_{i}"));
            f
        })
        .collect()
}

fn config(multiprocessing: bool) -> BuildConfig {
    let tmp = tempfile::tempdir().unwrap();
    BuildConfig::builder("bench")
        .fab_workspace(tmp.into_path())
        .multiprocessing(multiprocessing)
        .n_procs(num_cpus::get())
        .build()
        .unwrap()
}

fn compile_many_benchmark(c: &mut Criterion) {
    let compiler = CompileFortran::new(CompilerIdentity { name: "foo_cc".into(), version: "1.2.3".into() }, FlagsConfig::default());
    let files = synthetic_files(200);
    let mod_hashes: HashMap<String, u32> = HashMap::new();

    let mut group = c.benchmark_group("combo hash derivation over a wave");
    group.sample_size(20);

    group.bench_function("sequential", |b| {
        let config = config(false);
        b.iter(|| {
            for f in &files {
                let _ = compiler.mods_combo_hash(f);
                let _ = compiler.obj_combo_hash(f, &[], &mod_hashes);
            }
            let _ = &config;
        });
    });

    group.bench_function("parallel (rayon pool)", |b| {
        let config = config(true);
        b.iter(|| {
            let items = files.clone();
            let _ = fab::executor::run_mp(&config, items, |f| {
                let _ = compiler.mods_combo_hash(&f);
                let _ = compiler.obj_combo_hash(&f, &[], &mod_hashes);
                Ok::<_, fab::error::FabError>(())
            });
        });
    });

    group.finish();
}

criterion_group!(benches, compile_many_benchmark);
criterion_main!(benches);
