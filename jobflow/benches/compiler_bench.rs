//! Benchmarks for the compiler hot paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jobflow::localization::merge_directories;
use jobflow::script::ScriptParser;

fn script_benchmark(c: &mut Criterion) {
    let parser = ScriptParser::new("bash", "gcr.io/cloud-genomics-pipelines/io");
    let script: String = (0..200)
        .map(|n| format!("echo step {n} \\\n  --flag value &  # ports=http:80{} image=alpine\n", n % 10))
        .collect();

    c.bench_function("parse_script_200_lines", |b| {
        b.iter(|| parser.parse_script(black_box(&script)));
    });
}

fn directories_benchmark(c: &mut Criterion) {
    let paths: Vec<String> = (0..500)
        .map(|n| format!("/mnt/google/.google/input/bucket/{}/{}", n % 37, n))
        .collect();

    c.bench_function("merge_directories_500", |b| {
        b.iter(|| merge_directories(black_box(paths.clone())));
    });
}

criterion_group!(benches, script_benchmark, directories_benchmark);
criterion_main!(benches);
