use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nexuslims_extract::extractors::{ExtractionContext, ExtractorRegistry};
use nexuslims_extract::schema::CanonicalMetadata;
use std::path::PathBuf;
use tempfile::TempDir;

#[path = "../tests/common/mod.rs"]
mod common;

use common::{dm_file, dm_image, emi_file, ser_file, tiff, write, Dm, SerSpec, ASCII, EMSA_EDS};

const QUANTA_HEADER: &[u8] = b"[User]\nDate=03/01/2024\nTime=02:15:30 PM\nUser=bench\n\
[Beam]\nHV=30000\nBeam=EBeam\n[EBeam]\nBeamCurrent=1e-10\n\
[Stage]\nStageX=0.001\nWorkingDistance=0.005\n";

/// One synthetic file per built-in decoder, plus an unrecognized one.
fn generate_corpus(dir: &TempDir) -> Vec<(&'static str, PathBuf)> {
    let dm = dm_file(
        false,
        vec![(
            "ImageList",
            Dm::list(vec![dm_image(
                &[1024, 1024],
                &[(0.0, 0.5, "nm"), (0.0, 0.5, "nm")],
                vec![(
                    "Microscope Info",
                    Dm::group(vec![
                        ("Voltage", Dm::Double(200_000.0)),
                        ("Operation Mode", Dm::text("SCANNING")),
                    ]),
                )],
                vec![0; 1 << 16],
            )]),
        )],
    );
    write(dir.path(), "bench.emi", &emi_file(&[("High tension", "200", "kV"), ("Mode", "STEM nP SA Zoom Image", "")]));

    vec![
        ("quanta_tif", write(dir.path(), "quanta.tif", &tiff(&[(34682, ASCII, QUANTA_HEADER)]))),
        ("dm3", write(dir.path(), "image.dm3", &dm)),
        ("ser_emi", write(dir.path(), "bench_1.ser", &ser_file(SerSpec::image(512, 512)))),
        ("msa", write(dir.path(), "spot.msa", EMSA_EDS.as_bytes())),
        ("basic_fallback", write(dir.path(), "photo.png", &[0x89, b'P', b'N', b'G', 0, 0, 0, 0])),
    ]
}

fn bench_selection(c: &mut Criterion) {
    let dir = TempDir::new().expect("tempdir");
    let corpus = generate_corpus(&dir);
    let registry = ExtractorRegistry::with_builtin();

    let mut group = c.benchmark_group("select");
    for (name, path) in &corpus {
        group.bench_with_input(BenchmarkId::from_parameter(name), path, |b, path| {
            b.iter(|| {
                let ctx = ExtractionContext::new(path, None);
                criterion::black_box(registry.select(&ctx).name())
            })
        });
    }
    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let dir = TempDir::new().expect("tempdir");
    let corpus = generate_corpus(&dir);
    let registry = ExtractorRegistry::with_builtin();

    let mut group = c.benchmark_group("extract");
    group.throughput(Throughput::Elements(1));
    for (name, path) in &corpus {
        group.bench_with_input(BenchmarkId::from_parameter(name), path, |b, path| {
            b.iter(|| {
                let ctx = ExtractionContext::new(path, None);
                criterion::black_box(registry.extract(&ctx))
            })
        });
    }
    group.finish();
}

fn bench_canonical(c: &mut Criterion) {
    let dir = TempDir::new().expect("tempdir");
    let corpus = generate_corpus(&dir);
    let registry = ExtractorRegistry::with_builtin();
    let records: Vec<_> = corpus
        .iter()
        .flat_map(|(_, path)| registry.extract(&ExtractionContext::new(path, None)).into_records())
        .collect();

    c.bench_function("canonical/from_raw", |b| {
        b.iter(|| {
            for record in &records {
                criterion::black_box(CanonicalMetadata::from_raw(record).ok());
            }
        })
    });
}

criterion_group!(benches, bench_selection, bench_extract, bench_canonical);
criterion_main!(benches);
