//! End-to-end deferral with the real image backend: the bytes a deferred
//! request materializes into must be exactly the bytes an eager request
//! would have produced.

use delayed_variations::config::ServerConfig;
use delayed_variations::imaging::RustBackend;
use delayed_variations::materialize::materialize;
use delayed_variations::options::SizeOptions;
use delayed_variations::queue;
use delayed_variations::sizer::Sizer;
use delayed_variations::source::SourceImage;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_test_image(path: &Path) {
    let img = image::RgbImage::from_fn(320, 240, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    img.save(path).unwrap();
}

fn rooted(tmp: &TempDir) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.root = tmp.path().to_path_buf();
    config
}

#[test]
fn deferred_render_matches_eager_render() {
    // Two identical roots: one defers then materializes, one renders eagerly
    let (deferred, eager) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    write_test_image(&deferred.path().join("photo.png"));
    write_test_image(&eager.path().join("photo.png"));

    let deferred_sizer = Sizer::new(rooted(&deferred), RustBackend::new());
    let source = SourceImage::resolve(deferred_sizer.config(), "/files/photo.png").unwrap();
    let v = deferred_sizer
        .size(&source, 160, 120, &SizeOptions::default())
        .unwrap();
    assert!(!v.is_materialized());
    let img = materialize(&deferred_sizer, &v.url).unwrap().unwrap();

    let eager_sizer = Sizer::new(rooted(&eager), RustBackend::new());
    let source = SourceImage::resolve(eager_sizer.config(), "/files/photo.png").unwrap();
    let mut options = SizeOptions::default();
    options.no_delay = true;
    let direct = eager_sizer.size(&source, 160, 120, &options).unwrap();

    assert_eq!(img.bytes, fs::read(&direct.path).unwrap());
    assert_eq!(v.basename(), direct.basename());
}

#[test]
fn rematerialization_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    write_test_image(&tmp.path().join("photo.png"));
    let sizer = Sizer::new(rooted(&tmp), RustBackend::new());
    let source = SourceImage::resolve(sizer.config(), "/files/photo.png").unwrap();
    let mut options = SizeOptions::default();
    options.rotate = 90;

    let v = sizer.size(&source, 100, 80, &options).unwrap();
    let first = materialize(&sizer, &v.url).unwrap().unwrap().bytes;

    // Force the same name through the protocol again
    let mut again = options.clone();
    again.force_new = true;
    let v = sizer.size(&source, 100, 80, &again).unwrap();
    assert!(!v.is_materialized());
    let second = materialize(&sizer, &v.url).unwrap().unwrap().bytes;

    assert_eq!(first, second);
}

#[test]
fn full_lifecycle_of_one_source() {
    let tmp = TempDir::new().unwrap();
    let original = tmp.path().join("photo.png");
    write_test_image(&original);
    let sizer = Sizer::new(rooted(&tmp), RustBackend::new());
    let source = SourceImage::resolve(sizer.config(), "/files/photo.png").unwrap();

    // Defer three sizes, materialize one
    let urls: Vec<String> = [(100, 100), (200, 0), (0, 150)]
        .iter()
        .map(|&(w, h)| sizer.size(&source, w, h, &SizeOptions::default()).unwrap().url)
        .collect();
    let img = materialize(&sizer, &urls[0]).unwrap().unwrap();
    assert_eq!(img.mime, "image/png");
    assert_eq!(image::image_dimensions(&img.path).unwrap(), (100, 100));

    // Source goes away; cleanup drops the remaining records
    fs::remove_file(&original).unwrap();
    let report = queue::cleanup_records(&original).unwrap();
    assert_eq!(report.removed.len(), 2);
    assert!(report.failed.is_empty());

    // The already-materialized file survives, nothing else is pending
    assert!(img.path.is_file());
    for url in &urls[1..] {
        assert!(materialize(&sizer, url).unwrap().is_none());
    }
}
