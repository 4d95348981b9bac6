//! Activation tests
//!
//! End-to-end checks of the active-copy lifecycle: first activation,
//! idempotent re-activation, staleness replacement and input validation.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use deptool::archive::{pack_to_file, FilteredDir};
use deptool::checksum::sha256_file;
use deptool::{activate, ActivationOutcome, DepsLayout, Error, Missing};
use tempfile::TempDir;

/// Package `files` as the libpng/<version>/macos archive with its sidecar
fn seed(layout: &DepsLayout, version: &str, files: &[(&str, &str)]) {
    let src = TempDir::new().unwrap();
    for (rel, content) in files {
        let path = src.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    let prebuilt = layout.root().join("libpng").join(version).join("prebuilt");
    fs::create_dir_all(&prebuilt).unwrap();
    let archive = prebuilt.join("macos.tar.gz");
    pack_to_file(&FilteredDir::new(src.path(), Vec::<String>::new()), &archive).unwrap();
    fs::write(prebuilt.join("macos.tar.gz.sha256"), sha256_file(&archive).unwrap()).unwrap();
}

/// Relative path -> (contents, mtime) for every file under `root`
fn snapshot(root: &Path) -> BTreeMap<String, (Vec<u8>, SystemTime)> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().into_owned();
            let meta = fs::metadata(e.path()).unwrap();
            (rel, (fs::read(e.path()).unwrap(), meta.modified().unwrap()))
        })
        .collect()
}

fn active_dir(layout: &DepsLayout) -> std::path::PathBuf {
    layout.root().join("libpng/_active_/prebuilt/macos")
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_libpng_macos_first_activation() {
    let root = TempDir::new().unwrap();
    let layout = DepsLayout::new(root.path());
    seed(
        &layout,
        "1.6.48",
        &[("include/png.h", "/* png */"), ("lib/libpng16.a", "!<arch>")],
    );

    let outcome = activate(&layout, "libpng", "1.6.48", "macos").unwrap();
    assert!(matches!(outcome, ActivationOutcome::Activated { replaced: false, .. }));
    assert_eq!(outcome.path(), active_dir(&layout));

    let active = active_dir(&layout);
    assert_eq!(fs::read_to_string(active.join("include/png.h")).unwrap(), "/* png */");
    assert_eq!(fs::read_to_string(active.join("lib/libpng16.a")).unwrap(), "!<arch>");
    assert_eq!(
        fs::read(active.join("checksum.sha256")).unwrap(),
        fs::read(root.path().join("libpng/1.6.48/prebuilt/macos.tar.gz.sha256")).unwrap()
    );
}

#[test]
fn test_second_activation_is_noop() {
    let root = TempDir::new().unwrap();
    let layout = DepsLayout::new(root.path());
    seed(&layout, "1.6.48", &[("include/png.h", "png"), ("lib/libpng.a", "lib")]);

    activate(&layout, "libpng", "1.6.48", "macos").unwrap();
    let before = snapshot(&layout.root().join("libpng/_active_"));

    let outcome = activate(&layout, "libpng", "1.6.48", "macos").unwrap();
    assert!(matches!(outcome, ActivationOutcome::AlreadyActive { .. }));

    // Same files, same bytes, untouched mtimes, nothing extra created
    assert_eq!(snapshot(&layout.root().join("libpng/_active_")), before);
    let prebuilt_entries: Vec<_> = fs::read_dir(layout.root().join("libpng/_active_/prebuilt"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(prebuilt_entries, vec!["macos"]);
}

#[test]
fn test_stale_active_copy_is_replaced() {
    let root = TempDir::new().unwrap();
    let layout = DepsLayout::new(root.path());
    seed(&layout, "1.6.47", &[("include/png.h", "old"), ("lib/old-only.a", "x")]);
    seed(&layout, "1.6.48", &[("include/png.h", "new"), ("lib/libpng.a", "y")]);

    activate(&layout, "libpng", "1.6.47", "macos").unwrap();
    let c1 = fs::read(active_dir(&layout).join("checksum.sha256")).unwrap();

    let outcome = activate(&layout, "libpng", "1.6.48", "macos").unwrap();
    assert!(matches!(outcome, ActivationOutcome::Activated { replaced: true, .. }));

    let active = active_dir(&layout);
    let c2 = fs::read(active.join("checksum.sha256")).unwrap();
    assert_ne!(c1, c2);
    assert_eq!(
        c2,
        fs::read(root.path().join("libpng/1.6.48/prebuilt/macos.tar.gz.sha256")).unwrap()
    );
    assert_eq!(fs::read_to_string(active.join("include/png.h")).unwrap(), "new");
    assert!(!active.join("lib/old-only.a").exists(), "old contents must be gone");
}

#[test]
fn test_identical_archives_across_versions_count_as_active() {
    let root = TempDir::new().unwrap();
    let layout = DepsLayout::new(root.path());
    let files = [("include/png.h", "same"), ("lib/libpng.a", "same")];
    seed(&layout, "1.6.48", &files);
    seed(&layout, "1.6.48-rebuild", &files);

    activate(&layout, "libpng", "1.6.48", "macos").unwrap();
    let outcome = activate(&layout, "libpng", "1.6.48-rebuild", "macos").unwrap();
    assert!(matches!(outcome, ActivationOutcome::AlreadyActive { .. }));
}

#[test]
fn test_tampered_active_checksum_triggers_reactivation() {
    let root = TempDir::new().unwrap();
    let layout = DepsLayout::new(root.path());
    seed(&layout, "1.6.48", &[("include/png.h", "png"), ("lib/libpng.a", "a")]);

    activate(&layout, "libpng", "1.6.48", "macos").unwrap();
    let active = active_dir(&layout);
    fs::write(active.join("checksum.sha256"), "deadbeef").unwrap();
    fs::write(active.join("include/png.h"), "edited by hand").unwrap();

    let outcome = activate(&layout, "libpng", "1.6.48", "macos").unwrap();
    assert!(matches!(outcome, ActivationOutcome::Activated { replaced: true, .. }));
    assert_eq!(fs::read_to_string(active.join("include/png.h")).unwrap(), "png");
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_missing_archive_reports_path() {
    let root = TempDir::new().unwrap();
    let layout = DepsLayout::new(root.path());
    fs::create_dir_all(root.path().join("libpng/1.6.48")).unwrap();

    let err = activate(&layout, "libpng", "1.6.48", "macos").unwrap_err();
    match &err {
        Error::NotFound { what, path } => {
            assert_eq!(*what, Missing::Archive);
            assert!(path.ends_with("macos.tar.gz"));
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
    assert!(err.to_string().contains("macos.tar.gz"));
}

#[test]
fn test_invalid_arguments_touch_nothing() {
    let root = TempDir::new().unwrap();
    let layout = DepsLayout::new(root.path());

    for (name, version, platform) in [
        ("libfoo", "1.0", "macos"),
        ("libpng", "1.0", "beos"),
        ("libpng", "", "macos"),
        ("libpng", "1.0", "all"),
    ] {
        let err = activate(&layout, name, version, platform).unwrap_err();
        assert!(
            matches!(err, Error::InvalidArgument(_)),
            "({}, {}, {}) gave {:?}",
            name,
            version,
            platform,
            err
        );
    }
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}
