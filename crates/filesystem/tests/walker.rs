//! End-to-end tests for `DirectoryWalker` against real temporary trees.

use std::collections::BTreeSet;
use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusty_fsops_common::progress_fn;
use rusty_fsops_filesystem::{
    mount_source, DirStackEntry, DirectoryWalker, FileKind, FileSystemError, WalkEntry, WalkOptions,
    WalkProgress, WalkStats,
};
use tempfile::TempDir;
use walkdir::WalkDir;

// ============================================================================
// Helpers
// ============================================================================

fn rel(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap().to_string_lossy().into_owned()
}

fn walk_all(root: &Path, options: WalkOptions) -> Vec<WalkEntry> {
    DirectoryWalker::new(root, options)
        .unwrap()
        .map(|item| item.unwrap())
        .collect()
}

fn walk_names(root: &Path, options: WalkOptions) -> Vec<String> {
    walk_all(root, options)
        .iter()
        .map(|entry| rel(root, &entry.path()))
        .collect()
}

fn create_test_tree(dir: &Path) {
    std::fs::write(dir.join("file1.txt"), b"hello world").unwrap();
    std::fs::write(dir.join("file2.txt"), b"goodbye").unwrap();
    std::fs::create_dir_all(dir.join("subdir/nested")).unwrap();
    std::fs::write(dir.join("subdir/a.txt"), b"nested content").unwrap();
    std::fs::write(dir.join("subdir/nested/deep.txt"), b"deep").unwrap();
    std::fs::create_dir(dir.join("empty")).unwrap();
}

/// Two top-level directories, each with three leaf directories holding one file.
fn create_three_level_tree(dir: &Path) {
    for top in ["alpha", "beta"] {
        for leaf in ["one", "two", "three"] {
            let leaf_dir: PathBuf = dir.join(top).join(leaf);
            std::fs::create_dir_all(&leaf_dir).unwrap();
            std::fs::write(leaf_dir.join("data.txt"), leaf.as_bytes()).unwrap();
        }
    }
    std::fs::write(dir.join("readme.txt"), b"top").unwrap();
}

// ============================================================================
// Enumeration
// ============================================================================

#[test]
fn test_walk_matches_walkdir() {
    let dir: TempDir = TempDir::new().unwrap();
    create_test_tree(dir.path());

    let walked: BTreeSet<String> = walk_names(dir.path(), WalkOptions::default()).into_iter().collect();
    let expected: BTreeSet<String> = WalkDir::new(dir.path())
        .min_depth(1)
        .into_iter()
        .map(|e| rel(dir.path(), e.unwrap().path()))
        .collect();

    assert_eq!(walked, expected);
    assert_eq!(walked.len(), 7);
}

#[test]
fn test_depth_first_order() {
    let dir: TempDir = TempDir::new().unwrap();
    create_test_tree(dir.path());

    let names: Vec<String> = walk_names(dir.path(), WalkOptions::default());
    let subdir: usize = names.iter().position(|n| n == "subdir").unwrap();
    let nested: usize = names.iter().position(|n| n == "subdir/nested").unwrap();
    let deep: usize = names.iter().position(|n| n == "subdir/nested/deep.txt").unwrap();

    assert!(subdir < nested && nested < deep);
    // The whole subtree is yielded before the next top-level sibling.
    let after_subdir: Vec<&String> = names[subdir + 1..].iter().take(3).collect();
    assert!(after_subdir.iter().all(|n| n.starts_with("subdir/")));
}

#[test]
fn test_entry_fields_and_descriptors() {
    let dir: TempDir = TempDir::new().unwrap();
    create_test_tree(dir.path());

    let entries: Vec<WalkEntry> = walk_all(dir.path(), WalkOptions::default());
    let entry: &WalkEntry = entries.iter().find(|e| e.name == "a.txt").unwrap();

    assert_eq!(entry.parent, dir.path().join("subdir"));
    assert!(!entry.is_dir);
    assert_eq!(entry.metadata.size, 14);
    assert_eq!(entry.metadata.kind(), FileKind::File);
    assert_eq!(
        entry.metadata.ino,
        std::fs::metadata(dir.path().join("subdir/a.txt")).unwrap().ino()
    );

    let nested: &WalkEntry = entries.iter().find(|e| e.name == "nested").unwrap();
    assert!(nested.is_dir);
    assert!(nested.metadata.is_dir());
}

#[test]
fn test_descriptors_outlive_walker() {
    let dir: TempDir = TempDir::new().unwrap();
    create_test_tree(dir.path());

    let entries: Vec<WalkEntry> = walk_all(dir.path(), WalkOptions::default());
    let entry: WalkEntry = entries.into_iter().find(|e| e.name == "file1.txt").unwrap();

    let mut file: File = File::from(entry.into_fd());
    let mut content: String = String::new();
    file.read_to_string(&mut content).unwrap();
    assert_eq!(content, "hello world");
}

#[test]
fn test_stats() {
    let dir: TempDir = TempDir::new().unwrap();
    create_test_tree(dir.path());

    let mut walker: DirectoryWalker = DirectoryWalker::new(dir.path(), WalkOptions::default()).unwrap();
    assert_eq!(walker.get_stats().current_directory, dir.path());

    let count: usize = walker.by_ref().map(|item| item.unwrap()).count();
    let stats: WalkStats = walker.get_stats();

    assert_eq!(count, 7);
    assert_eq!(stats.count, 7);
    assert_eq!(stats.bytes, 11 + 7 + 14 + 4);
    assert_eq!(stats.current_directory, PathBuf::new());
    assert!(walker.next().is_none());
}

#[test]
fn test_fifo_does_not_block() {
    let dir: TempDir = TempDir::new().unwrap();
    let fifo: CString = CString::new(dir.path().join("pipe").to_str().unwrap()).unwrap();
    // SAFETY: fifo is a valid NUL-terminated path.
    assert_eq!(unsafe { libc::mkfifo(fifo.as_ptr(), 0o600) }, 0);

    let entries: Vec<WalkEntry> = walk_all(dir.path(), WalkOptions::default());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].metadata.kind(), FileKind::Fifo);
}

// ============================================================================
// Boundary safety
// ============================================================================

#[test]
fn test_symlinks_are_never_followed() {
    let dir: TempDir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("target")).unwrap();
    std::fs::write(dir.path().join("target/inner.txt"), b"inner").unwrap();
    std::os::unix::fs::symlink("target", dir.path().join("dirlink")).unwrap();
    std::os::unix::fs::symlink("target/inner.txt", dir.path().join("filelink")).unwrap();
    std::os::unix::fs::symlink("/", dir.path().join("escape")).unwrap();
    std::fs::write(dir.path().join("sibling.txt"), b"s").unwrap();

    let names: BTreeSet<String> = walk_names(dir.path(), WalkOptions::default()).into_iter().collect();

    let expected: BTreeSet<String> = ["target", "target/inner.txt", "sibling.txt"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(names, expected);
}

#[test]
fn test_symlinked_root_is_refused() {
    let dir: TempDir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("real")).unwrap();
    std::os::unix::fs::symlink("real", dir.path().join("link")).unwrap();

    let err: FileSystemError = DirectoryWalker::new(dir.path().join("link"), WalkOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, FileSystemError::Sys(ref e) if e.raw_os_error() == Some(libc::ELOOP)));
}

#[test]
fn test_root_must_be_directory() {
    let dir: TempDir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("plain.txt"), b"x").unwrap();

    let err: FileSystemError = DirectoryWalker::new(dir.path().join("plain.txt"), WalkOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, FileSystemError::NotADirectory { .. }));
    assert!(err.to_string().starts_with("Not a directory: "));
}

#[test]
fn test_relative_path() {
    let dir: TempDir = TempDir::new().unwrap();
    create_test_tree(dir.path());

    let root: PathBuf = dir.path().join("subdir");
    let names: BTreeSet<String> = walk_all(dir.path(), WalkOptions::new().with_relative_path("subdir"))
        .iter()
        .map(|e| rel(&root, &e.path()))
        .collect();

    let expected: BTreeSet<String> = ["a.txt", "nested", "nested/deep.txt"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(names, expected);
}

#[test]
fn test_relative_path_cannot_escape() {
    let dir: TempDir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("mnt")).unwrap();
    std::fs::create_dir(dir.path().join("outside")).unwrap();
    std::os::unix::fs::symlink("../outside", dir.path().join("mnt/link")).unwrap();

    let escape: Result<DirectoryWalker, FileSystemError> =
        DirectoryWalker::new(dir.path().join("mnt"), WalkOptions::new().with_relative_path("../outside"));
    assert!(matches!(escape, Err(FileSystemError::Sys(_))));

    let via_link: Result<DirectoryWalker, FileSystemError> =
        DirectoryWalker::new(dir.path().join("mnt"), WalkOptions::new().with_relative_path("link"));
    assert!(matches!(via_link, Err(FileSystemError::Sys(_))));
}

#[test]
fn test_filesystem_source() {
    let dir: TempDir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("f"), b"x").unwrap();

    let mismatch: Result<DirectoryWalker, FileSystemError> = DirectoryWalker::new(
        dir.path(),
        WalkOptions::new().with_filesystem_source("no-such-source:/nowhere"),
    );
    assert!(matches!(
        mismatch,
        Err(FileSystemError::SourceMismatch { .. }) | Err(FileSystemError::MountNotFound { .. })
    ));

    let entries: Vec<WalkEntry> = walk_all(dir.path(), WalkOptions::default());
    let Some(mnt_id) = entries[0].metadata.mnt_id else {
        return; // kernel does not report mount ids
    };
    let source: String = mount_source(mnt_id).unwrap().unwrap();
    let matched: Vec<WalkEntry> = walk_all(dir.path(), WalkOptions::new().with_filesystem_source(source));
    assert_eq!(matched.len(), 1);
}

// ============================================================================
// Depth limit
// ============================================================================

#[test]
fn test_depth_limit_is_fatal() {
    let dir: TempDir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("d1/d2/d3")).unwrap();
    std::fs::write(dir.path().join("d1/d2/d3/f.txt"), b"x").unwrap();

    let mut walker: DirectoryWalker =
        DirectoryWalker::new(dir.path(), WalkOptions::new().with_max_depth(3)).unwrap();

    let d1: WalkEntry = walker.next().unwrap().unwrap();
    let d2: WalkEntry = walker.next().unwrap().unwrap();
    assert_eq!(d1.name, "d1");
    assert_eq!(d2.name, "d2");

    match walker.next() {
        Some(Err(FileSystemError::DepthExceeded { max_depth, path })) => {
            assert_eq!(max_depth, 3);
            assert!(path.ends_with("d1/d2/d3"));
        }
        other => panic!("expected DepthExceeded, got {:?}", other.map(|r| r.map(|e| e.path()))),
    }
    assert!(walker.next().is_none());

    // Items yielded before the failure stay usable.
    assert!(File::from(d1.into_fd()).metadata().unwrap().is_dir());
}

// ============================================================================
// Birth-time filter
// ============================================================================

#[test]
fn test_btime_filter() {
    let dir: TempDir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/new.txt"), b"n").unwrap();
    std::fs::write(dir.path().join("top.txt"), b"t").unwrap();

    let entries: Vec<WalkEntry> = walk_all(dir.path(), WalkOptions::default());
    let Some(born) = entries.iter().filter_map(|e| e.metadata.btime).map(|t| t.sec).min() else {
        return; // filesystem does not record birth time
    };

    let names: Vec<String> = walk_names(dir.path(), WalkOptions::new().with_btime_cutoff(born - 1));
    assert_eq!(names, vec!["sub".to_string()]);

    let all: Vec<String> = walk_names(dir.path(), WalkOptions::new().with_btime_cutoff(i64::MAX));
    assert_eq!(all.len(), 3);
}

// ============================================================================
// skip()
// ============================================================================

#[test]
fn test_skip_directory() {
    let dir: TempDir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("keep")).unwrap();
    std::fs::write(dir.path().join("keep/a.txt"), b"a").unwrap();
    std::fs::create_dir_all(dir.path().join("skipme/inner")).unwrap();
    std::fs::write(dir.path().join("skipme/b.txt"), b"b").unwrap();
    std::fs::write(dir.path().join("c.txt"), b"c").unwrap();

    let mut walker: DirectoryWalker = DirectoryWalker::new(dir.path(), WalkOptions::default()).unwrap();
    assert!(matches!(DirectoryWalker::skip(&mut walker), Err(FileSystemError::SkipNotDirectory)));

    let mut names: BTreeSet<String> = BTreeSet::new();
    while let Some(item) = walker.next() {
        let entry: WalkEntry = item.unwrap();
        if entry.name == "skipme" {
            DirectoryWalker::skip(&mut walker).unwrap();
            assert!(matches!(DirectoryWalker::skip(&mut walker), Err(FileSystemError::SkipNotDirectory)));
        } else if !entry.is_dir {
            let err: FileSystemError = DirectoryWalker::skip(&mut walker).unwrap_err();
            assert!(!err.is_fatal());
        }
        names.insert(rel(dir.path(), &entry.path()));
    }

    let expected: BTreeSet<String> = ["keep", "keep/a.txt", "skipme", "c.txt"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(names, expected);
}

// ============================================================================
// Resume
// ============================================================================

#[test]
fn test_resume_from_checkpoint() {
    let dir: TempDir = TempDir::new().unwrap();
    create_three_level_tree(dir.path());
    let root: &Path = dir.path();

    let full: Vec<String> = walk_names(root, WalkOptions::default());

    let mut walker: DirectoryWalker = DirectoryWalker::new(root, WalkOptions::default()).unwrap();
    let mut before: Vec<String> = Vec::new();
    let mut after: Vec<String> = Vec::new();
    let mut checkpoint: Option<Vec<DirStackEntry>> = None;
    let mut leaf_dirs: usize = 0;
    while let Some(item) = walker.next() {
        let entry: WalkEntry = item.unwrap();
        let name: String = rel(root, &entry.path());
        if checkpoint.is_some() {
            after.push(name);
            continue;
        }
        let is_leaf_dir: bool = entry.is_dir && name.matches('/').count() == 1;
        before.push(name);
        if is_leaf_dir {
            leaf_dirs += 1;
            if leaf_dirs == 2 {
                checkpoint = Some(walker.dir_stack());
            }
        }
    }
    let checkpoint: Vec<DirStackEntry> = checkpoint.unwrap();
    assert_eq!(checkpoint.len(), 3);
    assert_eq!(checkpoint[0].path, root);
    assert_eq!(before.iter().chain(after.iter()).cloned().collect::<Vec<_>>(), full);

    // The checkpoint survives persistence.
    let saved: String = serde_json::to_string(&checkpoint).unwrap();
    let restored: Vec<DirStackEntry> = serde_json::from_str(&saved).unwrap();

    let mut resumed_walker: DirectoryWalker =
        DirectoryWalker::new(root, WalkOptions::new().with_checkpoint(restored)).unwrap();
    assert!(resumed_walker.is_restoring());

    let resumed: Vec<String> = resumed_walker
        .by_ref()
        .map(|item| rel(root, &item.unwrap().path()))
        .collect();

    assert_eq!(resumed, after);
    assert!(!resumed_walker.is_restoring());
    assert_eq!(resumed_walker.get_stats().count, after.len() as u64);
}

#[test]
fn test_single_frame_checkpoint_starts_fresh() {
    let dir: TempDir = TempDir::new().unwrap();
    create_test_tree(dir.path());

    let checkpoint: Vec<DirStackEntry> = vec![DirStackEntry {
        path: dir.path().to_path_buf(),
        inode: std::fs::metadata(dir.path()).unwrap().ino(),
    }];
    let walker: DirectoryWalker =
        DirectoryWalker::new(dir.path(), WalkOptions::new().with_checkpoint(checkpoint)).unwrap();

    assert!(!walker.is_restoring());
    assert_eq!(walker.count(), 7);
}

#[test]
fn test_resume_missing_inode_fails() {
    let dir: TempDir = TempDir::new().unwrap();
    create_test_tree(dir.path());
    let root_ino: u64 = std::fs::metadata(dir.path()).unwrap().ino();

    let checkpoint: Vec<DirStackEntry> = vec![
        DirStackEntry {
            path: dir.path().to_path_buf(),
            inode: root_ino,
        },
        DirStackEntry {
            path: dir.path().join("gone"),
            inode: u64::MAX - 7,
        },
    ];
    let mut walker: DirectoryWalker =
        DirectoryWalker::new(dir.path(), WalkOptions::new().with_checkpoint(checkpoint)).unwrap();

    match walker.next() {
        Some(Err(FileSystemError::RestoreFailed { depth, path })) => {
            assert_eq!(depth, 1);
            assert_eq!(path, dir.path().display().to_string());
        }
        other => panic!("expected RestoreFailed, got {:?}", other.map(|r| r.map(|e| e.path()))),
    }
    assert!(walker.next().is_none());
}

#[test]
fn test_resume_wrong_root_fails() {
    let dir: TempDir = TempDir::new().unwrap();
    create_test_tree(dir.path());
    let root_ino: u64 = std::fs::metadata(dir.path()).unwrap().ino();
    let subdir_ino: u64 = std::fs::metadata(dir.path().join("subdir")).unwrap().ino();

    let checkpoint: Vec<DirStackEntry> = vec![
        DirStackEntry {
            path: dir.path().to_path_buf(),
            inode: root_ino.wrapping_add(12_345),
        },
        DirStackEntry {
            path: dir.path().join("subdir"),
            inode: subdir_ino,
        },
    ];
    let err: FileSystemError =
        DirectoryWalker::new(dir.path(), WalkOptions::new().with_checkpoint(checkpoint))
            .err()
            .unwrap();
    assert!(matches!(err, FileSystemError::RestoreFailed { depth: 0, .. }));
}

#[test]
fn test_checkpoint_frame_without_inode_is_rejected() {
    let dir: TempDir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("file1.txt"), b"x").unwrap();
    std::fs::create_dir(dir.path().join("d1")).unwrap();
    std::fs::write(dir.path().join("d1/in.txt"), b"y").unwrap();
    std::fs::create_dir(dir.path().join("d2")).unwrap();
    let root_ino: u64 = std::fs::metadata(dir.path()).unwrap().ino();

    let checkpoint: Vec<DirStackEntry> = vec![
        DirStackEntry {
            path: dir.path().to_path_buf(),
            inode: root_ino,
        },
        DirStackEntry {
            path: dir.path().join("d1"),
            inode: 0,
        },
    ];
    let err: FileSystemError =
        DirectoryWalker::new(dir.path(), WalkOptions::new().with_checkpoint(checkpoint))
            .err()
            .unwrap();
    assert!(matches!(err, FileSystemError::InvalidCheckpoint { depth: 1 }));
}

#[test]
fn test_checkpoint_deeper_than_limit_is_rejected() {
    let dir: TempDir = TempDir::new().unwrap();
    create_three_level_tree(dir.path());
    let frame = |path: PathBuf| DirStackEntry {
        inode: std::fs::metadata(&path).unwrap().ino(),
        path,
    };

    let checkpoint: Vec<DirStackEntry> = vec![
        frame(dir.path().to_path_buf()),
        frame(dir.path().join("alpha")),
        frame(dir.path().join("alpha/one")),
    ];
    let err: FileSystemError = DirectoryWalker::new(
        dir.path(),
        WalkOptions::new().with_max_depth(2).with_checkpoint(checkpoint),
    )
    .err()
    .unwrap();
    assert!(matches!(err, FileSystemError::InvalidCheckpoint { depth: 2 }));
}

// ============================================================================
// Reporting
// ============================================================================

fn create_flat_files(dir: &Path, n: usize) {
    for i in 0..n {
        std::fs::write(dir.join(format!("f{}.txt", i)), b"12345").unwrap();
    }
}

#[test]
fn test_reporting_every_increment() {
    let dir: TempDir = TempDir::new().unwrap();
    create_flat_files(dir.path(), 5);

    let reports: Arc<Mutex<Vec<WalkProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let reports_clone: Arc<Mutex<Vec<WalkProgress>>> = reports.clone();
    let options: WalkOptions = WalkOptions::new().with_reporting(
        2,
        progress_fn(move |p: &WalkProgress| {
            reports_clone.lock().unwrap().push(p.clone());
            true
        }),
    );

    assert_eq!(walk_all(dir.path(), options).len(), 5);

    let reports: Vec<WalkProgress> = reports.lock().unwrap().clone();
    let counts: Vec<u64> = reports.iter().map(|p| p.stats.count).collect();
    assert_eq!(counts, vec![2, 4]);
    assert_eq!(reports[1].stats.bytes, 20);
    assert_eq!(reports[0].stats.current_directory, dir.path());
    assert_eq!(reports[0].dir_stack.len(), 1);
    assert_eq!(reports[0].dir_stack[0].path, dir.path());
}

#[test]
fn test_reporting_increment_zero_disables() {
    let dir: TempDir = TempDir::new().unwrap();
    create_flat_files(dir.path(), 3);

    let calls: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
    let calls_clone: Arc<Mutex<u32>> = calls.clone();
    let options: WalkOptions = WalkOptions::new().with_reporting(
        0,
        progress_fn(move |_: &WalkProgress| {
            *calls_clone.lock().unwrap() += 1;
            true
        }),
    );

    assert_eq!(walk_all(dir.path(), options).len(), 3);
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[test]
fn test_reporting_callback_aborts() {
    let dir: TempDir = TempDir::new().unwrap();
    create_flat_files(dir.path(), 5);

    let options: WalkOptions =
        WalkOptions::new().with_reporting(2, progress_fn(|p: &WalkProgress| p.stats.count < 2));
    let mut walker: DirectoryWalker = DirectoryWalker::new(dir.path(), options).unwrap();

    assert!(walker.next().unwrap().is_ok());
    assert!(matches!(
        walker.next(),
        Some(Err(FileSystemError::ReportingAborted { count: 2 }))
    ));
    assert!(walker.next().is_none());
}
