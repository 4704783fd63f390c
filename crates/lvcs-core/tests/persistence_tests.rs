use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use lvcs_core::{
    exactly, DirectoryStorage, LocalVcs, LvcsConfig, LvcsResult, ManualClock, Storage,
};

fn open(dir: &TempDir) -> LvcsResult<LocalVcs> {
    let storage = Arc::new(DirectoryStorage::open(dir.path()).unwrap());
    let clock = Arc::new(ManualClock::new(1_000));
    LocalVcs::open(storage, clock, LvcsConfig::default())
}

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let mut vcs = open(&dir).unwrap();
        vcs.create_directory("src").unwrap();
        vcs.create_file("src/main.rs", b"fn main() {}", 10).unwrap();
        vcs.change_file_content("src/main.rs", b"fn main() { run() }", 20)
            .unwrap();
        vcs.begin_change_set().unwrap();
        vcs.rename("src/main.rs", "lib.rs").unwrap();
        vcs.put_entry_label("src/lib.rs", "converted").unwrap();
        vcs.end_change_set(Some("Make it a library")).unwrap();
        vcs.save().unwrap();
    }

    let mut vcs = open(&dir).unwrap();
    assert!(!vcs.is_dirty());
    assert_eq!(vcs.get_revisions_for("src/lib.rs").unwrap().len(), 3);
    assert_eq!(
        vcs.get_byte_content("src/lib.rs", &exactly(20)).unwrap(),
        Some(b"fn main() {}".to_vec())
    );
    assert_eq!(vcs.get_recent_changes().len(), 1);

    // Ids keep counting from where the previous session stopped
    let id = vcs.create_file("src/extra.rs", b"", 30).unwrap();
    assert_eq!(id.get(), 2);
}

#[test]
fn test_save_is_a_no_op_when_clean() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DirectoryStorage::open(dir.path()).unwrap());
    let clock = Arc::new(ManualClock::new(0));
    let mut vcs = LocalVcs::new(storage.clone(), clock, LvcsConfig::default());

    vcs.save().unwrap();
    assert!(storage.read_state().unwrap().is_none());

    vcs.create_file("f", b"x", 1).unwrap();
    vcs.save().unwrap();
    let saved = storage.read_state().unwrap().unwrap();

    storage.write_state(b"sentinel").unwrap();
    vcs.save().unwrap();
    assert_eq!(storage.read_state().unwrap().unwrap(), b"sentinel");
    assert!(!saved.is_empty());
}

#[test]
fn test_open_change_set_is_not_saved() {
    let dir = TempDir::new().unwrap();
    {
        let mut vcs = open(&dir).unwrap();
        vcs.create_file("committed", b"1", 1).unwrap();
        vcs.begin_change_set().unwrap();
        vcs.create_file("pending", b"2", 2).unwrap();
        vcs.save().unwrap();
        assert!(vcs.is_dirty());
    }

    let vcs = open(&dir).unwrap();
    assert!(vcs.has_entry("committed"));
    assert!(!vcs.has_entry("pending"));
}

#[test]
fn test_rejected_rename_keeps_state_loadable() {
    let dir = TempDir::new().unwrap();
    {
        let mut vcs = open(&dir).unwrap();
        vcs.create_directory("d").unwrap();
        vcs.create_file("d/f", b"content", 1).unwrap();
        assert!(vcs.rename("d/f", "x/y").is_err());
        assert!(vcs.rename("d", "").is_err());
        vcs.save().unwrap();
    }

    let vcs = open(&dir).unwrap();
    assert!(vcs.has_entry("d/f"));
    assert_eq!(vcs.change_list().len(), 2);
}

#[test]
fn test_corrupted_state_needs_rebuild() {
    let dir = TempDir::new().unwrap();
    {
        let mut vcs = open(&dir).unwrap();
        vcs.create_file("f", b"content", 1).unwrap();
        vcs.save().unwrap();
    }
    let state = dir.path().join("state.bin");
    let mut bytes = fs::read(&state).unwrap();
    bytes.truncate(bytes.len() / 2);
    fs::write(&state, bytes).unwrap();

    let err = open(&dir).err().unwrap();
    assert!(err.is_rebuild_needed());

    let storage = Arc::new(DirectoryStorage::open(dir.path()).unwrap());
    let vcs = LocalVcs::open_or_rebuild(
        storage.clone(),
        Arc::new(ManualClock::new(0)),
        LvcsConfig::default(),
    )
    .unwrap();
    assert!(vcs.roots().is_empty());
    assert!(vcs.change_list().is_empty());
    assert!(storage.read_state().unwrap().is_none());
}

#[test]
fn test_purge_and_save_drops_old_history() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DirectoryStorage::open(dir.path()).unwrap());
    let clock = Arc::new(ManualClock::new(0));
    let config = LvcsConfig {
        purge_period_ms: 100,
        ..LvcsConfig::default()
    };
    let mut vcs = LocalVcs::new(storage.clone(), clock.clone(), config.clone());
    vcs.create_file("f", b"v1", 0).unwrap();
    vcs.change_file_content("f", b"v2", 50).unwrap();
    vcs.change_file_content("f", b"v3", 500).unwrap();

    clock.set(450);
    assert_eq!(vcs.purge_obsolete_and_save().unwrap(), 1);

    let reopened = LocalVcs::open(storage, clock, config).unwrap();
    assert_eq!(reopened.change_list().len(), 1);
    assert_eq!(
        reopened.get_byte_content("f", &exactly(500)).unwrap(),
        Some(b"v2".to_vec())
    );
}
