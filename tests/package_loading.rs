//! Package loading diagnostics: one bad definition never takes down its
//! neighbors, and unparseable files only cost their own package.

mod common;

use common::{write_pack_file, Harness};
use questline::quest::QuestError;
use tempfile::TempDir;

#[test]
fn bad_definitions_are_skipped_individually() {
    let dir = TempDir::new().unwrap();
    write_pack_file(
        dir.path(),
        "town",
        "conditions.toml",
        concat!(
            "healthy = 'health 10'\n",
            "broken = 'health lots'\n",
            "mystery = 'nosuchtype 1'\n",
            "vip = 'tag vip'\n",
        ),
    );
    write_pack_file(
        dir.path(),
        "town",
        "events.toml",
        concat!(
            "welcome = 'message Welcome to town'\n",
            "broken = 'tag flip x'\n",
        ),
    );
    let mut h = Harness::load(dir);
    h.engine.player_join("alice").unwrap();

    // The three good definitions work, the two bad ones resolve to nothing.
    assert!(h.engine.condition("alice", "town.healthy"));
    assert!(!h.engine.condition("alice", "town.broken"));
    assert!(!h.engine.condition("alice", "town.mystery"));
    assert!(h.engine.fire(Some("alice"), "town.welcome"));
    assert!(!h.engine.fire(Some("alice"), "town.broken"));
}

#[test]
fn unparseable_package_spares_the_others() {
    let dir = TempDir::new().unwrap();
    write_pack_file(dir.path(), "good", "events.toml", "hi = 'message hello'\n");
    write_pack_file(dir.path(), "bad", "events.toml", "not toml [[[");
    let mut h = Harness::load(dir);
    h.engine.player_join("alice").unwrap();

    assert!(h.engine.fire(Some("alice"), "good.hi"));
    assert!(h.engine.packs().get("bad").is_none());
}

#[test]
fn invalid_conversations_are_dropped_not_fatal() {
    let dir = TempDir::new().unwrap();
    write_pack_file(dir.path(), "inn", "events.toml", "hi = 'message hello'\n");
    write_pack_file(
        dir.path(),
        "inn",
        "conversations/good.json",
        r#"{"quester":"Innkeeper","first":"hi","npc_options":{"hi":{"text":"Hello"}}}"#,
    );
    write_pack_file(
        dir.path(),
        "inn",
        "conversations/dangling.json",
        r#"{"quester":"Ghost","first":"hi","npc_options":{"hi":{"text":"Boo","pointers":"missing"}}}"#,
    );
    let mut h = Harness::load(dir);
    h.engine.player_join("alice").unwrap();

    assert!(h.engine.packs().conversation("inn.good").is_some());
    assert!(h.engine.packs().conversation("inn.dangling").is_none());
    assert!(matches!(
        h.engine.start_conversation("alice", "inn.dangling"),
        Err(QuestError::UnknownReference(_))
    ));
}

#[test]
fn reload_swaps_definitions_atomically() {
    let dir = TempDir::new().unwrap();
    write_pack_file(dir.path(), "town", "events.toml", "hi = 'message old'\n");
    let mut h = Harness::load(dir);
    h.engine.player_join("alice").unwrap();
    assert!(h.engine.fire(Some("alice"), "town.hi"));

    write_pack_file(
        h.dir.path(),
        "town",
        "events.toml",
        "hi = 'message new'\nbye = 'message farewell'\n",
    );
    h.engine
        .load_packs(&h.dir.path().join("packages"))
        .unwrap();
    assert!(h.engine.fire(Some("alice"), "town.bye"));
    let log = h.log();
    assert!(log.contains(&"msg|alice|old".to_string()));
    assert!(log.contains(&"msg|alice|farewell".to_string()));
}
