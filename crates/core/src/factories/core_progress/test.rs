use super::*;
use std::time::Duration;
use supernode_test_utils::clock::ManualClock;

const TASK_1: &str = "task-1";
const CDN: &str = "cdn";

fn create() -> (CoreProgressMgr, ManualClock) {
    let clock = ManualClock::default();
    let mgr =
        CoreProgressMgr::new(CoreProgressConfig::default(), clock.as_dyn());
    (mgr, clock)
}

/// A manager with TASK_1 (10 bytes, 3 pieces) and a registered CDN peer.
fn create_with_task() -> (CoreProgressMgr, ManualClock) {
    let (mgr, clock) = create();
    mgr.register_task(TASK_1.into(), 10, 3).unwrap();
    mgr.register_peer(TASK_1.into(), CDN.into(), "10.0.0.1:8001")
        .unwrap();
    (mgr, clock)
}

fn is_invalid<T: std::fmt::Debug>(r: SnResult<T>) -> bool {
    matches!(r, Err(SnError::InvalidArgument { .. }))
}

#[test]
fn register_task_validates_input() {
    let (mgr, _) = create();

    assert!(is_invalid(mgr.register_task("".into(), 10, 3)));
    assert!(is_invalid(mgr.register_task(TASK_1.into(), 10, 0)));
    assert!(is_invalid(mgr.register_task(TASK_1.into(), 2, 3)));
    assert!(is_invalid(mgr.register_task(
        TASK_1.into(),
        u64::MAX,
        (1 << 20) + 1
    )));
    assert!(mgr.get_task(&TASK_1.into()).unwrap_err().is_not_found());
}

#[test]
fn register_task_is_idempotent_for_same_geometry() {
    let (mgr, clock) = create();

    let first = mgr.register_task(TASK_1.into(), 10, 3).unwrap();
    assert_eq!(CdnStatus::NotStarted, first.cdn_status);
    assert_eq!(clock.now(), first.created_at);

    mgr.update_task_cdn_status(&TASK_1.into(), CdnStatus::InProgress)
        .unwrap();
    clock.advance(Duration::from_secs(1));

    let again = mgr.register_task(TASK_1.into(), 10, 3).unwrap();
    assert_eq!(first.created_at, again.created_at);
    assert_eq!(CdnStatus::InProgress, again.cdn_status);

    assert!(is_invalid(mgr.register_task(TASK_1.into(), 20, 3)));
}

#[test]
fn update_task_cdn_status() {
    let (mgr, _) = create_with_task();

    mgr.update_task_cdn_status(&TASK_1.into(), CdnStatus::Complete)
        .unwrap();
    assert_eq!(
        CdnStatus::Complete,
        mgr.get_task(&TASK_1.into()).unwrap().cdn_status
    );

    assert!(mgr
        .update_task_cdn_status(&"nope".into(), CdnStatus::Failed)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn client_lifecycle() {
    let (mgr, clock) = create_with_task();
    let task: TaskId = TASK_1.into();
    let client: ClientId = "client-1".into();

    assert!(mgr
        .register_client("nope".into(), client.clone())
        .unwrap_err()
        .is_not_found());
    assert!(is_invalid(mgr.register_client(task.clone(), "".into())));

    mgr.register_client(task.clone(), client.clone()).unwrap();
    let c = mgr.get_client(&task, &client).unwrap();
    assert_eq!(ClientStatus::Active, c.status);
    assert_eq!(clock.now(), c.started_at);

    clock.advance(Duration::from_secs(5));
    mgr.touch_client(&task, &client).unwrap();
    let c = mgr.get_client(&task, &client).unwrap();
    assert_eq!(clock.now(), c.last_active);
    assert!(c.started_at < c.last_active);

    mgr.finish_client(&task, &client).unwrap();
    assert_eq!(
        ClientStatus::Finished,
        mgr.get_client(&task, &client).unwrap().status
    );

    mgr.remove_client(&task, &client).unwrap();
    assert!(mgr.get_client(&task, &client).unwrap_err().is_not_found());
    assert!(mgr.remove_client(&task, &client).unwrap_err().is_not_found());
    assert!(mgr.touch_client(&task, &client).unwrap_err().is_not_found());
}

#[test]
fn fail_client_keeps_last_active() {
    let (mgr, clock) = create_with_task();
    let task: TaskId = TASK_1.into();
    let client: ClientId = "client-1".into();
    mgr.register_client(task.clone(), client.clone()).unwrap();
    let before = mgr.get_client(&task, &client).unwrap().last_active;

    clock.advance(Duration::from_secs(5));
    mgr.fail_client(&task, &client).unwrap();

    let c = mgr.get_client(&task, &client).unwrap();
    assert_eq!(ClientStatus::Failed, c.status);
    assert_eq!(before, c.last_active);
}

#[test]
fn client_keys_do_not_collide() {
    let (mgr, _) = create();
    mgr.register_task("a:b".into(), 10, 1).unwrap();
    mgr.register_task("a".into(), 10, 1).unwrap();

    mgr.register_client("a:b".into(), "c".into()).unwrap();

    assert!(mgr
        .get_client(&"a".into(), &"b:c".into())
        .unwrap_err()
        .is_not_found());
}

#[test]
fn stale_clients() {
    let (mgr, clock) = create_with_task();
    mgr.register_client(TASK_1.into(), "old".into()).unwrap();
    clock.advance(Duration::from_secs(10));
    let cutoff = clock.now();
    mgr.register_client(TASK_1.into(), "new".into()).unwrap();

    let stale = mgr.stale_clients(cutoff);
    assert_eq!(1, stale.len());
    assert_eq!("old", &*stale[0].client_id);
}

#[test]
fn register_peer_validates_input() {
    let (mgr, _) = create_with_task();

    assert!(is_invalid(mgr.register_peer(TASK_1.into(), "".into(), "h:1")));
    assert!(is_invalid(mgr.register_peer("".into(), "p".into(), "h:1")));
    assert!(is_invalid(mgr.register_peer(TASK_1.into(), "p".into(), "")));
    assert!(mgr
        .register_peer("nope".into(), "p".into(), "h:1")
        .unwrap_err()
        .is_not_found());
}

#[test]
fn re_register_peer_replaces_state() {
    let (mgr, _) = create_with_task();
    let peer: PeerId = "p1".into();
    mgr.register_peer(TASK_1.into(), peer.clone(), "h:1").unwrap();
    mgr.update_peer_pieces(&peer, &[0, 1]).unwrap();

    mgr.register_peer(TASK_1.into(), peer.clone(), "h:2").unwrap();

    let p = mgr.get_peer(&peer).unwrap();
    assert_eq!("h:2", &*p.location);
    assert!(p.pieces.is_empty());
    assert_eq!(PeerStatus::Registered, p.status);
}

#[test]
fn update_peer_pieces_merges_and_never_shrinks() {
    let (mgr, clock) = create_with_task();
    let peer: PeerId = "p1".into();
    mgr.register_peer(TASK_1.into(), peer.clone(), "h:1").unwrap();
    clock.advance(Duration::from_secs(1));

    mgr.update_peer_pieces(&peer, &[0, 2]).unwrap();
    mgr.update_peer_pieces(&peer, &[2]).unwrap();

    let p = mgr.get_peer(&peer).unwrap();
    assert_eq!(BTreeSet::from([0, 2]), p.pieces);
    assert_eq!(PeerStatus::Running, p.status);
    assert_eq!(clock.now(), p.last_heartbeat);
    assert_eq!(BTreeSet::from([1]), mgr.get_missing_pieces(&peer).unwrap());

    // out of range rejects the whole update
    assert!(is_invalid(mgr.update_peer_pieces(&peer, &[1, 3])));
    assert_eq!(
        BTreeSet::from([0, 2]),
        mgr.get_peer_bitmap(&peer).unwrap()
    );
}

#[test]
fn peer_status_transitions() {
    let (mgr, clock) = create_with_task();
    let peer: PeerId = "p1".into();
    mgr.register_peer(TASK_1.into(), peer.clone(), "h:1").unwrap();

    mgr.disappear_peer(&peer).unwrap();
    assert_eq!(PeerStatus::Disappeared, mgr.get_peer(&peer).unwrap().status);

    // heartbeat revives a disappeared peer
    clock.advance(Duration::from_secs(1));
    mgr.touch_peer(&peer).unwrap();
    let p = mgr.get_peer(&peer).unwrap();
    assert_eq!(PeerStatus::Running, p.status);
    assert_eq!(clock.now(), p.last_heartbeat);

    // but never a failed one
    mgr.fail_peer(&peer).unwrap();
    mgr.touch_peer(&peer).unwrap();
    assert_eq!(PeerStatus::Failed, mgr.get_peer(&peer).unwrap().status);
    mgr.disappear_peer(&peer).unwrap();
    assert_eq!(PeerStatus::Failed, mgr.get_peer(&peer).unwrap().status);

    mgr.finish_peer(&peer).unwrap();
    assert_eq!(PeerStatus::Finished, mgr.get_peer(&peer).unwrap().status);
}

#[test]
fn remove_peer_then_bitmap_is_not_found() {
    let (mgr, _) = create_with_task();
    let peer: PeerId = "p1".into();
    mgr.register_peer(TASK_1.into(), peer.clone(), "h:1").unwrap();
    mgr.update_peer_pieces(&peer, &[0]).unwrap();

    mgr.remove_peer(&peer).unwrap();

    assert!(mgr.get_peer_bitmap(&peer).unwrap_err().is_not_found());
    assert!(mgr.remove_peer(&peer).unwrap_err().is_not_found());
    assert!(mgr.touch_peer(&peer).unwrap_err().is_not_found());
    assert!(is_invalid(mgr.get_peer_bitmap(&"".into())));
}

#[test]
fn list_and_stale_peers() {
    let (mgr, clock) = create_with_task();
    mgr.register_task("task-2".into(), 10, 1).unwrap();
    mgr.register_peer(TASK_1.into(), "b".into(), "h:1").unwrap();
    mgr.register_peer("task-2".into(), "a".into(), "h:2").unwrap();
    clock.advance(Duration::from_secs(1));
    let cutoff = clock.now();
    mgr.touch_peer(&"b".into()).unwrap();

    let ids: Vec<PeerId> = mgr
        .list_peers(&TASK_1.into())
        .unwrap()
        .iter()
        .map(|p| p.peer_id.clone())
        .collect();
    assert_eq!(vec![PeerId::from("b"), PeerId::from(CDN)], ids);

    let mut stale: Vec<PeerId> = mgr
        .stale_peers(cutoff)
        .iter()
        .map(|p| p.peer_id.clone())
        .collect();
    stale.sort();
    assert_eq!(vec![PeerId::from("a"), PeerId::from(CDN)], stale);

    assert!(mgr.list_peers(&"nope".into()).unwrap_err().is_not_found());
}

#[test]
fn record_piece_creates_on_first_sight() {
    let (mgr, clock) = create_with_task();
    let task: TaskId = TASK_1.into();
    clock.advance(Duration::from_secs(1));

    mgr.record_piece(&task, 2, "md5-2", &CDN.into()).unwrap();

    let piece = mgr.get_piece(&task, 2).unwrap();
    assert_eq!("md5-2", &*piece.checksum);
    assert_eq!(4, piece.size);
    assert_eq!(PeerId::from(CDN), piece.last_source);
    assert_eq!(BTreeSet::from([PeerId::from(CDN)]), piece.sources);

    // the reporter's bitmap follows
    let cdn = mgr.get_peer(&CDN.into()).unwrap();
    assert_eq!(BTreeSet::from([2]), cdn.pieces);
    assert_eq!(PeerStatus::Running, cdn.status);
    assert_eq!(clock.now(), cdn.last_heartbeat);
}

#[test]
fn record_piece_same_checksum_is_idempotent_and_merges_sources() {
    let (mgr, _) = create_with_task();
    let task: TaskId = TASK_1.into();
    mgr.register_peer(task.clone(), "p1".into(), "h:1").unwrap();

    mgr.record_piece(&task, 0, "aa", &CDN.into()).unwrap();
    mgr.record_piece(&task, 0, "aa", &CDN.into()).unwrap();
    assert_eq!(1, mgr.piece_sources(&task, 0).unwrap().len());

    mgr.record_piece(&task, 0, "aa", &"p1".into()).unwrap();
    let piece = mgr.get_piece(&task, 0).unwrap();
    assert_eq!(
        BTreeSet::from([PeerId::from(CDN), PeerId::from("p1")]),
        piece.sources
    );
    assert_eq!(PeerId::from("p1"), piece.last_source);
}

#[test]
fn record_piece_checksum_mismatch() {
    let (mgr, _) = create_with_task();
    let task: TaskId = TASK_1.into();
    mgr.register_peer(task.clone(), "p1".into(), "h:1").unwrap();
    mgr.record_piece(&task, 1, "aa", &CDN.into()).unwrap();

    let err = mgr.record_piece(&task, 1, "bb", &"p1".into()).unwrap_err();

    match err {
        SnError::ChecksumMismatch {
            piece,
            recorded,
            reported,
            ..
        } => {
            assert_eq!(1, piece);
            assert_eq!("aa", &*recorded);
            assert_eq!("bb", &*reported);
        }
        oth => panic!("unexpected {oth:?}"),
    }

    // nothing changed for the disputing peer
    assert_eq!(1, mgr.piece_sources(&task, 1).unwrap().len());
    assert!(mgr.get_peer_bitmap(&"p1".into()).unwrap().is_empty());
}

#[test]
fn record_piece_validates_input() {
    let (mgr, _) = create_with_task();
    let task: TaskId = TASK_1.into();
    mgr.register_task("task-2".into(), 10, 3).unwrap();
    mgr.register_peer("task-2".into(), "other".into(), "h:1").unwrap();

    assert!(is_invalid(mgr.record_piece(&task, 3, "aa", &CDN.into())));
    assert!(is_invalid(mgr.record_piece(&task, 0, "", &CDN.into())));
    assert!(is_invalid(mgr.record_piece(&"".into(), 0, "aa", &CDN.into())));
    assert!(is_invalid(mgr.record_piece(&task, 0, "aa", &"".into())));
    assert!(is_invalid(mgr.record_piece(&task, 0, "aa", &"other".into())));
    assert!(mgr
        .record_piece(&task, 0, "aa", &"ghost".into())
        .unwrap_err()
        .is_not_found());
    assert!(mgr
        .record_piece(&"nope".into(), 0, "aa", &CDN.into())
        .unwrap_err()
        .is_not_found());

    assert!(mgr.list_available_pieces(&task).unwrap().is_empty());
}

#[test]
fn task_completes_when_every_piece_is_recorded() {
    let (mgr, _) = create_with_task();
    let task: TaskId = TASK_1.into();

    mgr.record_piece(&task, 0, "c0", &CDN.into()).unwrap();
    mgr.record_piece(&task, 1, "c1", &CDN.into()).unwrap();
    assert!(!mgr.is_task_complete(&task).unwrap());
    assert_eq!(
        BTreeSet::from([0, 1]),
        mgr.list_available_pieces(&task).unwrap()
    );

    mgr.record_piece(&task, 2, "c2", &CDN.into()).unwrap();
    assert!(mgr.is_task_complete(&task).unwrap());
    assert_eq!(
        BTreeSet::from([0, 1, 2]),
        mgr.list_available_pieces(&task).unwrap()
    );

    assert!(mgr.is_task_complete(&"nope".into()).unwrap_err().is_not_found());
}

#[test]
fn pick_source_peer_without_sources() {
    let (mgr, _) = create_with_task();

    assert!(matches!(
        mgr.pick_source_peer(&TASK_1.into(), 0),
        Err(SnError::NoSourceAvailable { piece: 0, .. })
    ));
    assert!(is_invalid(mgr.pick_source_peer(&TASK_1.into(), 3)));
}

#[test]
fn pick_source_peer_prefers_most_recently_active() {
    let (mgr, clock) = create_with_task();
    let task: TaskId = TASK_1.into();
    mgr.register_peer(task.clone(), "p1".into(), "h:1").unwrap();
    mgr.register_peer(task.clone(), "p2".into(), "h:2").unwrap();

    mgr.record_piece(&task, 0, "aa", &"p1".into()).unwrap();
    mgr.record_piece(&task, 0, "aa", &"p2".into()).unwrap();

    clock.advance(Duration::from_secs(1));
    mgr.touch_peer(&"p1".into()).unwrap();
    assert_eq!(PeerId::from("p1"), mgr.pick_source_peer(&task, 0).unwrap());

    clock.advance(Duration::from_secs(1));
    mgr.touch_peer(&"p2".into()).unwrap();
    assert_eq!(PeerId::from("p2"), mgr.pick_source_peer(&task, 0).unwrap());
}

#[test]
fn pick_source_peer_breaks_ties_by_peer_id() {
    let (mgr, _) = create_with_task();
    let task: TaskId = TASK_1.into();
    mgr.register_peer(task.clone(), "zed".into(), "h:1").unwrap();
    mgr.register_peer(task.clone(), "amy".into(), "h:2").unwrap();

    // the clock never moves, every heartbeat is equal
    mgr.record_piece(&task, 0, "aa", &"zed".into()).unwrap();
    mgr.record_piece(&task, 0, "aa", &"amy".into()).unwrap();

    assert_eq!(PeerId::from("amy"), mgr.pick_source_peer(&task, 0).unwrap());
}

#[test]
fn pick_source_peer_skips_dead_sources() {
    let (mgr, clock) = create_with_task();
    let task: TaskId = TASK_1.into();
    mgr.register_peer(task.clone(), "p1".into(), "h:1").unwrap();
    mgr.record_piece(&task, 0, "aa", &CDN.into()).unwrap();
    clock.advance(Duration::from_secs(1));
    mgr.record_piece(&task, 0, "aa", &"p1".into()).unwrap();
    assert_eq!(PeerId::from("p1"), mgr.pick_source_peer(&task, 0).unwrap());

    mgr.fail_peer(&"p1".into()).unwrap();
    assert_eq!(PeerId::from(CDN), mgr.pick_source_peer(&task, 0).unwrap());

    mgr.remove_peer(&CDN.into()).unwrap();
    assert!(matches!(
        mgr.pick_source_peer(&task, 0),
        Err(SnError::NoSourceAvailable { .. })
    ));

    // availability is a record of reports, not of live peers
    assert!(mgr.list_available_pieces(&task).unwrap().contains(&0));
}

#[test]
fn remove_task_cascades() {
    let (mgr, _) = create_with_task();
    let task: TaskId = TASK_1.into();
    mgr.register_task("task-2".into(), 10, 1).unwrap();
    mgr.register_peer("task-2".into(), "keep".into(), "h:1").unwrap();
    mgr.register_client(task.clone(), "c1".into()).unwrap();
    mgr.record_piece(&task, 0, "aa", &CDN.into()).unwrap();

    mgr.remove_task(&task).unwrap();

    assert!(mgr.get_task(&task).unwrap_err().is_not_found());
    assert!(mgr.get_peer(&CDN.into()).unwrap_err().is_not_found());
    assert!(mgr
        .get_client(&task, &"c1".into())
        .unwrap_err()
        .is_not_found());
    assert!(mgr.get_peer(&"keep".into()).is_ok());
    assert_eq!(2, mgr.store.len());

    assert!(mgr.remove_task(&task).unwrap_err().is_not_found());
}

#[test]
fn empty_ids_are_invalid_arguments_not_empty_keys() {
    let (mgr, _) = create();

    assert!(is_invalid(mgr.get_task(&"".into())));
    assert!(is_invalid(mgr.remove_task(&"".into())));
    assert!(is_invalid(mgr.get_peer(&"".into())));
    assert!(is_invalid(mgr.touch_client(&"t".into(), &"".into())));
    assert!(is_invalid(mgr.list_available_pieces(&"".into())));
    assert!(mgr.store.is_empty());
}

#[test]
fn concurrent_peer_registration() {
    let (mgr, _) = create();
    let task: TaskId = TASK_1.into();
    mgr.register_task(task.clone(), 64, 64).unwrap();

    const N: u32 = 32;

    std::thread::scope(|scope| {
        for i in 0..N {
            let mgr = &mgr;
            let task = task.clone();
            scope.spawn(move || {
                let peer: PeerId = format!("peer-{i}").into();
                mgr.register_peer(task, peer.clone(), "h:1").unwrap();
                mgr.update_peer_pieces(&peer, &[i, i + 1]).unwrap();
                mgr.update_peer_pieces(&peer, &[i + 2]).unwrap();
            });
        }
    });

    assert_eq!(N as usize, mgr.list_peers(&task).unwrap().len());
    for i in 0..N {
        assert_eq!(
            BTreeSet::from([i, i + 1, i + 2]),
            mgr.get_peer_bitmap(&format!("peer-{i}").into()).unwrap()
        );
    }
}

#[test]
fn concurrent_piece_reports_keep_every_source() {
    let (mgr, _) = create_with_task();
    let task: TaskId = TASK_1.into();

    const N: usize = 16;
    for i in 0..N {
        mgr.register_peer(task.clone(), format!("p{i}").into(), "h:1")
            .unwrap();
    }

    std::thread::scope(|scope| {
        for i in 0..N {
            let mgr = &mgr;
            let task = &task;
            scope.spawn(move || {
                mgr.record_piece(task, 1, "aa", &format!("p{i}").into())
                    .unwrap();
            });
        }
    });

    assert_eq!(N, mgr.piece_sources(&task, 1).unwrap().len());
}

#[test]
fn tight_geometry_has_no_empty_pieces() {
    let (mgr, _) = create();
    let task: TaskId = "tight".into();
    mgr.register_task(task.clone(), 9, 4).unwrap();
    mgr.register_peer(task.clone(), CDN.into(), "h:1").unwrap();

    let mut sizes = Vec::new();
    for i in 0..4 {
        mgr.record_piece(&task, i, "aa", &CDN.into()).unwrap();
        sizes.push(mgr.get_piece(&task, i).unwrap().size);
    }

    assert_eq!(vec![2, 2, 2, 3], sizes);
}

#[test]
fn re_registered_peer_is_not_picked_until_it_reports_again() {
    let (mgr, clock) = create_with_task();
    let task: TaskId = TASK_1.into();
    let a: PeerId = "a".into();
    mgr.register_peer(task.clone(), a.clone(), "h:1").unwrap();
    mgr.record_piece(&task, 0, "aa", &a).unwrap();

    clock.advance(Duration::from_secs(1));
    mgr.register_peer(task.clone(), a.clone(), "h:2").unwrap();
    assert!(mgr.get_peer_bitmap(&a).unwrap().is_empty());

    // still listed as a source, but its own bitmap says otherwise
    assert!(mgr.piece_sources(&task, 0).unwrap().contains(&a));
    assert!(matches!(
        mgr.pick_source_peer(&task, 0),
        Err(SnError::NoSourceAvailable { piece: 0, .. })
    ));

    mgr.record_piece(&task, 0, "aa", &CDN.into()).unwrap();
    assert_eq!(PeerId::from(CDN), mgr.pick_source_peer(&task, 0).unwrap());

    mgr.update_peer_pieces(&a, &[0]).unwrap();
    assert_eq!(a, mgr.pick_source_peer(&task, 0).unwrap());
}

#[test]
fn peer_moved_to_another_task_is_not_picked() {
    let (mgr, _) = create_with_task();
    let task: TaskId = TASK_1.into();
    mgr.register_task("task-2".into(), 10, 3).unwrap();
    mgr.record_piece(&task, 0, "aa", &CDN.into()).unwrap();

    mgr.register_peer("task-2".into(), CDN.into(), "h:1").unwrap();
    mgr.update_peer_pieces(&CDN.into(), &[0]).unwrap();

    assert!(matches!(
        mgr.pick_source_peer(&task, 0),
        Err(SnError::NoSourceAvailable { .. })
    ));
}

#[test]
fn finished_peer_is_never_revived() {
    let (mgr, _) = create_with_task();
    let peer: PeerId = "p1".into();
    mgr.register_peer(TASK_1.into(), peer.clone(), "h:1").unwrap();
    mgr.finish_peer(&peer).unwrap();

    mgr.disappear_peer(&peer).unwrap();
    assert_eq!(PeerStatus::Finished, mgr.get_peer(&peer).unwrap().status);

    mgr.touch_peer(&peer).unwrap();
    assert_eq!(PeerStatus::Finished, mgr.get_peer(&peer).unwrap().status);
}

#[test]
fn recorded_piece_count_tracks_distinct_pieces() {
    let (mgr, _) = create_with_task();
    let task: TaskId = TASK_1.into();
    mgr.register_peer(task.clone(), "p1".into(), "h:1").unwrap();

    mgr.record_piece(&task, 1, "aa", &CDN.into()).unwrap();
    mgr.record_piece(&task, 1, "aa", &CDN.into()).unwrap();
    mgr.record_piece(&task, 1, "aa", &"p1".into()).unwrap();
    let _ = mgr.record_piece(&task, 1, "bb", &"p1".into()).unwrap_err();

    assert_eq!(1, mgr.get_task(&task).unwrap().recorded_pieces);
    assert_eq!(BTreeSet::from([1]), mgr.list_available_pieces(&task).unwrap());

    mgr.record_piece(&task, 0, "aa", &CDN.into()).unwrap();
    mgr.record_piece(&task, 2, "aa", &CDN.into()).unwrap();
    assert_eq!(3, mgr.get_task(&task).unwrap().recorded_pieces);
    assert!(mgr.is_task_complete(&task).unwrap());

    // a fresh registration after removal starts from zero
    mgr.remove_task(&task).unwrap();
    let again = mgr.register_task(task.clone(), 10, 3).unwrap();
    assert_eq!(0, again.recorded_pieces);
    assert!(mgr.list_available_pieces(&task).unwrap().is_empty());
}
