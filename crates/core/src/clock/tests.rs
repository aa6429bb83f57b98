use super::*;
use proptest::prelude::*;

#[test]
fn equal_clocks_are_in_sync() {
    assert_eq!(resolve(1000, 1000, 1000), Ok(SyncDisposition::InSync));
    assert_eq!(resolve(0, 0, 0), Ok(SyncDisposition::InSync));
}

#[test]
fn stale_bookkeeping_only_needs_last_sync_repaired() {
    let disposition = resolve(2000, 2000, 1000).unwrap();
    assert_eq!(disposition, SyncDisposition::LastSyncNotUpToDate);
}

#[test]
fn local_ahead_branches() {
    assert_eq!(
        resolve(3000, 2000, 1000),
        Ok(SyncDisposition::DataDiverged)
    );
    assert_eq!(
        resolve(2000, 1000, 1000),
        Ok(SyncDisposition::RemoteUpdateRequired)
    );
    assert_eq!(
        resolve(2000, 1000, 1500),
        Ok(SyncDisposition::RemoteUpdateRequired)
    );
    assert_eq!(
        resolve(2000, 1000, 2000),
        Ok(SyncDisposition::RemoteNotUpToDateDespiteSync)
    );
}

#[test]
fn remote_ahead_branches() {
    assert_eq!(
        resolve(1000, 2000, 1000),
        Ok(SyncDisposition::LocalUpdateRequired)
    );
    assert_eq!(
        resolve(1500, 2000, 1000),
        Ok(SyncDisposition::DataDiverged)
    );
    // Clock skew: the phone wrote at 900 after syncing at 800, the desktop at 1200.
    assert_eq!(resolve(900, 1200, 800), Ok(SyncDisposition::DataDiverged));
}

#[test]
fn last_sync_after_local_is_a_precondition_error() {
    assert_eq!(
        resolve(1000, 1500, 2000),
        Err(ClockError::Precondition {
            local: 1000,
            last_sync: 2000
        })
    );
}

#[test]
fn write_push_record_cycle_returns_to_in_sync() {
    let start = ClockTriple::new(1000, 1000, 1000);
    assert_eq!(start.resolve(), Ok(SyncDisposition::InSync));

    let after_write = ClockTriple::new(1200, 1000, 1000);
    assert_eq!(
        after_write.resolve(),
        Ok(SyncDisposition::RemoteUpdateRequired)
    );

    let after_push = ClockTriple::new(1200, 1200, 1200);
    assert_eq!(after_push.resolve(), Ok(SyncDisposition::InSync));
}

proptest! {
    #[test]
    fn all_equal_is_in_sync(t in any::<u64>()) {
        prop_assert_eq!(resolve(t, t, t), Ok(SyncDisposition::InSync));
    }

    #[test]
    fn equal_sides_with_older_last_sync(last_sync in 0u64..1_000_000, gap in 1u64..1_000_000) {
        let t = last_sync + gap;
        prop_assert_eq!(resolve(t, t, last_sync), Ok(SyncDisposition::LastSyncNotUpToDate));
    }

    #[test]
    fn both_progressed_since_last_sync_diverges(
        last_sync in 0u64..1_000_000,
        a in 1u64..1_000_000,
        b in 1u64..1_000_000,
    ) {
        let remote = last_sync + a;
        let local = remote + b;
        prop_assert_eq!(resolve(local, remote, last_sync), Ok(SyncDisposition::DataDiverged));
    }

    #[test]
    fn remote_behind_last_sync_requires_push(
        remote in 0u64..1_000_000,
        a in 0u64..1_000_000,
        b in 1u64..1_000_000,
    ) {
        let last_sync = remote + a;
        let local = last_sync + b;
        prop_assert_eq!(
            resolve(local, remote, last_sync),
            Ok(SyncDisposition::RemoteUpdateRequired)
        );
    }

    #[test]
    fn last_sync_ahead_of_local_never_resolves(
        local in 0u64..1_000_000,
        remote in any::<u64>(),
        gap in 1u64..1_000_000,
    ) {
        let result = resolve(local, remote, local + gap);
        let is_precondition = matches!(result, Err(ClockError::Precondition { .. }));
        prop_assert!(is_precondition);
    }

    #[test]
    fn valid_triples_are_never_inconclusive(
        local in any::<u64>(),
        remote in any::<u64>(),
        last_sync_frac in 0u64..=1000,
    ) {
        let last_sync = ((local as u128 * last_sync_frac as u128) / 1000) as u64;
        prop_assert!(resolve(local, remote, last_sync).is_ok());
    }
}
