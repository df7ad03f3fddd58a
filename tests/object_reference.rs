use std::collections::HashSet;

use hostbridge::{Durable, Local, RawObject};
use hostbridge_testing::MockHost;

#[test]
fn test_null_references_release_quietly() {
    let host = MockHost::new();
    let ctx = host.context();

    let mut local = Local::default();
    local.release();
    local.release();
    assert!(local.is_null());

    let mut durable = Durable::default();
    durable.release();
    durable.release();
    assert!(durable.is_null());

    let mut from_null = ctx.local(RawObject::NULL);
    assert!(from_null.context().is_none());
    from_null.release();

    assert_eq!(host.invalid_deletes(), 0);
}

#[test]
fn test_release_is_idempotent() {
    let host = MockHost::new();
    let ctx = host.context();

    let mut local = ctx.local(host.new_task());
    let mut durable = local.to_durable();
    assert_eq!(host.live_local_refs(), 1);
    assert_eq!(host.live_global_refs(), 1);

    local.release();
    local.release();
    durable.release();
    durable.release();
    drop(local);
    drop(durable);

    assert_eq!(host.live_local_refs(), 0);
    assert_eq!(host.live_global_refs(), 0);
    assert_eq!(host.invalid_deletes(), 0);
}

#[test]
fn test_released_clone_leaves_original_valid() {
    let host = MockHost::new();
    let ctx = host.context();
    let durable = ctx.local(host.new_task()).to_durable();

    let mut copy = durable.clone();
    assert!(ctx.is_same_object(copy.raw(), durable.raw()));
    assert_eq!(host.live_global_refs(), 2);
    copy.release();

    assert!(!durable.is_null());
    assert_eq!(host.live_global_refs(), 1);
    assert!(host.object_class(durable.raw()).is_some());
}

#[test]
fn test_take_nulls_the_source() {
    let host = MockHost::new();
    let ctx = host.context();

    let mut source = ctx.local(host.new_task());
    let raw = source.raw();
    let moved = source.take();
    assert!(source.is_null());
    assert_eq!(moved.raw(), raw);

    // Operating on the moved-from source does nothing.
    source.release();
    assert!(source.to_durable().is_null());
    assert_eq!(host.live_local_refs(), 1);

    let mut durable = moved.to_durable();
    let kept = durable.take();
    assert!(durable.is_null());
    drop(durable);
    assert_eq!(host.live_global_refs(), 1);
    drop(kept);
    assert_eq!(host.live_global_refs(), 0);
}

#[test]
fn test_local_clone_creates_new_reference() {
    let host = MockHost::new();
    let ctx = host.context();

    let local = ctx.local(host.new_task());
    let copy = local.clone();
    assert_ne!(copy.raw(), local.raw());
    assert!(ctx.is_same_object(copy.raw(), local.raw()));
    assert_eq!(host.live_local_refs(), 2);
    drop(copy);
    assert_eq!(host.live_local_refs(), 1);
}

#[test]
fn test_durable_round_trips_through_local() {
    let host = MockHost::new();
    let ctx = host.context();
    let durable = ctx.local(host.new_task()).to_durable();
    assert_eq!(host.live_local_refs(), 0);

    {
        let local = durable.to_local(&ctx);
        assert!(ctx.is_same_object(local.raw(), durable.raw()));
        assert_eq!(host.live_local_refs(), 1);
    }
    assert_eq!(host.live_local_refs(), 0);
    assert_eq!(host.live_global_refs(), 1);
}

#[test]
fn test_into_raw_hands_over_ownership() {
    let host = MockHost::new();
    let ctx = host.context();

    let raw = ctx.local(host.new_task()).to_durable().into_raw();
    assert_eq!(host.live_global_refs(), 1);

    let adopted = Durable::adopt(&ctx, raw);
    assert_eq!(adopted.raw(), raw);
    drop(adopted);
    assert_eq!(host.live_global_refs(), 0);

    let local_raw = ctx.local(host.new_task()).into_raw();
    assert_eq!(host.live_local_refs(), 1);
    drop(Local::new(&ctx, local_raw));
    assert_eq!(host.live_local_refs(), 0);
}

#[test]
fn test_references_hash_by_handle() {
    let host = MockHost::new();
    let ctx = host.context();

    let first = ctx.local(host.new_task());
    let second = ctx.local(host.new_task());
    let mut seen = HashSet::new();
    assert!(seen.insert(first.raw()));
    assert!(seen.insert(second.raw()));
    assert!(!seen.insert(first.raw()));

    let durables: HashSet<Durable> = [first.to_durable(), second.to_durable()]
        .into_iter()
        .collect();
    assert_eq!(durables.len(), 2);
}
