//! DataBuffer Tests
//!
//! Tests for:
//! - Construction: factory normalisation, placeholder payload, descriptor flags
//! - Identity allocation: distinct, increasing, injectable
//! - Revision tracking: update with and without payload
//! - Disposal broadcast: ordering, idempotence, failure isolation
//! - Destroy: terminal state

use std::sync::Arc;

use parking_lot::Mutex;

use databuffer::resources::{ElementType, SubscriberId};
use databuffer::{
    BufferData, BufferDesc, BufferError, BufferId, BufferKind, BufferRef, BufferUsage, ContextId,
    DataBuffer, IdAllocator,
};

type CallLog = Arc<Mutex<Vec<(&'static str, BufferId, bool)>>>;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn recording_listener(
    log: CallLog,
    name: &'static str,
) -> impl Fn(&DataBuffer, bool) -> databuffer::Result<()> + Send + Sync + 'static {
    move |buffer: &DataBuffer, context_lost: bool| {
        log.lock().push((name, buffer.id(), context_lost));
        Ok(())
    }
}

// ============================================================================
// Construction Tests
// ============================================================================

#[test]
fn factory_normalises_plain_sequence() {
    let buffer = DataBuffer::from_data(vec![1.0_f32, 2.0, 3.0, 4.0]);

    let data = buffer.data().unwrap();
    assert_eq!(*data, BufferData::F32(vec![1.0, 2.0, 3.0, 4.0]));
    drop(data);

    assert_eq!(buffer.revision(), 0);
    assert_eq!(buffer.usage(), BufferUsage::Static);
    assert!(buffer.is_static());
    assert!(!buffer.is_index());
    assert!(!buffer.is_destroyed());
}

#[test]
fn factory_keeps_typed_payload() {
    let buffer = DataBuffer::from_data(vec![0_u32, 1, 2]);
    assert_eq!(buffer.data().unwrap().element_type(), ElementType::U32);
    assert_eq!(buffer.byte_len(), 12);
    assert_eq!(buffer.kind(), BufferKind::Vertex);
}

#[test]
fn missing_payload_gets_single_element_placeholder() {
    let buffer = DataBuffer::new(BufferDesc::default());
    let data = buffer.data().expect("fresh buffer must have data");
    assert_eq!(data.len(), 1);
    assert_eq!(data.element_type(), ElementType::F32);
}

#[test]
fn descriptor_flags_are_kept() {
    let buffer = DataBuffer::new(BufferDesc {
        data: Some(vec![0_u16, 1, 2].into()),
        usage: BufferUsage::Dynamic,
        kind: BufferKind::Index,
        label: Some("indices".into()),
    });
    assert!(buffer.is_index());
    assert!(!buffer.is_static());
    assert_eq!(buffer.label(), "indices");
}

// ============================================================================
// Identity Tests
// ============================================================================

#[test]
fn ids_are_distinct_and_increasing() {
    let ids: Vec<BufferId> = (0..32).map(|_| DataBuffer::default().id()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn injected_allocator_is_deterministic() {
    let ids = IdAllocator::new();
    let a = DataBuffer::with_allocator(BufferDesc::default(), &ids);
    let b = DataBuffer::with_allocator(BufferDesc::default(), &ids);
    assert_eq!(a.id(), BufferId(0));
    assert_eq!(b.id(), BufferId(1));

    ids.reset(100);
    let c = DataBuffer::with_allocator(BufferDesc::default(), &ids);
    assert_eq!(c.id(), BufferId(100));
}

// ============================================================================
// Revision Tests
// ============================================================================

#[test]
fn revision_counts_every_update() -> anyhow::Result<()> {
    let buffer = DataBuffer::from_data(vec![1.0_f32]);
    let before = buffer.revision();

    buffer.update_with(vec![2.0_f32])?;
    buffer.update_with(vec![2.0_f32])?; // same value still counts
    buffer.update(None)?;
    buffer.touch()?;

    assert_eq!(buffer.revision(), before + 4);
    Ok(())
}

#[test]
fn update_without_payload_keeps_data() -> anyhow::Result<()> {
    let buffer = DataBuffer::from_data(vec![5.0_f32, 6.0]);
    let revision = buffer.update(None)?;

    assert_eq!(revision, 1);
    assert_eq!(buffer.data().unwrap().as_f32(), Some(&[5.0, 6.0][..]));
    Ok(())
}

#[test]
fn update_replaces_payload_wholesale() -> anyhow::Result<()> {
    let buffer = DataBuffer::from_data(vec![1.0_f32, 2.0, 3.0]);
    buffer.update_with(vec![9_u8])?;
    assert_eq!(*buffer.data().unwrap(), BufferData::U8(vec![9]));
    Ok(())
}

#[test]
fn concurrent_updates_are_all_counted() {
    let buffer = BufferRef::from_data(vec![0.0_f32]);
    let workers: Vec<_> = (0..4)
        .map(|i| {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    buffer.update_with(vec![i as f32]).unwrap();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(buffer.revision(), 400);
}

// ============================================================================
// Disposal Tests
// ============================================================================

#[test]
fn dispose_notifies_in_registration_order() {
    init_logger();
    let buffer = DataBuffer::from_data(vec![1.0_f32]);
    let log: CallLog = Arc::default();
    buffer.subscribe(recording_listener(log.clone(), "first"));
    buffer.subscribe(recording_listener(log.clone(), "second"));

    let report = buffer.dispose();

    assert!(report.is_clean());
    assert_eq!(report.notified, 2);
    assert_eq!(
        *log.lock(),
        vec![("first", buffer.id(), false), ("second", buffer.id(), false)]
    );
}

#[test]
fn dispose_twice_broadcasts_twice() {
    let buffer = DataBuffer::from_data(vec![1.0_f32]);
    let log: CallLog = Arc::default();
    buffer.subscribe(recording_listener(log.clone(), "a"));
    buffer.subscribe(recording_listener(log.clone(), "b"));

    buffer.dispose();
    buffer.dispose();

    assert_eq!(log.lock().len(), 4);
    assert!(!buffer.is_destroyed());
}

#[test]
fn dispose_without_subscribers_is_noop() {
    let buffer = DataBuffer::from_data(vec![1.0_f32]);
    let report = buffer.dispose();
    assert_eq!(report.notified, 0);
    assert!(report.is_clean());
}

#[test]
fn failing_listener_does_not_stop_broadcast() {
    init_logger();
    let buffer = DataBuffer::from_data(vec![1.0_f32]);
    let log: CallLog = Arc::default();

    buffer.subscribe(recording_listener(log.clone(), "before"));
    let failing = buffer.subscribe(|_, _| Err(BufferError::listener(ContextId(7), "device lost")));
    let panicking: SubscriberId = buffer.subscribe(|_, _| panic!("listener bug"));
    buffer.subscribe(recording_listener(log.clone(), "after"));

    let report = buffer.dispose();

    assert_eq!(report.notified, 4);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].0, failing);
    assert_eq!(report.failures[1].0, panicking);
    assert!(matches!(
        report.failures[1].1,
        BufferError::ListenerPanicked { ref message, .. } if message == "listener bug"
    ));

    let names: Vec<_> = log.lock().iter().map(|(n, _, _)| *n).collect();
    assert_eq!(names, vec!["before", "after"]);

    assert!(matches!(
        report.into_result(buffer.id()),
        Err(BufferError::DisposeFailed { failures, .. }) if failures.len() == 2
    ));
}

#[test]
fn unsubscribed_listener_is_not_notified() {
    let buffer = DataBuffer::from_data(vec![1.0_f32]);
    let log: CallLog = Arc::default();
    let id = buffer.subscribe(recording_listener(log.clone(), "gone"));
    buffer.subscribe(recording_listener(log.clone(), "kept"));

    assert!(buffer.unsubscribe(id));
    buffer.dispose();

    assert_eq!(*log.lock(), vec![("kept", buffer.id(), false)]);
    assert_eq!(buffer.subscriber_count(), 1);
}

// ============================================================================
// Destroy Tests
// ============================================================================

#[test]
fn destroy_disposes_then_releases_data() {
    let buffer = DataBuffer::from_data(vec![1.0_f32]);
    let log: CallLog = Arc::default();
    buffer.subscribe(recording_listener(log.clone(), "ctx"));

    let report = buffer.destroy();

    assert_eq!(report.notified, 1);
    assert!(buffer.is_destroyed());
    assert!(buffer.data().is_none());
}

#[test]
fn update_after_destroy_is_invalid_state() {
    let buffer = DataBuffer::from_data(vec![1.0_f32]);
    buffer.destroy();

    let revision = buffer.revision();
    assert_eq!(
        buffer.update(None),
        Err(BufferError::Destroyed { id: buffer.id() })
    );
    assert_eq!(
        buffer.update_with(vec![3.0_f32]),
        Err(BufferError::Destroyed { id: buffer.id() })
    );
    assert_eq!(buffer.revision(), revision);
    assert!(buffer.data().is_none());
}

#[test]
fn destroy_twice_is_harmless() {
    let buffer = DataBuffer::from_data(vec![1.0_f32]);
    let log: CallLog = Arc::default();
    buffer.subscribe(recording_listener(log.clone(), "ctx"));

    buffer.destroy();
    buffer.destroy();

    assert_eq!(log.lock().len(), 2);
    assert!(buffer.is_destroyed());
}
