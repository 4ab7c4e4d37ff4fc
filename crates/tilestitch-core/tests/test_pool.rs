use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tilestitch_core::compute::{BufferPool, DeviceAllocator, HostAllocator};
use tilestitch_core::config::ExhaustionPolicy;
use tilestitch_core::error::{Result, StitchError};

struct CountingAllocator(Arc<AtomicUsize>);

impl DeviceAllocator<Vec<f32>> for CountingAllocator {
    fn allocate(&self, slot_len: usize) -> Result<Vec<f32>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.0; slot_len])
    }
}

#[test]
fn test_slots_allocated_lazily_and_reused() {
    let count = Arc::new(AtomicUsize::new(0));
    let pool = BufferPool::new(
        Box::new(CountingAllocator(Arc::clone(&count))),
        3,
        16,
        ExhaustionPolicy::FailFast,
    );
    for _ in 0..10 {
        let slot = pool.checkout().unwrap();
        assert_eq!(slot.len(), 16);
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn test_fail_fast_returns_pool_exhausted() {
    let pool = BufferPool::<Vec<u8>>::new(Box::new(HostAllocator), 1, 8, ExhaustionPolicy::FailFast);
    let _held = pool.checkout().unwrap();
    let err = pool.checkout().unwrap_err();
    assert!(matches!(err, StitchError::PoolExhausted { capacity: 1 }));
}

#[test]
fn test_bounded_block_times_out() {
    let pool = BufferPool::<Vec<u8>>::new(
        Box::new(HostAllocator),
        1,
        8,
        ExhaustionPolicy::Block { timeout_ms: Some(50) },
    );
    let _held = pool.checkout().unwrap();
    let start = Instant::now();
    assert!(matches!(pool.checkout(), Err(StitchError::PoolExhausted { .. })));
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn test_writes_survive_until_release() {
    let pool = BufferPool::<Vec<u8>>::new(Box::new(HostAllocator), 1, 4, ExhaustionPolicy::FailFast);
    let mut slot = pool.checkout().unwrap();
    slot.copy_from_slice(&[1, 2, 3, 4]);
    assert_eq!(&slot[..], &[1, 2, 3, 4]);
    pool.release(slot);
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn test_concurrent_checkouts_never_exceed_capacity() {
    let pool = BufferPool::<Vec<u8>>::new(
        Box::new(HostAllocator),
        2,
        4,
        ExhaustionPolicy::Block { timeout_ms: None },
    );
    let peak = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                for _ in 0..20 {
                    let slot = pool.checkout().unwrap();
                    peak.fetch_max(pool.in_use(), Ordering::SeqCst);
                    thread::yield_now();
                    drop(slot);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(pool.in_use(), 0);
    assert!(pool.allocated() <= 2);
}
