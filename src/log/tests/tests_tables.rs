use crate::log::SlotTable;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn untouched_slots_read_zero() {
    let table = SlotTable::new(1024);
    assert_eq!(table.get(0), 0);
    assert_eq!(table.get(1023), 0);
}

#[test]
fn set_then_get() {
    let table = SlotTable::new(1024);
    table.set(0, 42);
    table.set(7, 7);
    assert_eq!(table.get(0), 42);
    assert_eq!(table.get(7), 7);
    assert_eq!(table.get(8), 0);
}

#[test]
fn slots_across_segment_boundary() {
    // Table segments hold 4096 slots each.
    let table = SlotTable::new(3 * 4096);
    table.set(4095, 1);
    table.set(4096, 2);
    table.set(2 * 4096 + 17, 3);

    assert_eq!(table.get(4095), 1);
    assert_eq!(table.get(4096), 2);
    assert_eq!(table.get(2 * 4096 + 17), 3);
}

#[test]
fn mark_if_zero_wins_once() {
    let table = SlotTable::new(16);
    assert!(table.mark_if_zero(3, 100));
    assert!(!table.mark_if_zero(3, 200));
    assert_eq!(table.get(3), 100);
}

#[test]
fn mark_if_zero_respects_existing_value() {
    let table = SlotTable::new(16);
    table.set(5, 9);
    assert!(!table.mark_if_zero(5, 77));
    assert_eq!(table.get(5), 9);
}

#[test]
fn concurrent_marks_have_exactly_one_winner() {
    let table = Arc::new(SlotTable::new(16));
    let winners = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for t in 1..=8u32 {
        let table = Arc::clone(&table);
        let winners = Arc::clone(&winners);
        handles.push(thread::spawn(move || {
            if table.mark_if_zero(0, t * 10) {
                winners.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    let token = table.get(0);
    assert!(token % 10 == 0 && token >= 10 && token <= 80);
}

#[test]
fn concurrent_sets_on_distinct_slots() {
    let table = Arc::new(SlotTable::new(8 * 4096));

    let mut handles = Vec::new();
    for t in 0..8u32 {
        let table = Arc::clone(&table);
        handles.push(thread::spawn(move || {
            for i in 0..4096u32 {
                let slot = t * 4096 + i;
                table.set(slot, slot + 1);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for slot in 0..(8 * 4096u32) {
        assert_eq!(table.get(slot), slot + 1);
    }
}
