use crate::tail::{append_incr, Tail};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

#[test]
fn concurrent_claims_grant_disjoint_keys_and_ranges() {
    let tail = Arc::new(Tail::new());
    let threads = 8;
    let per_thread = 200;
    let value_len = 5u32;

    let mut handles = Vec::new();
    for _ in 0..threads {
        let tail = Arc::clone(&tail);
        handles.push(thread::spawn(move || {
            let mut claims = Vec::with_capacity(per_thread);
            for _ in 0..per_thread {
                let claimed = tail.claim(append_incr(value_len));
                claims.push((claimed.key(), claimed.offset()));
                tail.commit(claimed, append_incr(value_len));
            }
            claims
        }));
    }

    let mut keys = HashSet::new();
    let mut offsets = HashSet::new();
    for handle in handles {
        for (key, offset) in handle.join().unwrap() {
            assert!(keys.insert(key), "key {} granted twice", key);
            assert!(offsets.insert(offset), "offset {} granted twice", offset);
            assert_eq!(offset % value_len, 0, "ranges must tile the log");
        }
    }

    let total = (threads * per_thread) as u32;
    let snap = tail.snapshot();
    assert_eq!(snap.key(), total);
    assert_eq!(snap.offset(), total * value_len);
    assert_eq!(tail.gap(), 0);
}

#[test]
fn commit_waits_for_earlier_claims() {
    let tail = Arc::new(Tail::new());

    let first = tail.claim(append_incr(3));
    let second = tail.claim(append_incr(4));

    // Committing the second claim from another thread must block until the
    // first claim commits.
    let tail_clone = Arc::clone(&tail);
    let handle = thread::spawn(move || {
        tail_clone.commit(second, append_incr(4));
    });

    // The second committer is spinning; the read tail must still be zero.
    thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(tail.snapshot().raw(), 0);

    tail.commit(first, append_incr(3));
    handle.join().unwrap();

    let snap = tail.snapshot();
    assert_eq!(snap.key(), 2);
    assert_eq!(snap.offset(), 7);
}

#[test]
fn mixed_append_and_delete_claims_converge() {
    let tail = Arc::new(Tail::new());
    let threads = 4;
    let per_thread = 100;

    let mut handles = Vec::new();
    for t in 0..threads {
        let tail = Arc::clone(&tail);
        handles.push(thread::spawn(move || {
            for i in 0..per_thread {
                let incr = if (t + i) % 3 == 0 {
                    crate::tail::DEL_INCR
                } else {
                    append_incr(2)
                };
                let claimed = tail.claim(incr);
                tail.commit(claimed, incr);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // Every claim committed, so the tails must agree exactly.
    assert_eq!(tail.gap(), 0);
}
