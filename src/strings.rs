// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

thread_local! {
    static POOL: RefCell<HashMap<u64, Vec<Weak<LStrData>>>> = RefCell::new(HashMap::new());
}

fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug)]
pub struct LStrData {
    text: Box<str>,
    hash: u64,
}

impl Drop for LStrData {
    fn drop(&mut self) {
        // The pool may already be gone during thread teardown.
        let hash = self.hash;
        let _ = POOL.try_with(|pool| {
            let mut pool = pool.borrow_mut();
            if let Some(bucket) = pool.get_mut(&hash) {
                bucket.retain(|weak| weak.strong_count() > 0);
                if bucket.is_empty() {
                    pool.remove(&hash);
                }
            }
        });
    }
}

/// A pooled string: each distinct byte sequence exists at most once per
/// thread, so equality is a pointer comparison.
#[derive(Debug, Clone)]
pub struct LStr(Rc<LStrData>);

impl LStr {
    pub fn intern(text: &str) -> LStr {
        let hash = content_hash(text);
        POOL.with(|pool| {
            let mut pool = pool.borrow_mut();
            let bucket = pool.entry(hash).or_insert_with(Vec::new);
            for weak in bucket.iter() {
                if let Some(data) = weak.upgrade() {
                    if &*data.text == text {
                        return LStr(data);
                    }
                }
            }
            let data = Rc::new(LStrData {
                text: text.into(),
                hash,
            });
            bucket.push(Rc::downgrade(&data));
            LStr(data)
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0.text
    }

    pub fn len(&self) -> usize {
        self.0.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.text.is_empty()
    }

    pub fn first_byte(&self) -> Option<u8> {
        self.0.text.as_bytes().first().copied()
    }

    /// Number of live strings in the pool. A non-zero count after the
    /// grammar context has been dropped indicates a leak.
    pub fn pool_len() -> usize {
        POOL.with(|pool| {
            pool.borrow()
                .values()
                .map(|bucket| bucket.iter().filter(|weak| weak.strong_count() > 0).count())
                .sum()
        })
    }
}

impl PartialEq for LStr {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for LStr {}

impl PartialOrd for LStr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LStr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Hash for LStr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

impl fmt::Display for LStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
