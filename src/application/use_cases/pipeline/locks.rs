use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type KeyMutex = Arc<tokio::sync::Mutex<()>>;

/// In-process advisory locks, one per cache key.
///
/// An entry lives only while some request holds or waits on its key.
#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, KeyMutex>>,
}

/// Held lock for one key; releases the key's entry when the last user drops.
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder of `key` remains.
    pub async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        KeyGuard {
            locks: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn release(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Waiters clone the entry under this mutex, so a count of one means nobody else needs it.
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_same_key_waits_other_key_does_not() {
        let locks = Arc::new(KeyLocks::new());
        let wait = Duration::from_millis(50);
        let held = locks.acquire("test-cases:PROJ-2").await;

        let other = timeout(wait, locks.acquire("test-cases:PROJ-3")).await;
        assert!(other.is_ok());

        let same = timeout(wait, locks.acquire("test-cases:PROJ-2")).await;
        assert!(same.is_err());

        drop(held);
        let again = timeout(wait, locks.acquire("test-cases:PROJ-2")).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_entries_are_released_after_last_holder() {
        let locks = KeyLocks::new();

        for n in 0..20 {
            let _guard = locks.acquire(&format!("generated-code:PROJ-{}:TC-01", n)).await;
            assert_eq!(locks.tracked(), 1);
        }
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_entry_survives_while_a_waiter_queues() {
        let locks = Arc::new(KeyLocks::new());
        let held = locks.acquire("test-cases:PROJ-2").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("test-cases:PROJ-2").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(held);
        assert_eq!(locks.tracked(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
