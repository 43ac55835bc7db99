use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// 按键加锁的管理器
///
/// 键空间无界（任意 `repo#number`），因此不预先为每个键分配锁，而是在首次
/// 获取时惰性创建带引用计数的条目，引用计数归零时删除。映射表的大小因此只
/// 取决于当前持有或等待锁的键的数量。
///
/// 获取分两阶段：先在表级互斥锁下找到或创建条目并递增计数，释放表级锁后
/// 再等待条目自己的锁，所以表级锁从不跨越任务执行期间持有。
#[derive(Debug, Default)]
pub struct KeyLockManager {
    locks: Mutex<HashMap<String, KeyLockEntry>>,
}

#[derive(Debug)]
struct KeyLockEntry {
    mutex: Arc<tokio::sync::Mutex<()>>,
    refcount: usize,
}

impl KeyLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<String, KeyLockEntry>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 获取键锁，等待同键的其他持有者释放
    ///
    /// 返回的守卫在 drop 时释放锁。等待期间若 future 被丢弃，引用计数同样会被归还。
    pub async fn acquire(self: &Arc<Self>, key: &str) -> KeyLockGuard {
        let mutex = {
            let mut locks = self.lock_map();
            let entry = locks
                .entry(key.to_string())
                .or_insert_with(|| KeyLockEntry {
                    mutex: Arc::new(tokio::sync::Mutex::new(())),
                    refcount: 0,
                });
            entry.refcount += 1;
            Arc::clone(&entry.mutex)
        };

        let mut guard = KeyLockGuard {
            manager: Arc::clone(self),
            key: key.to_string(),
            held: None,
        };
        guard.held = Some(mutex.lock_owned().await);
        guard
    }

    fn release(&self, key: &str) {
        let mut locks = self.lock_map();
        if let Some(entry) = locks.get_mut(key) {
            entry.refcount -= 1;
            if entry.refcount == 0 {
                locks.remove(key);
            }
        }
    }

    /// 当前有持有者或等待者的键数量
    pub fn active_keys(&self) -> usize {
        self.lock_map().len()
    }

    /// 指定键上的持有者与等待者总数
    pub fn contenders(&self, key: &str) -> usize {
        self.lock_map().get(key).map_or(0, |entry| entry.refcount)
    }
}

/// 键锁守卫
#[derive(Debug)]
pub struct KeyLockGuard {
    manager: Arc<KeyLockManager>,
    key: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl KeyLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 显式释放，等价于 drop
    pub fn release(self) {}
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        // 先解锁条目，再归还引用计数
        self.held.take();
        self.manager.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let manager = Arc::new(KeyLockManager::new());

        let guard = manager.acquire("owner/repo#1").await;
        assert_eq!(guard.key(), "owner/repo#1");
        assert_eq!(manager.active_keys(), 1);
        assert_eq!(manager.contenders("owner/repo#1"), 1);

        guard.release();
        assert_eq!(manager.active_keys(), 0);
        assert_eq!(manager.contenders("owner/repo#1"), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let manager = Arc::new(KeyLockManager::new());

        let _a = manager.acquire("owner/repo#1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), manager.acquire("owner/repo#2"))
            .await;

        assert!(b.is_ok());
        assert_eq!(manager.active_keys(), 2);
    }

    #[tokio::test]
    async fn test_same_key_waits_for_release() {
        let manager = Arc::new(KeyLockManager::new());
        let first = manager.acquire("owner/repo#1").await;

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let _guard = manager.acquire("owner/repo#1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(manager.contenders("owner/repo#1"), 2);

        drop(first);
        waiter.await.unwrap();
        assert_eq!(manager.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_wait_returns_refcount() {
        let manager = Arc::new(KeyLockManager::new());
        let held = manager.acquire("owner/repo#1").await;

        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), manager.acquire("owner/repo#1")).await;
        assert!(timed_out.is_err());
        assert_eq!(manager.contenders("owner/repo#1"), 1);

        drop(held);
        assert_eq!(manager.active_keys(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mutual_exclusion_under_contention() {
        let manager = Arc::new(KeyLockManager::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = Arc::clone(&manager);
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = manager.acquire("hot/repo#7").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_keys(), 0);
    }
}
