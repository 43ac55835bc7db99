use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use codebot_core::QueueItem;
use tokio::sync::mpsc::{self, error::TrySendError};

/// 入队结果
///
/// 失败时把元素交还给调用方，由调用方决定记录或丢弃。
#[derive(Debug)]
pub enum Admission {
    Admitted,
    Full(QueueItem),
    Closed(QueueItem),
}

/// 有界任务队列
///
/// 基于 Tokio 有界 channel。发送端放在一个互斥锁保护的槽位里，槽位为空即表示
/// 队列已关闭：首次入队和重试入队都在同一把锁下检查关闭状态并 `try_send`，
/// 因此关闭之后不会再有任何元素被接纳。关闭后接收端仍可取完剩余元素，
/// 取空后 `recv` 返回 `None`。
#[derive(Debug)]
pub struct TaskQueue {
    sender: Mutex<Option<mpsc::Sender<QueueItem>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<QueueItem>>,
    capacity: usize,
    len: AtomicUsize,
}

impl TaskQueue {
    /// 创建指定容量的队列，容量必须大于0
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            capacity,
            len: AtomicUsize::new(0),
        }
    }

    fn sender_slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<QueueItem>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 非阻塞入队
    pub fn try_admit(&self, item: QueueItem) -> Admission {
        let slot = self.sender_slot();
        let Some(sender) = slot.as_ref() else {
            return Admission::Closed(item);
        };

        // 计数先于发送递增，避免消费者先取走元素导致计数下溢
        self.len.fetch_add(1, Ordering::SeqCst);
        match sender.try_send(item) {
            Ok(()) => Admission::Admitted,
            Err(TrySendError::Full(item)) => {
                self.len.fetch_sub(1, Ordering::SeqCst);
                Admission::Full(item)
            }
            Err(TrySendError::Closed(item)) => {
                self.len.fetch_sub(1, Ordering::SeqCst);
                Admission::Closed(item)
            }
        }
    }

    /// 关闭队列，返回本次调用是否真正执行了关闭
    pub fn close(&self) -> bool {
        self.sender_slot().take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.sender_slot().is_none()
    }

    /// 取出下一个元素；队列为空时等待，关闭且取空后返回 `None`
    pub async fn recv(&self) -> Option<QueueItem> {
        let item = self.receiver.lock().await.recv().await;
        if item.is_some() {
            self.len.fetch_sub(1, Ordering::SeqCst);
        }
        item
    }

    /// 当前排队的元素数
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codebot_core::Task;

    fn item(number: u64) -> QueueItem {
        QueueItem::first(Task::new("owner/repo", number))
    }

    #[tokio::test]
    async fn test_admit_until_full() {
        let queue = TaskQueue::new(2);

        assert!(matches!(queue.try_admit(item(1)), Admission::Admitted));
        assert!(matches!(queue.try_admit(item(2)), Admission::Admitted));
        assert_eq!(queue.len(), 2);

        match queue.try_admit(item(3)) {
            Admission::Full(rejected) => assert_eq!(rejected.task.number, 3),
            other => panic!("expected Full, got {other:?}"),
        }
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TaskQueue::new(4);
        for number in 1..=3 {
            queue.try_admit(item(number));
        }

        for expected in 1..=3 {
            let received = queue.recv().await.unwrap();
            assert_eq!(received.task.number, expected);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_close_rejects_and_drains() {
        let queue = TaskQueue::new(4);
        queue.try_admit(item(1));

        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());
        assert!(matches!(queue.try_admit(item(2)), Admission::Closed(_)));

        assert_eq!(queue.recv().await.unwrap().task.number, 1);
        assert!(queue.recv().await.is_none());
    }
}
