//! 信用池（计数信号量）
//!
//! 固件输入缓冲区很小，主机在收到 RECEIVED 之前不能继续写入。
//! 发送线程每写一条命令消耗一个信用，监听线程每收到一个 RECEIVED 归还一个。
//! 可用信用数始终在 `[0, capacity]` 之内。

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct CreditPool {
    available: Mutex<usize>,
    capacity: usize,
    released: Condvar,
}

impl CreditPool {
    /// 创建满额信用池（容量至少为 1）
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            available: Mutex::new(capacity),
            capacity,
            released: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        *self.available.lock()
    }

    /// 在途（已消耗未归还）的信用数
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn try_acquire(&self) -> bool {
        let mut available = self.available.lock();
        if *available > 0 {
            *available -= 1;
            true
        } else {
            false
        }
    }

    /// 等待一个信用，超时返回 `false`
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut available = self.available.lock();
        while *available == 0 {
            if self.released.wait_until(&mut available, deadline).timed_out() {
                break;
            }
        }
        if *available > 0 {
            *available -= 1;
            true
        } else {
            false
        }
    }

    /// 归还一个信用
    ///
    /// 池已满时不做任何事并返回 `false`（多余的 RECEIVED 不会抬高上限）。
    pub fn release(&self) -> bool {
        let mut available = self.available.lock();
        if *available >= self.capacity {
            return false;
        }
        *available += 1;
        drop(available);
        self.released.notify_one();
        true
    }

    /// 重新握手后重置：除调用方仍持有的 `held` 个信用外全部归还
    pub fn reset(&self, held: usize) {
        let mut available = self.available.lock();
        *available = self.capacity.saturating_sub(held);
        drop(available);
        self.released.notify_all();
    }
}
