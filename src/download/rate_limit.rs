//! 进程级正文请求限速：任意两次发出请求的间隔不小于配置值。

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 阻塞到属于本次调用的发送时刻，并返回该时刻。
    ///
    /// 检查与预约在同一把锁内完成；睡眠在锁外进行，其他线程可以继续排队预约后续时刻。
    pub fn wait(&self) -> Instant {
        let slot = {
            let mut next = match self.next_slot.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        let now = Instant::now();
        if slot > now {
            std::thread::sleep(slot - now);
        }
        slot
    }
}
