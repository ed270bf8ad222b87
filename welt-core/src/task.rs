// Copyright (c) 2026-present Welt Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Worker pool for background work such as externproto body fetches. Workers
//! never touch the scene graph; they publish results through a channel that
//! the simulation drains at the start of each tick.

use crate::parking_lot::Mutex;
use futures::executor::ThreadPool;
use std::{
    any::Any,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc,
    },
};

pub trait AsyncTaskResult: Any + Send + 'static {
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T> AsyncTaskResult for T
where
    T: Any + Send + 'static,
{
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl dyn AsyncTaskResult {
    pub fn downcast<T: AsyncTaskResult>(self: Box<Self>) -> Result<Box<T>, Box<dyn Any>> {
        self.into_any().downcast()
    }
}

pub struct TaskResult {
    pub id: u64,
    pub payload: Box<dyn AsyncTaskResult>,
}

/// Spawns futures on a shared thread pool and hands their results back over a
/// lock-protected channel. `next_task_result` never blocks, which keeps the
/// simulation thread free to run even while fetches are outstanding.
pub struct TaskPool {
    thread_pool: ThreadPool,
    sender: Sender<TaskResult>,
    receiver: Mutex<Receiver<TaskResult>>,
    next_id: AtomicU64,
    shutdown: Arc<AtomicBool>,
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskPool {
    #[inline]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            thread_pool: ThreadPool::new().expect("failed to spawn worker threads"),
            sender,
            receiver: Mutex::new(receiver),
            next_id: AtomicU64::new(0),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn spawn_task<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.thread_pool.spawn_ok(future);
    }

    /// Spawns a future whose result will be published to the handoff channel
    /// under the returned id. Results of tasks finishing after
    /// [`Self::shutdown`] are dropped without being published.
    #[inline]
    pub fn spawn_with_result<F, T>(&self, future: F) -> u64
    where
        F: Future<Output = T> + Send + 'static,
        T: AsyncTaskResult,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sender = self.sender.clone();
        let shutdown = self.shutdown.clone();
        self.spawn_task(async move {
            let result = future.await;
            if !shutdown.load(Ordering::Relaxed) {
                let _ = sender.send(TaskResult {
                    id,
                    payload: Box::new(result),
                });
            }
        });
        id
    }

    /// Pops the next finished task result, if any. Never blocks.
    #[inline]
    pub fn next_task_result(&self) -> Option<TaskResult> {
        self.receiver.lock().try_recv().ok()
    }

    /// Tells outstanding workers to drain without publishing their results.
    #[inline]
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use super::TaskPool;
    use std::time::Duration;

    #[test]
    fn spawned_task_result_arrives() {
        let pool = TaskPool::new();
        let id = pool.spawn_with_result(async { 7usize });
        let result = loop {
            if let Some(result) = pool.next_task_result() {
                break result;
            }
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(result.id, id);
        assert_eq!(*result.payload.downcast::<usize>().unwrap(), 7);
    }

    #[test]
    fn shutdown_discards_late_results() {
        let pool = TaskPool::new();
        pool.shutdown();
        pool.spawn_with_result(async { 1usize });
        std::thread::sleep(Duration::from_millis(20));
        assert!(pool.next_task_result().is_none());
    }
}
