//! 步骤调度：无界队列 + Semaphore 限制并发 worker
//!
//! 提交永不阻塞调用方；每个 Step 在独立 task 上执行，产生的后续 Step 重新入队。
//! 同一会话内的后续步骤串行推进（一步只产生一个后续），不同会话彼此并行。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::core::OrchestrationError;
use crate::orchestration::Step;

/// 执行单个 Step，返回需要继续执行的后续 Step
#[async_trait]
pub trait StepHandler: Send + Sync + 'static {
    async fn handle(&self, step: Step) -> Vec<Step>;
}

pub struct StepScheduler {
    tx: mpsc::UnboundedSender<Step>,
    shutdown: CancellationToken,
    in_flight: Arc<AtomicUsize>,
}

impl StepScheduler {
    /// 启动调度循环；需要在 tokio 运行时内调用
    pub fn start(handler: Arc<dyn StepHandler>, max_concurrent: usize) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Step>();
        let shutdown = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let loop_tx = tx.clone();
        let loop_token = shutdown.clone();
        let loop_in_flight = in_flight.clone();
        tokio::spawn(async move {
            loop {
                let step = tokio::select! {
                    _ = loop_token.cancelled() => break,
                    step = rx.recv() => match step {
                        Some(step) => step,
                        None => break,
                    },
                };
                let permit = tokio::select! {
                    _ = loop_token.cancelled() => break,
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let handler = handler.clone();
                let tx = loop_tx.clone();
                let in_flight = loop_in_flight.clone();
                tokio::spawn(async move {
                    let next = handler.handle(step).await;
                    for step in next {
                        in_flight.fetch_add(1, Ordering::SeqCst);
                        if tx.send(step).is_err() {
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    drop(permit);
                });
            }
            tracing::debug!("step scheduler stopped");
        });

        Self {
            tx,
            shutdown,
            in_flight,
        }
    }

    pub fn submit(&self, step: Step) -> Result<(), OrchestrationError> {
        if self.shutdown.is_cancelled() {
            return Err(OrchestrationError::SchedulerClosed);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.tx.send(step).map_err(|_| {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            OrchestrationError::SchedulerClosed
        })
    }

    /// 已提交但尚未执行完的 Step 数（含排队中的）
    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// 停止接收新 Step；正在执行的 worker 不会被打断
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for StepScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
