//! Single-worker generation executor.
//!
//! One task owns the backend and runs jobs strictly one at a time from a
//! bounded queue. Callers get a cloneable [`GenerationHandle`]; the worker
//! exits once every handle is dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{GenerationError, GenerationParams, Generator};

struct GenerationJob {
    prompt: String,
    params: GenerationParams,
    reply: oneshot::Sender<Result<String, GenerationError>>,
}

pub struct GenerationWorker {
    generator: Arc<dyn Generator>,
    jobs: mpsc::Receiver<GenerationJob>,
}

impl GenerationWorker {
    /// Spawn the worker on the current runtime.
    ///
    /// `timeout` bounds each caller's total wait, queueing included.
    pub fn spawn(
        generator: Arc<dyn Generator>,
        queue_capacity: usize,
        timeout: Duration,
    ) -> (GenerationHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let backend = generator.name().to_string();
        let worker = Self {
            generator,
            jobs: rx,
        };
        let join = tokio::spawn(worker.run());

        (
            GenerationHandle {
                jobs: tx,
                timeout,
                backend,
            },
            join,
        )
    }

    async fn run(mut self) {
        tracing::info!(backend = self.generator.name(), "Generation worker started");

        while let Some(job) = self.jobs.recv().await {
            if job.reply.is_closed() {
                tracing::debug!("Skipping generation job abandoned by its caller");
                continue;
            }

            let start = Instant::now();
            let result = self.generator.generate(&job.prompt, &job.params).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(_) => tracing::debug!(latency_ms, "Generation finished"),
                Err(e) => tracing::warn!(latency_ms, error = %e, "Generation failed"),
            }

            if job.reply.send(result).is_err() {
                tracing::debug!(latency_ms, "Generation result dropped; caller gave up");
            }
        }

        tracing::info!("Generation worker stopped");
    }
}

/// Submits prompts to the generation worker.
#[derive(Clone)]
pub struct GenerationHandle {
    jobs: mpsc::Sender<GenerationJob>,
    timeout: Duration,
    backend: String,
}

impl GenerationHandle {
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Queue a prompt and wait for the backend's output.
    pub async fn generate(
        &self,
        prompt: String,
        params: GenerationParams,
    ) -> Result<String, GenerationError> {
        let (reply, response) = oneshot::channel();
        let job = GenerationJob {
            prompt,
            params,
            reply,
        };

        let wait = async {
            self.jobs
                .send(job)
                .await
                .map_err(|_| GenerationError::WorkerUnavailable)?;
            response
                .await
                .map_err(|_| GenerationError::WorkerUnavailable)?
        };

        tokio::time::timeout(self.timeout, wait)
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowEcho {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowEcho {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Generator for SlowEcho {
        fn name(&self) -> &str {
            "slow-echo"
        }

        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, GenerationError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{prompt} done"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_never_overlap() {
        let backend = SlowEcho::new(Duration::from_millis(20));
        let (handle, _join) = GenerationWorker::spawn(backend.clone(), 8, Duration::from_secs(10));
        assert_eq!(handle.backend(), "slow-echo");

        let mut tasks = Vec::new();
        for i in 0..5 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .generate(format!("p{i}"), GenerationParams::default())
                    .await
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap().unwrap(), format!("p{i} done"));
        }

        assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let backend = SlowEcho::new(Duration::from_secs(60));
        let (handle, _join) = GenerationWorker::spawn(backend, 1, Duration::from_secs(1));

        let err = handle
            .generate("p".into(), GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Timeout(d) if d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_worker_gone() {
        let backend = SlowEcho::new(Duration::from_millis(1));
        let (handle, join) = GenerationWorker::spawn(backend, 1, Duration::from_secs(5));
        join.abort();
        let _ = join.await;

        let err = handle
            .generate("p".into(), GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::WorkerUnavailable));
    }
}
