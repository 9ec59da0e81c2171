//! Fan-out of segments to workers
//!
//! Worker `i` always receives segment `i`. Every invocation runs as its own
//! task and the dispatcher waits for all of them, even after a failure, so
//! diagnostics cover every worker. Any failure fails the whole job.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::corpus::Corpus;
use crate::error::{EngineError, Result, WorkerError};
use crate::reduce::PartialResult;
use crate::segment::{Partition, Segment, Segmenter};
use crate::tokenizer::TokenPolicy;
use crate::worker::{SegmentPayload, Worker};

pub struct Dispatcher {
    workers: Vec<Arc<dyn Worker>>,
    segmenter: Segmenter,
}

impl Dispatcher {
    pub fn new(workers: Vec<Arc<dyn Worker>>, segmenter: Segmenter) -> Result<Self> {
        if workers.is_empty() {
            return Err(EngineError::config("at least one worker is required"));
        }
        Ok(Self { workers, segmenter })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn worker_ids(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.id().to_string()).collect()
    }

    /// Split the corpus into one segment per worker.
    pub async fn partition(&self, corpus: &Corpus) -> Result<Partition> {
        self.segmenter.split(corpus, self.workers.len()).await
    }

    /// Build the payload of every worker for an existing partition.
    pub async fn payloads(
        &self,
        corpus: &Corpus,
        partition: &Partition,
        policy: TokenPolicy,
    ) -> Result<Vec<SegmentPayload>> {
        let mut payloads = Vec::with_capacity(partition.segments().len());
        for (worker, segment) in self.workers.iter().zip(partition.segments()) {
            let payload = build_payload(corpus, partition, segment, policy, worker.as_ref());
            payloads.push(payload.await?);
        }
        Ok(payloads)
    }

    pub async fn plan(&self, corpus: &Corpus, policy: TokenPolicy) -> Result<Vec<SegmentPayload>> {
        let partition = self.partition(corpus).await?;
        self.payloads(corpus, &partition, policy).await
    }

    pub async fn dispatch(
        &self,
        corpus: &Corpus,
        policy: TokenPolicy,
    ) -> Result<Vec<PartialResult>> {
        let payloads = self.plan(corpus, policy).await?;
        self.run_all(payloads).await
    }

    /// Invoke every worker on its payload concurrently and wait for all.
    pub async fn run_all(&self, payloads: Vec<SegmentPayload>) -> Result<Vec<PartialResult>> {
        if payloads.len() != self.workers.len() {
            return Err(EngineError::config(format!(
                "{} segments for {} workers",
                payloads.len(),
                self.workers.len()
            )));
        }

        info!("Dispatching {} segments", payloads.len());
        let mut tasks = FuturesUnordered::new();

        for (index, (worker, payload)) in self.workers.iter().zip(payloads).enumerate() {
            let worker = Arc::clone(worker);
            debug!("Worker {} ({}) <- {}", index, worker.id(), payload.segment);

            tasks.push(async move {
                let started = Instant::now();
                let handle = tokio::spawn({
                    let worker = Arc::clone(&worker);
                    async move { worker.invoke(payload).await }
                });
                let outcome = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(WorkerError::Join(e.to_string())),
                };
                (index, worker.id().to_string(), started.elapsed(), outcome)
            });
        }

        let mut outcomes: Vec<Option<std::result::Result<PartialResult, WorkerError>>> =
            (0..self.workers.len()).map(|_| None).collect();
        let mut ids = vec![String::new(); self.workers.len()];

        while let Some((index, id, elapsed, outcome)) = tasks.next().await {
            match &outcome {
                Ok(partial) => debug!(
                    "Worker {} ({}) finished in {:?} with {} distinct tokens",
                    index,
                    id,
                    elapsed,
                    partial.len()
                ),
                Err(e) => error!("Worker {} ({}) failed after {:?}: {}", index, id, elapsed, e),
            }
            ids[index] = id;
            outcomes[index] = Some(outcome);
        }

        let mut partials = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Some(Ok(partial)) => partials.push(partial),
                Some(Err(source)) => {
                    return Err(EngineError::Worker {
                        index,
                        worker: std::mem::take(&mut ids[index]),
                        source,
                    })
                }
                None => {
                    return Err(EngineError::Worker {
                        index,
                        worker: self.workers[index].id().to_string(),
                        source: WorkerError::Join("worker produced no result".to_string()),
                    })
                }
            }
        }
        Ok(partials)
    }
}

/// Byte segments of a file corpus travel as ranges only to workers that can
/// open the same path; everyone else gets the decoded text.
async fn build_payload(
    corpus: &Corpus,
    partition: &Partition,
    segment: &Segment,
    policy: TokenPolicy,
    worker: &dyn Worker,
) -> Result<SegmentPayload> {
    match (segment, corpus) {
        (Segment::Words { .. }, _) => {
            let text = partition.word_text(segment).unwrap_or_default();
            Ok(SegmentPayload::text(policy, *segment, text))
        }
        (Segment::Bytes { start, end }, Corpus::File { path, .. })
            if worker.shares_filesystem() =>
        {
            Ok(SegmentPayload::file_range(policy, path.clone(), *start, *end))
        }
        (Segment::Bytes { start, end }, _) => {
            let text = corpus.read_range(*start, *end).await?;
            Ok(SegmentPayload::text(policy, *segment, text))
        }
    }
}
