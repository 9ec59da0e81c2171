use async_trait::async_trait;

use super::{map_payload, SegmentPayload, Worker};
use crate::error::WorkerError;
use crate::reduce::PartialResult;

/// Runs the map in this process
#[derive(Debug, Clone)]
pub struct LocalWorker {
    id: String,
}

impl LocalWorker {
    pub fn new(index: usize) -> Self {
        Self {
            id: format!("local-{index}"),
        }
    }
}

#[async_trait]
impl Worker for LocalWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn shares_filesystem(&self) -> bool {
        true
    }

    async fn invoke(&self, payload: SegmentPayload) -> Result<PartialResult, WorkerError> {
        tracing::trace!("{} mapping {}", self.id, payload.segment);
        map_payload(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use crate::tokenizer::TokenPolicy;

    #[tokio::test]
    async fn test_local_worker_maps_text_payload() {
        let worker = LocalWorker::new(0);
        assert_eq!(worker.id(), "local-0");

        let payload = SegmentPayload::text(
            TokenPolicy::Frequency,
            Segment::Words { start: 1, end: 3 },
            "a b",
        );
        let result = worker.invoke(payload).await.unwrap();

        let PartialResult::Frequency(counts) = result else {
            panic!("expected frequency partial");
        };
        assert_eq!(counts.get("a"), Some(&1));
        assert_eq!(counts.get("b"), Some(&1));
    }
}
