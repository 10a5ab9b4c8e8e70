//! Remote execution adapter against the scripted mock backend
//!
//! Paused-clock tests: the executor's poll sleeps auto-advance, so scripts
//! that would otherwise wait out real poll intervals finish instantly.

use std::sync::Arc;
use std::time::Duration;

use gantry::{
    resolvers, AuditLog, AuditStatus, GantryError, Graph, JobRequest, JobState, JobStatus,
    MockBackend, PollConfig, RemoteExecutor, RemoteWork, Task, TaskRunner, WorkUnit,
};
use tokio_util::sync::CancellationToken;

fn executor(backend: Arc<MockBackend>) -> RemoteExecutor {
    RemoteExecutor::new(backend).with_poll_config(
        PollConfig::default()
            .with_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(2)),
    )
}

#[tokio::test(start_paused = true)]
async fn immediate_success_needs_a_single_status_check() {
    // one scripted Succeeded; any further check would see Pending and spin
    let backend = Arc::new(
        MockBackend::with_states([JobStatus::new(JobState::Succeeded)])
            .with_default_status(JobStatus::new(JobState::Pending)),
    );
    let exec = executor(Arc::clone(&backend));

    let job = exec
        .execute(
            JobRequest::new("sort big.txt", "sort-1"),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(backend.status_calls_remaining(), 0);
    assert_eq!(backend.submissions().len(), 1);
    assert!(backend.cancels().is_empty());
}

#[tokio::test(start_paused = true)]
async fn pending_then_running_then_succeeded() {
    let backend = Arc::new(MockBackend::with_states([
        JobStatus::new(JobState::Pending),
        JobStatus::new(JobState::Running),
        JobStatus::new(JobState::Succeeded),
    ]));
    let exec = executor(Arc::clone(&backend));

    let job = exec
        .execute(
            JobRequest::new("align reads", "align-1"),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(job.state, JobState::Succeeded);
    assert!(job.submitted_at.is_some());
    assert!(job.finished_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn failed_job_carries_backend_reason() {
    let backend = Arc::new(MockBackend::with_states([JobStatus::with_reason(
        JobState::Failed,
        "exit code 2",
    )]));
    let exec = executor(backend);

    let err = exec
        .execute(
            JobRequest::new("sort big.txt", "sort-1"),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();

    match err {
        GantryError::RemoteJobFailed { state, reason, .. } => {
            assert_eq!(state, JobState::Failed);
            assert!(reason.contains("exit code 2"));
        }
        other => panic!("expected RemoteJobFailed, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_issues_exactly_one_cancel_request() {
    // job never reaches a terminal state on its own
    let backend =
        Arc::new(MockBackend::new().with_default_status(JobStatus::new(JobState::Running)));
    let exec = executor(Arc::clone(&backend));
    let cancel = CancellationToken::new();

    let task = {
        let exec = exec.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            exec.execute(JobRequest::new("sleep 999", "long-1"), &cancel, None)
                .await
        })
    };

    // let a few polls happen before pulling the plug
    tokio::time::sleep(Duration::from_secs(2)).await;
    cancel.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, GantryError::Cancelled { .. }));
    assert_eq!(backend.cancels().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_cancels_the_outstanding_job() {
    let backend =
        Arc::new(MockBackend::new().with_default_status(JobStatus::new(JobState::Running)));
    let exec = executor(Arc::clone(&backend));

    let err = exec
        .execute(
            JobRequest::new("sleep 999", "long-1"),
            &CancellationToken::new(),
            Some(Duration::from_secs(3)),
        )
        .await
        .unwrap_err();

    match err {
        GantryError::Timeout { elapsed_ms, .. } => assert!(elapsed_ms >= 3000),
        other => panic!("expected Timeout, got {other}"),
    }
    assert_eq!(backend.cancels().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_poll_failures_are_retried_then_escalated() {
    let backend = Arc::new(MockBackend::new());
    for _ in 0..4 {
        backend.queue_poll_failure("connection reset");
    }
    let exec = RemoteExecutor::new(Arc::clone(&backend) as _).with_poll_config(
        PollConfig::default()
            .with_interval(Duration::from_millis(500))
            .with_max_poll_failures(3),
    );

    let err = exec
        .execute(
            JobRequest::new("sort big.txt", "sort-1"),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();

    match err {
        GantryError::Poll {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(attempts, 4);
            assert!(last_error.contains("connection reset"));
        }
        other => panic!("expected Poll, got {other}"),
    }
    assert!(backend.cancels().is_empty(), "escalation does not cancel");
}

#[tokio::test(start_paused = true)]
async fn poll_failure_followed_by_recovery_succeeds() {
    let backend = Arc::new(MockBackend::new());
    backend.queue_poll_failure("connection reset");
    backend.queue_status(JobStatus::new(JobState::Succeeded));
    let exec = executor(Arc::clone(&backend));

    let job = exec
        .execute(
            JobRequest::new("sort big.txt", "sort-1"),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(job.state, JobState::Succeeded);
}

#[tokio::test]
async fn submit_rejection_surfaces_as_submission_error() {
    let backend = Arc::new(MockBackend::new());
    backend.reject_next_submit("partition 'gpu' does not exist");
    let exec = executor(backend);

    let err = exec
        .execute(
            JobRequest::new("train model", "train-1"),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();

    match err {
        GantryError::Submission { backend, reason } => {
            assert_eq!(backend, "mock");
            assert!(reason.contains("partition 'gpu'"));
        }
        other => panic!("expected Submission, got {other}"),
    }
}

#[tokio::test]
async fn invalid_job_name_never_reaches_the_backend() {
    let backend = Arc::new(MockBackend::new());
    let exec = executor(Arc::clone(&backend));

    let err = exec
        .execute(
            JobRequest::new("echo hi", "has space"),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GantryError::Submission { .. }));
    assert!(backend.submissions().is_empty());
}

#[tokio::test]
async fn already_cancelled_token_short_circuits() {
    let backend = Arc::new(MockBackend::new());
    let exec = executor(Arc::clone(&backend));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = exec
        .execute(JobRequest::new("echo hi", "job-1"), &cancel, None)
        .await
        .unwrap_err();

    assert!(matches!(err, GantryError::Cancelled { .. }));
    assert!(backend.submissions().is_empty(), "nothing was submitted");
}

#[tokio::test]
async fn runner_dispatches_remote_work_and_audits_it() {
    let graph = Graph::new();
    let task = graph
        .add_task(
            Task::new("chunk1", "align")
                .with_in_port("in_reads")
                .with_out_port(
                    "out_bam",
                    resolvers::from_input("in_reads", |loc| format!("{loc}.bam")),
                )
                .with_work(WorkUnit::Remote(
                    RemoteWork::new("aligner {in.in_reads} -o {out.out_bam}")
                        .with_resource("cpus", "8"),
                )),
        )
        .unwrap();
    let src = graph
        .add_task(
            Task::new("reads", "emit").with_out_port("out_data", resolvers::fixed("/x/reads.fq")),
        )
        .unwrap();
    graph
        .connect(
            &src.out_port("out_data").unwrap(),
            &task.in_port("in_reads").unwrap(),
        )
        .unwrap();

    let backend = Arc::new(MockBackend::new());
    let log = AuditLog::new();
    let runner = TaskRunner::new(log.clone())
        .with_remote(RemoteExecutor::new(Arc::clone(&backend) as _));

    runner
        .run(&graph, task.id(), &CancellationToken::new())
        .await
        .unwrap();

    let subs = backend.submissions();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].command, "aligner /x/reads.fq -o /x/reads.fq.bam");
    assert_eq!(subs[0].job_name, "align.chunk1");
    assert_eq!(subs[0].resources["cpus"], "8");

    let records = log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Succeeded);
    assert_eq!(records[0].command, subs[0].command);
}
