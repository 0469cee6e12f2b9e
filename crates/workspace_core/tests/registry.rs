use proptest::prelude::*;
use workspace_core::{Effect, Job, JobRegistry, Notification};

fn job(job_id: &str, workspace_id: Option<&str>) -> Job {
    Job {
        job_id: job_id.to_string(),
        workspace_id: workspace_id.map(ToOwned::to_owned),
        session_id: "s1".to_string(),
        kind: "chapter".to_string(),
        response_message_id: format!("assistant-{job_id}"),
        started_at_ms: 0,
    }
}

fn persisted(effects: &[Effect]) -> Option<Vec<Job>> {
    effects.iter().rev().find_map(|effect| match effect {
        Effect::PersistJobs(jobs) => Some(jobs.clone()),
        _ => None,
    })
}

#[test]
fn register_persists_and_flags_workspace() {
    workspace_logging::initialize_for_tests();
    let mut registry = JobRegistry::new();

    let effects = registry.register(job("j1", Some("ws1")));
    assert_eq!(persisted(&effects), Some(vec![job("j1", Some("ws1"))]));
    assert!(effects.contains(&Effect::Notify(Notification::ProcessingChanged {
        workspace_id: "ws1".to_string(),
        processing: true,
    })));
    assert!(registry.is_processing("ws1"));
    assert!(!registry.is_processing("ws2"));
}

#[test]
fn register_overwrites_by_job_id() {
    let mut registry = JobRegistry::new();
    registry.register(job("j1", Some("ws1")));
    let mut replacement = job("j1", Some("ws1"));
    replacement.kind = "outline".to_string();
    let effects = registry.register(replacement.clone());

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("j1"), Some(&replacement));
    // Flag did not change, so no notification.
    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, Effect::Notify(_))));
}

#[test]
fn unregister_closes_stream_and_clears_flag_only_when_last_job_leaves() {
    let mut registry = JobRegistry::new();
    registry.register(job("j1", Some("ws1")));
    registry.register(job("j2", Some("ws1")));

    let effects = registry.unregister("j1");
    assert_eq!(
        effects[0],
        Effect::CloseStream {
            job_id: "j1".to_string()
        }
    );
    assert!(registry.is_processing("ws1"));

    let effects = registry.unregister("j2");
    assert_eq!(persisted(&effects), Some(Vec::new()));
    assert!(!registry.is_processing("ws1"));

    assert!(registry.unregister("j2").is_empty());
}

#[test]
fn restore_returns_matching_and_unscoped_jobs() {
    let mut registry = JobRegistry::new();
    let (resumable, _effects) = registry.restore(
        vec![
            job("j1", Some("ws1")),
            job("j2", Some("ws2")),
            job("j3", None),
        ],
        "ws1",
    );

    let ids: Vec<_> = resumable.iter().map(|job| job.job_id.as_str()).collect();
    assert_eq!(ids, vec!["j1", "j3"]);
    assert_eq!(registry.len(), 3);
    assert!(registry.is_processing("ws1"));
    assert!(registry.is_processing("ws2"));
}

#[derive(Debug, Clone)]
enum Op {
    Register { job: u8, workspace: u8 },
    Unregister { job: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6, 0u8..3).prop_map(|(job, workspace)| Op::Register { job, workspace }),
        (0u8..6).prop_map(|job| Op::Unregister { job }),
    ]
}

proptest! {
    #[test]
    fn processing_flag_matches_persisted_set(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let workspaces = ["ws0", "ws1", "ws2"];
        let mut registry = JobRegistry::new();
        let mut last_persisted: Vec<Job> = Vec::new();

        for op in ops {
            let effects = match op {
                Op::Register { job: n, workspace } => registry.register(job(
                    &format!("j{n}"),
                    Some(workspaces[workspace as usize]),
                )),
                Op::Unregister { job: n } => registry.unregister(&format!("j{n}")),
            };
            if let Some(jobs) = persisted(&effects) {
                last_persisted = jobs;
            }

            prop_assert_eq!(&last_persisted, &registry.snapshot());
            for workspace in workspaces {
                let expected = last_persisted
                    .iter()
                    .any(|job| job.workspace_id.as_deref() == Some(workspace));
                prop_assert_eq!(registry.is_processing(workspace), expected);
            }
        }
    }
}
