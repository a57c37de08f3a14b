use echo_checkpoint::checkpoint::CheckpointDraft;
use echo_checkpoint::config::EngineConfig;
use echo_checkpoint::engine::Engine;
use echo_checkpoint::memory::{MemorySource, SourceType, StoreMemoryInput};
use echo_checkpoint::namespace::Namespace;
use echo_checkpoint::restore::{InclusionSource, RestoreRequest};

fn config_for(path: &std::path::Path) -> EngineConfig {
    let yaml = format!(
        "storage:\n  backend: file\n  path: {}\nrestore:\n  max_memories: 5\n",
        path.display()
    );
    EngineConfig::from_yaml_str(&yaml).unwrap()
}

#[tokio::test]
async fn resume_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("store.json");
    let ns = Namespace::parse("acme:support:triage:alice").unwrap();

    let (checkpoint_id, memory_id) = {
        let engine = Engine::from_config(config_for(&path)).unwrap();
        let memory = engine
            .lane()
            .store_memory(
                StoreMemoryInput::new(
                    ns.clone(),
                    "alice wants weekly summaries",
                    MemorySource::new(SourceType::User, "alice"),
                )
                .task_criticality(0.8),
            )
            .await
            .unwrap();
        let cp = CheckpointDraft::genesis(ns.clone(), "run-9", "agent")
            .memory_refs(vec![memory.memory_id.clone()])
            .seal()
            .unwrap();
        engine.ledger().save(&cp).await.unwrap();
        (cp.checkpoint_id, memory.memory_id)
    };

    let engine = Engine::from_config(config_for(&path)).unwrap();
    assert_eq!(engine.config().restore.max_memories, 5);
    let pack = engine
        .restore()
        .restore(RestoreRequest::new(ns.clone()).run("run-9"))
        .await
        .unwrap();
    assert_eq!(pack.checkpoint.checkpoint_id, checkpoint_id);
    assert_eq!(pack.memory_ids(), vec![memory_id.as_str()]);
    assert_eq!(pack.rationale.inclusions[0].source, InclusionSource::Referenced);

    let report = engine.ledger().verify_chain_integrity(&ns).await.unwrap();
    assert!(report.is_valid());
}
