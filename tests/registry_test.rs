use std::collections::BTreeSet;
use std::sync::Arc;

use engine_orchestrator::model::Capability;
use engine_orchestrator::registry::ModelRegistry;

fn desc(id: &str) -> engine_orchestrator::model::ModelDescriptor {
    engine_orchestrator::model::ModelDescriptor {
        model_id: id.to_string(),
        engine_preference: vec!["e1".into()],
        capability_set: BTreeSet::from([Capability::Generate]),
        quantization_tag: None,
        retired: false,
    }
}

#[tokio::test]
async fn concurrent_readers_never_observe_a_torn_state_during_register() {
    let registry = Arc::new(ModelRegistry::new(vec![desc("m1")]));

    let writer = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for i in 0..200 {
                registry.register(desc(&format!("dynamic-{i}")));
            }
        })
    };

    let reader = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for _ in 0..200 {
                // m1 must always resolve throughout, regardless of concurrent writes.
                assert!(registry.resolve("m1").is_ok());
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
    assert!(registry.len() >= 200);
}

#[tokio::test]
async fn capability_lookup_skips_retired_descriptors() {
    let registry = ModelRegistry::new(vec![desc("m1"), desc("m2")]);
    registry.retire("m2").unwrap();

    let live = registry.resolve_by_capability(Capability::Generate);
    let ids: Vec<_> = live.iter().map(|d| d.model_id.clone()).collect();
    assert!(ids.contains(&"m1".to_string()));
    assert!(!ids.contains(&"m2".to_string()));
}
