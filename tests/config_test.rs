use engine_orchestrator::config::GatewayConfig;

#[test]
fn from_file_loads_and_validates() {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("gateway-config-test-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{
            "engines": [
                {"identity": "e1", "family": "ollama", "base_url": "http://localhost:11434", "capabilities": ["generate", "embed"]}
            ],
            "models": [
                {"model_id": "m1", "engine_preference": ["e1"], "capability_set": ["generate"], "quantization_tag": null}
            ],
            "worker": {"concurrency": 2},
            "monitor": {"probe_interval_secs": 5}
        }"#,
    )
    .unwrap();

    let config = GatewayConfig::from_file(&path).unwrap();
    assert_eq!(config.worker.concurrency, 2);
    assert_eq!(config.monitor.probe_interval_secs, 5);
    // unset monitor field keeps its default
    assert_eq!(config.monitor.healthy_probe_interval_secs, 60);

    std::fs::remove_file(&path).ok();
}

#[test]
fn malformed_json_is_a_config_error() {
    let result = GatewayConfig::from_json_str("{ not json");
    assert!(result.is_err());
}

#[test]
fn zero_worker_concurrency_is_rejected() {
    let json = r#"{
        "engines": [{"identity": "e1", "family": "vllm", "base_url": "http://h", "capabilities": ["generate"]}],
        "models": [],
        "worker": {"concurrency": 0}
    }"#;
    assert!(GatewayConfig::from_json_str(json).is_err());
}
