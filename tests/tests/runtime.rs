mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;
    use mock_service::MockService;
    use stampede::core::RunSnapshot;
    use stampede_runtime::StampedeRuntime;
    use std::io::Write;
    use std::time::Duration;

    #[tracing_test::traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn runs_a_config_file_end_to_end() {
        let a = MockService::start().await.unwrap();
        let b = MockService::start().await.unwrap();

        let config = format!(
            r#"{{
                "scenarios": [
                    {{
                        "name": "smoke",
                        "executor": "constant-vus",
                        "vus": 2,
                        "duration": "1s",
                        "target": {{ "hostname": "smoke", "address": "127.0.0.1:{a}" }},
                        "endpoint": {{ "path": "/delay/ms/10", "method": "POST" }}
                    }}
                ],
                "distributed": {{
                    "executor": "constant-arrival-rate",
                    "rate": 20,
                    "duration": "1s",
                    "distribution": {{ "weights": [1, 1] }}
                }},
                "report_interval": "250ms"
            }}"#,
            a = a.port()
        );
        let manifest = format!(
            r#"[
                {{ "hostname": "node-a", "ip": "127.0.0.1:{a}" }},
                {{ "hostname": "node-b", "ip": "127.0.0.1:{b}" }}
            ]"#,
            a = a.port(),
            b = b.port()
        );

        let mut config_file = tempfile::NamedTempFile::new().unwrap();
        config_file.write_all(config.as_bytes()).unwrap();
        let mut manifest_file = tempfile::NamedTempFile::new().unwrap();
        manifest_file.write_all(manifest.as_bytes()).unwrap();
        let output = tempfile::NamedTempFile::new().unwrap();

        let snapshot = StampedeRuntime::new()
            .config_path(config_file.path())
            .targets_file(manifest_file.path())
            .output(output.path())
            .run()
            .await
            .unwrap();

        assert!(snapshot.complete);
        assert_eq!(snapshot.scenarios.len(), 3);
        assert_eq!(snapshot.scenario("node-a").unwrap().total, 10);
        assert_eq!(snapshot.scenario("node-b").unwrap().total, 10);
        assert!(snapshot.scenario("smoke").unwrap().total > 0);
        assert_eq!(b.hits(), 10);

        let written: RunSnapshot =
            serde_json::from_str(&std::fs::read_to_string(output.path()).unwrap()).unwrap();
        assert_eq!(written.total(), snapshot.total());
        assert!(logs_contain("Run complete"));
    }

    #[tokio::test]
    async fn mismatched_distribution_fails_before_any_load() {
        let service = MockService::start().await.unwrap();
        let config = r#"{
            "distributed": {
                "executor": "constant-vus",
                "vus": 10,
                "duration": "10s",
                "distribution": { "weights": [1, 1] }
            }
        }"#;
        let mut config_file = tempfile::NamedTempFile::new().unwrap();
        config_file.write_all(config.as_bytes()).unwrap();

        let err = StampedeRuntime::new()
            .config_path(config_file.path())
            .targets_list(&format!("127.0.0.1:{}", service.port()))
            .report_interval(Duration::from_secs(1))
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert_eq!(service.hits(), 0);
    }
}
