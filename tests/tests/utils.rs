use mock_service::MockService;
use stampede::core::{Endpoint, Executor, ScenarioConfig, Target};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        FmtSubscriber::builder()
            .with_env_filter("stampede=debug,mock_service=info")
            .with_test_writer()
            .init();
    });
}

/// A target reaching the mock service, labelled `hostname`.
#[allow(unused)]
pub fn target(service: &MockService, hostname: &str) -> Target {
    Target::new(hostname, format!("127.0.0.1:{}", service.port()))
}

#[allow(unused)]
pub fn scenario(
    name: &str,
    executor: Executor,
    service: &MockService,
    path: &str,
) -> ScenarioConfig {
    let mut config = ScenarioConfig::new(name, executor, target(service, name));
    config.endpoint = Endpoint {
        path: path.to_string(),
        timeout: Duration::from_secs(5),
        ..Endpoint::default()
    };
    config.graceful_stop = Duration::from_secs(5);
    config
}

#[allow(unused)]
pub fn constant_vus(vus: u64, secs: u64) -> Executor {
    Executor::ConstantConcurrency {
        vus,
        duration: Duration::from_secs(secs),
        max_vus: None,
    }
}

#[allow(unused)]
pub fn constant_rate(rate: u64, secs: u64) -> Executor {
    Executor::ConstantArrivalRate {
        rate,
        time_unit: Duration::from_secs(1),
        duration: Duration::from_secs(secs),
        pre_allocated_vus: None,
        max_vus: None,
    }
}
