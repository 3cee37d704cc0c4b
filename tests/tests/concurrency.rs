mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;
    use mock_service::MockService;
    use stampede::core::{Executor, Stage};
    use stampede::Dispatcher;
    use std::num::NonZeroU32;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn constant_vus_against_delay() {
        init();
        let service = MockService::start().await.unwrap();

        let config = scenario("steady", constant_vus(5, 2), &service, "/delay/ms/20");
        let snapshot = Dispatcher::new(vec![config]).unwrap().run().await.unwrap();

        let steady = snapshot.scenario("steady").unwrap();
        // 5 VUs * 2s / ~20ms
        assert!(
            (300..=520).contains(&steady.total),
            "total = {}",
            steady.total
        );
        assert_eq!(steady.failure, 0);
        assert_eq!(steady.total, service.hits());
        assert!(steady.latency.p50 >= Duration::from_millis(20));
        assert!(snapshot.complete);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn unexpected_status_is_a_failure() {
        init();
        let service = MockService::start().await.unwrap();

        let config = scenario("broken", constant_vus(2, 1), &service, "/status/503");
        let snapshot = Dispatcher::new(vec![config]).unwrap().run().await.unwrap();

        let broken = snapshot.scenario("broken").unwrap();
        assert!(broken.total > 0);
        assert_eq!(broken.success, 0);
        assert_eq!(broken.failures.status, broken.total);
        assert_eq!(broken.error_rate(), 1.);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn request_timeouts_are_classified() {
        init();
        let service = MockService::start().await.unwrap();

        let mut config = scenario("slow", constant_vus(2, 1), &service, "/delay/ms/2000");
        config.endpoint.timeout = Duration::from_millis(100);
        let snapshot = Dispatcher::new(vec![config]).unwrap().run().await.unwrap();

        let slow = snapshot.scenario("slow").unwrap();
        assert!(slow.total > 0);
        assert_eq!(slow.failures.timeout, slow.total);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn unreachable_target_is_recorded_not_fatal() {
        init();
        let service = MockService::start().await.unwrap();

        let mut config = scenario("gone", constant_vus(1, 1), &service, "/");
        config.target.address = "127.0.0.1:9".to_string();
        config.think_time = Some(Duration::from_millis(50));
        let snapshot = Dispatcher::new(vec![config]).unwrap().run().await.unwrap();

        let gone = snapshot.scenario("gone").unwrap();
        assert!(gone.total > 0);
        assert_eq!(gone.failures.connect, gone.total);
        assert_eq!(service.hits(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn max_rate_caps_throughput() {
        init();
        let service = MockService::start().await.unwrap();

        let mut config = scenario("capped", constant_vus(10, 2), &service, "/");
        config.max_rate = NonZeroU32::new(50);
        let snapshot = Dispatcher::new(vec![config]).unwrap().run().await.unwrap();

        let capped = snapshot.scenario("capped").unwrap();
        assert!(capped.total <= 115, "total = {}", capped.total);
        assert!(capped.total >= 80, "total = {}", capped.total);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn ramping_vus_reaches_target() {
        init();
        let service = MockService::start().await.unwrap();

        let executor = Executor::RampingConcurrency {
            start_vus: 0,
            stages: vec![
                Stage::new(Duration::from_secs(1), 8),
                Stage::new(Duration::from_secs(1), 8),
                Stage::new(Duration::ZERO, 2),
                Stage::new(Duration::from_secs(1), 2),
            ],
            max_vus: None,
        };
        let dispatcher =
            Dispatcher::new(vec![scenario("ramp", executor, &service, "/delay/ms/10")]).unwrap();
        let aggregator = dispatcher.aggregator();

        let observer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            let holding = aggregator.snapshot().scenarios[0].active_vus;
            tokio::time::sleep(Duration::from_millis(1_000)).await;
            let dropped = aggregator.snapshot().scenarios[0].active_vus;
            (holding, dropped)
        });

        let snapshot = dispatcher.run().await.unwrap();
        let (holding, dropped) = observer.await.unwrap();
        assert_eq!(holding, 8);
        assert_eq!(dropped, 2);
        assert_eq!(snapshot.scenarios[0].active_vus, 0);
    }
}

#[cfg(feature = "integration")]
mod integration {
    use super::*;
    use mock_service::MockService;
    use stampede::Dispatcher;

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    #[ntest::timeout(120_000)]
    async fn hundred_vus_for_twenty_seconds() {
        init();
        let service = MockService::start().await.unwrap();

        let config = scenario("hundred", constant_vus(100, 20), &service, "/delay/ms/50");
        let snapshot = Dispatcher::new(vec![config]).unwrap().run().await.unwrap();

        // 100 VUs * 20s / 50ms = 40,000, less request overhead.
        let hundred = snapshot.scenario("hundred").unwrap();
        assert!(
            (34_000..=40_100).contains(&hundred.total),
            "total = {}",
            hundred.total
        );
        assert_eq!(hundred.failure, 0);
    }
}
