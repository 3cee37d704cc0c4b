mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;
    use mock_service::MockService;
    use stampede::core::{Executor, Stage};
    use stampede::Dispatcher;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn constant_rate_is_exact() {
        init();
        let service = MockService::start().await.unwrap();

        let config = scenario("rate", constant_rate(50, 2), &service, "/delay/ms/10");
        let snapshot = Dispatcher::new(vec![config]).unwrap().run().await.unwrap();

        let rate = snapshot.scenario("rate").unwrap();
        assert_eq!(rate.total, 100);
        assert_eq!(rate.dropped, 0);
        assert_eq!(service.hits(), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn saturated_pool_drops_arrivals() {
        init();
        let service = MockService::start().await.unwrap();

        let executor = Executor::ConstantArrivalRate {
            rate: 20,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(1),
            pre_allocated_vus: Some(1),
            max_vus: Some(2),
        };
        let config = scenario("saturated", executor, &service, "/delay/ms/3000");
        let start = std::time::Instant::now();
        let snapshot = Dispatcher::new(vec![config]).unwrap().run().await.unwrap();

        let saturated = snapshot.scenario("saturated").unwrap();
        assert_eq!(saturated.total, 2);
        assert_eq!(saturated.dropped, 18);
        assert_eq!(saturated.total + saturated.dropped, 20);
        // The clock kept going; only the graceful drain waited on the slow requests.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn ramping_rate_over_a_minute_unit() {
        init();
        let service = MockService::start().await.unwrap();

        // 0 -> 3600/min over 2s, i.e. 0 -> 60/s: 60 arrivals.
        let executor = Executor::RampingArrivalRate {
            start_rate: 0,
            time_unit: Duration::from_secs(60),
            stages: vec![Stage::new(Duration::from_secs(2), 3600)],
            pre_allocated_vus: None,
            max_vus: None,
        };
        let config = scenario("ramp", executor, &service, "/");
        let snapshot = Dispatcher::new(vec![config]).unwrap().run().await.unwrap();

        let ramp = snapshot.scenario("ramp").unwrap();
        assert_eq!(ramp.total + ramp.dropped, 60);
        assert_eq!(ramp.dropped, 0);
    }
}
