mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;
    use mock_service::MockService;
    use stampede::core::{DistributedConfig, Distribution, Endpoint};
    use stampede::{plan, Dispatcher};
    use std::time::Duration;

    fn distributed(rate: u64, secs: u64, distribution: Distribution) -> DistributedConfig {
        DistributedConfig {
            executor: constant_rate(rate, secs),
            distribution,
            endpoint: Endpoint {
                path: "/delay/ms/5".to_string(),
                discard_response_bodies: true,
                ..Endpoint::default()
            },
            start_time: Duration::ZERO,
            stagger: Duration::ZERO,
            think_time: None,
            graceful_stop: Duration::from_secs(5),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn weighted_split_across_services() {
        init();
        let a = MockService::start().await.unwrap();
        let b = MockService::start().await.unwrap();
        let targets = vec![target(&a, "node-a"), target(&b, "node-b")];

        let config = distributed(100, 2, Distribution::Weights(vec![70, 30]));
        let snapshot = Dispatcher::new(plan(&config, &targets).unwrap())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(snapshot.scenario("node-a").unwrap().total, 140);
        assert_eq!(snapshot.scenario("node-b").unwrap().total, 60);
        assert_eq!(a.hits(), 140);
        assert_eq!(b.hits(), 60);
        assert_eq!(snapshot.total(), snapshot.success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(30_000)]
    async fn explicit_loads_with_stagger() {
        init();
        let a = MockService::start().await.unwrap();
        let b = MockService::start().await.unwrap();
        let targets = vec![target(&a, "node-a"), target(&b, "node-b")];

        let mut config = distributed(1, 1, Distribution::Explicit(vec![10, 20]));
        config.stagger = Duration::from_secs(1);
        let dispatcher = Dispatcher::new(plan(&config, &targets).unwrap()).unwrap();
        let aggregator = dispatcher.aggregator();

        let observer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_200)).await;
            aggregator.snapshot()
        });
        let snapshot = dispatcher.run().await.unwrap();

        let midway = observer.await.unwrap();
        assert_eq!(midway.scenario("node-a").unwrap().total, 10);
        assert!(midway.scenario("node-b").unwrap().total < 20);

        assert_eq!(snapshot.scenario("node-b").unwrap().total, 20);
        assert_eq!(b.hits(), 20);
    }
}

#[cfg(feature = "integration")]
mod integration {
    use super::*;
    use mock_service::MockService;
    use stampede::core::{DistributedConfig, Distribution, Endpoint};
    use stampede::{plan, Dispatcher};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    #[ntest::timeout(120_000)]
    async fn seventy_thirty_for_twenty_seconds() {
        init();
        let a = MockService::start().await.unwrap();
        let b = MockService::start().await.unwrap();
        let targets = vec![target(&a, "node-a"), target(&b, "node-b")];

        let config = DistributedConfig {
            executor: constant_rate(100, 20),
            distribution: Distribution::Weights(vec![70, 30]),
            endpoint: Endpoint {
                path: "/noisy/ms/20".to_string(),
                ..Endpoint::default()
            },
            start_time: Duration::ZERO,
            stagger: Duration::ZERO,
            think_time: None,
            graceful_stop: Duration::from_secs(10),
        };
        let snapshot = Dispatcher::new(plan(&config, &targets).unwrap())
            .unwrap()
            .run()
            .await
            .unwrap();

        let node_a = snapshot.scenario("node-a").unwrap();
        let node_b = snapshot.scenario("node-b").unwrap();
        assert_eq!(node_a.total, 1_400);
        assert_eq!(node_b.total, 600);
        assert_eq!(node_a.dropped + node_b.dropped, 0);
        assert!((node_a.iteration_rate - 70.).abs() < 3.5);
        assert!((node_b.iteration_rate - 30.).abs() < 1.5);
    }
}
