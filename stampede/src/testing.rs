/// An iteration that sleeps for a skew-normal latency and succeeds.
macro_rules! mock_iteration {
    ($m:expr, $s:expr) => {
        || async {
            use rand_distr::{Distribution, SkewNormal};
            let mean: std::time::Duration = $m;
            let std: std::time::Duration = $s;
            let latency = if std.is_zero() {
                mean.as_secs_f64()
            } else {
                let normal = SkewNormal::new(mean.as_secs_f64(), std.as_secs_f64(), 20.).unwrap();
                normal.sample(&mut rand::thread_rng()).max(0.)
            };
            tokio::time::sleep(std::time::Duration::from_secs_f64(latency)).await;
            Ok::<(), crate::error::RequestFailure>(())
        }
    };
}
