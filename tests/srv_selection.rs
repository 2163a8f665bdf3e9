// Integration tests for SRV-driven service domains: priority tiers, weighted
// selection and failover between tiers.
mod common;

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc, time::Duration};

    use dyndir::{Director, DirectorConfig, NameResolver, PickError};

    use crate::common::MockResolver;

    fn director(name: &str, config: DirectorConfig, resolver: MockResolver) -> Director {
        let resolver: Arc<dyn NameResolver> = Arc::new(resolver);
        Director::new("vcl1", name, config, Some(resolver), None).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_priority_tier_and_weight_distribution() {
        let resolver = MockResolver::new()
            .srv(
                "_http._tcp.app.test",
                &[
                    (10, 1, "t1.test", 8080),
                    (10, 3, "t2.test", 8080),
                    (20, 1, "t3.test", 8080),
                ],
            )
            .host("t1.test", &["10.20.0.1"])
            .host("t2.test", &["10.20.0.2"])
            .host("t3.test", &["10.20.0.3"]);
        let director = director("srv", DirectorConfig::default(), resolver);

        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..4000 {
            let backend = director.service("_http._tcp.app.test").await.unwrap();
            *counts.entry(backend.key().addr.to_string()).or_default() += 1;
        }

        // The higher-priority-value tier is never consulted while the lower
        // one delivers.
        assert_eq!(counts.get("10.20.0.3"), None);

        let t1 = *counts.get("10.20.0.1").unwrap() as f64;
        let t2 = *counts.get("10.20.0.2").unwrap() as f64;
        let ratio = t2 / t1;
        assert!(
            (2.2..=4.0).contains(&ratio),
            "expected a roughly 1:3 split, got {t1}:{t2}"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zero_weight_target_held_back() {
        let resolver = MockResolver::new()
            .srv(
                "_http._tcp.zero.test",
                &[
                    (10, 0, "z.test", 8080),
                    (10, 2, "za.test", 8080),
                    (10, 1, "zb.test", 8080),
                ],
            )
            .host("z.test", &["10.21.0.1"])
            .host("za.test", &["10.21.0.2"])
            .host("zb.test", &["10.21.0.3"]);
        let director = director("srv0", DirectorConfig::default(), resolver);

        for _ in 0..500 {
            let backend = director.service("_http._tcp.zero.test").await.unwrap();
            assert_ne!(backend.key().addr.to_string(), "10.21.0.1");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failover_to_next_priority_tier() {
        // The preferred target never resolves to anything usable.
        let resolver = MockResolver::new()
            .srv(
                "_http._tcp.failover.test",
                &[(10, 1, "dead.test", 8080), (20, 1, "live.test", 8080)],
            )
            .script("dead.test", vec![Ok(Vec::new())])
            .host("live.test", &["10.22.0.1"]);
        let director = director("srvfail", DirectorConfig::default(), resolver);

        for _ in 0..20 {
            let backend = director.service("_http._tcp.failover.test").await.unwrap();
            assert_eq!(backend.key().addr.to_string(), "10.22.0.1");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exhausted_tiers_surface_an_error() {
        let resolver = MockResolver::new()
            .srv("_http._tcp.empty.test", &[(10, 1, "gone.test", 8080)])
            .script("gone.test", vec![Ok(Vec::new())]);
        let director = director("srvempty", DirectorConfig::default(), resolver);

        let err = director.service("_http._tcp.empty.test").await.unwrap_err();
        assert!(matches!(err, PickError::NoUsableTarget { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cold_service_times_out_like_a_domain() {
        let resolver = MockResolver::new()
            .latency(Duration::from_millis(300))
            .srv("_http._tcp.slow.test", &[(10, 1, "st.test", 8080)])
            .host("st.test", &["10.23.0.1"]);
        let config = DirectorConfig {
            first_lookup_timeout: 0.0,
            ..DirectorConfig::default()
        };
        let director = director("srvslow", config, resolver);

        let err = director.service("_http._tcp.slow.test").await.unwrap_err();
        assert!(matches!(err, PickError::ColdTimeout { .. }));
    }
}
