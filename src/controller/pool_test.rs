//! Unit tests for pool convergence.
//!
//! Run with: `cargo test -p ltm-reconciler pool_test`

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::{ReconcilerConfig, StoreConfig};
    use crate::controller::{converge_pool, create_pool, pool_exists, read_pool};
    use crate::error::Error;
    use crate::resource::PoolSpec;
    use crate::store::memory::{Call, Op};
    use crate::store::{IControlClient, InMemoryStore, Pool};

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn pool(name: &str) -> Pool {
        Pool {
            name: name.to_string(),
            partition: "Common".to_string(),
            allow_nat: true,
            allow_snat: true,
            load_balancing_mode: "round-robin".to_string(),
            monitor: String::new(),
        }
    }

    fn store_with_nodes(names: &[&str]) -> InMemoryStore {
        names
            .iter()
            .enumerate()
            .fold(InMemoryStore::new(), |store, (i, name)| {
                store.with_node(name, "Common", &format!("10.0.0.{}", i + 1))
            })
    }

    fn spec(name: &str, members: &[&str]) -> PoolSpec {
        PoolSpec::new(name)
            .with_members(members.iter().copied())
            .unwrap()
    }

    fn member_call(op: Op, member: &str) -> Call {
        let (pool, partition, member) = ("web".to_string(), "Common".to_string(), member.to_string());
        match op {
            Op::AddPoolMember => Call::AddPoolMember { pool, partition, member },
            _ => Call::DeletePoolMember { pool, partition, member },
        }
    }

    // -----------------------------------------------------------------------
    // Convergence
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_swap_member_issues_exact_calls() {
        let store = store_with_nodes(&["a", "b", "c"]).with_pool(pool("web"), &["a:80", "b:80"]);
        let config = ReconcilerConfig::default();

        converge_pool(&store, &config, "web", &spec("web", &["b:80", "c:80"]))
            .await
            .unwrap();

        let calls = store.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].op(), Op::ModifyPool);
        assert_eq!(
            calls[1],
            Call::PoolMembers {
                pool: "web".to_string(),
                partition: "Common".to_string()
            }
        );
        assert_eq!(calls[2], member_call(Op::DeletePoolMember, "a:80"));
        assert_eq!(calls[3], member_call(Op::AddPoolMember, "c:80"));

        let mut members = store.members("web", "Common");
        members.sort();
        assert_eq!(members, vec!["b:80".to_string(), "c:80".to_string()]);
    }

    #[tokio::test]
    async fn test_removals_happen_before_additions() {
        let store = store_with_nodes(&["a", "b", "c", "d"]).with_pool(pool("web"), &["a:80", "b:80"]);
        let config = ReconcilerConfig::default();

        converge_pool(&store, &config, "web", &spec("web", &["c:80", "d:80"]))
            .await
            .unwrap();

        let ops: Vec<Op> = store.calls().iter().map(Call::op).collect();
        assert_eq!(
            ops,
            vec![
                Op::ModifyPool,
                Op::PoolMembers,
                Op::DeletePoolMember,
                Op::DeletePoolMember,
                Op::AddPoolMember,
                Op::AddPoolMember,
            ]
        );
    }

    #[tokio::test]
    async fn test_unchanged_pool_still_overwrites_attributes() {
        let store = store_with_nodes(&["a"]).with_pool(pool("web"), &["a:80"]);
        let config = ReconcilerConfig::default();

        converge_pool(&store, &config, "web", &spec("web", &["a:80"]))
            .await
            .unwrap();

        let ops: Vec<Op> = store.calls().iter().map(Call::op).collect();
        assert_eq!(ops, vec![Op::ModifyPool, Op::PoolMembers]);
    }

    #[tokio::test]
    async fn test_attributes_and_monitor_rule_are_pushed() {
        let store = InMemoryStore::new().with_pool(pool("web"), &[]);
        let config = ReconcilerConfig::default();
        let mut desired = PoolSpec::new("web").with_monitors(["/Common/tcp", "/Common/http"]);
        desired.allow_snat = false;
        desired.load_balancing_mode = "least-connections-member".to_string();

        converge_pool(&store, &config, "web", &desired).await.unwrap();

        let modify_calls = store.calls_of(Op::ModifyPool);
        let Call::ModifyPool { pool: sent, .. } = &modify_calls[0] else {
            panic!("expected a ModifyPool call");
        };
        assert_eq!(sent.monitor, "/Common/http and /Common/tcp");
        assert!(sent.allow_nat);
        assert!(!sent.allow_snat);
        assert_eq!(sent.load_balancing_mode, "least-connections-member");
        assert_eq!(store.pool("web", "Common").unwrap().monitor, "/Common/http and /Common/tcp");
    }

    #[tokio::test]
    async fn test_attribute_failure_stops_before_membership() {
        let store = store_with_nodes(&["a"]).with_pool(pool("web"), &[]);
        store.fail(Op::ModifyPool, None, 400, "01070734:3: Configuration error: bad mode");
        let config = ReconcilerConfig::default();

        let err = converge_pool(&store, &config, "web", &spec("web", &["a:80"]))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "01070734:3: Configuration error: bad mode");
        assert!(store.calls_of(Op::PoolMembers).is_empty());
        assert!(store.members("web", "Common").is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_is_finished_by_next_pass() {
        let store = store_with_nodes(&["a", "b", "c"]).with_pool(pool("web"), &[]);
        store.fail(Op::AddPoolMember, Some("b:80"), 500, "boom");
        let config = ReconcilerConfig::default();
        let desired = spec("web", &["a:80", "b:80", "c:80"]);

        let err = converge_pool(&store, &config, "web", &desired)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store { status: 500, .. }));
        // a:80 stays; nothing is rolled back
        assert_eq!(store.members("web", "Common"), vec!["a:80".to_string()]);

        store.clear_faults();
        store.clear_calls();
        converge_pool(&store, &config, "web", &desired).await.unwrap();

        assert_eq!(
            store.calls_of(Op::AddPoolMember),
            vec![
                member_call(Op::AddPoolMember, "b:80"),
                member_call(Op::AddPoolMember, "c:80"),
            ]
        );
        let mut members = store.members("web", "Common");
        members.sort();
        assert_eq!(members, vec!["a:80", "b:80", "c:80"]);
    }

    #[tokio::test]
    async fn test_already_removed_member_is_not_an_error() {
        let store = store_with_nodes(&["a", "b"]).with_pool(pool("web"), &["a:80"]);
        store.fail(
            Op::DeletePoolMember,
            Some("a:80"),
            404,
            "01020036:3: The requested Pool Member (/Common/web /Common/a:80) was not found.",
        );
        let config = ReconcilerConfig::default();

        converge_pool(&store, &config, "web", &spec("web", &["b:80"]))
            .await
            .unwrap();
        assert_eq!(store.calls_of(Op::AddPoolMember).len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_spec_makes_no_calls() {
        let store = InMemoryStore::new().with_pool(pool("web"), &[]);
        let config = ReconcilerConfig::default();
        let mut desired = PoolSpec::new("web");
        desired.load_balancing_mode = String::new();

        let err = converge_pool(&store, &config, "web", &desired)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_partition_is_used() {
        let mut tenant = pool("web");
        tenant.partition = "Tenant1".to_string();
        let store = InMemoryStore::new()
            .with_node("a", "Tenant1", "10.1.0.1")
            .with_pool(tenant, &[]);
        let config = ReconcilerConfig::default();
        let mut desired = spec("web", &["a:80"]);
        desired.partition = Some("Tenant1".to_string());

        converge_pool(&store, &config, "web", &desired).await.unwrap();
        assert_eq!(store.members("web", "Tenant1"), vec!["a:80".to_string()]);
    }

    // -----------------------------------------------------------------------
    // Read / create
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_read_missing_pool_is_none() {
        let store = InMemoryStore::new();
        let config = ReconcilerConfig::default();

        assert!(read_pool(&store, &config, "web", None).await.unwrap().is_none());
        assert!(!pool_exists(&store, &config, "web", None).await.unwrap());
        assert!(store.calls_of(Op::PoolMembers).is_empty());
    }

    #[tokio::test]
    async fn test_read_returns_attributes_and_members() {
        let mut stored = pool("web");
        stored.monitor = "/Common/http and /Common/tcp".to_string();
        stored.allow_nat = false;
        let store = InMemoryStore::new().with_pool(stored, &["a:80", "b:443"]);
        let config = ReconcilerConfig::default();

        let state = read_pool(&store, &config, "web", Some("")).await.unwrap().unwrap();
        assert_eq!(state.id, "web");
        assert_eq!(state.partition, "Common");
        assert!(!state.allow_nat);
        assert_eq!(state.monitors.len(), 2);
        assert!(state.nodes.contains("b:443"));
    }

    #[tokio::test]
    async fn test_read_fills_in_missing_partition() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"name":"web","partition":"","allowNat":"yes","allowSnat":"yes","loadBalancingMode":"round-robin","monitor":"/Common/http"}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web/members"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"items":[{"name":"a:80"}]}"#),
            )
            .mount(&server)
            .await;

        let client = IControlClient::new(&StoreConfig {
            url: server.uri(),
            ..StoreConfig::default()
        })
        .unwrap();
        let config = ReconcilerConfig::default();

        let state = read_pool(&client, &config, "web", None).await.unwrap().unwrap();
        assert_eq!(state.partition, "Common");
        assert_eq!(state.monitors.into_iter().collect::<Vec<_>>(), vec!["/Common/http"]);
        assert_eq!(state.nodes.into_iter().collect::<Vec<_>>(), vec!["a:80"]);
    }

    #[tokio::test]
    async fn test_create_pool_creates_then_converges() {
        let store = store_with_nodes(&["a"]);
        let config = ReconcilerConfig::default();

        let state = create_pool(&store, &config, &spec("web", &["a:80"]))
            .await
            .unwrap();

        let ops: Vec<Op> = store.calls().iter().map(Call::op).collect();
        assert_eq!(
            &ops[..4],
            &[Op::CreatePool, Op::ModifyPool, Op::PoolMembers, Op::AddPoolMember]
        );
        assert_eq!(state.id, "web");
        assert_eq!(state.partition, "Common");
        assert_eq!(state.nodes.into_iter().collect::<Vec<_>>(), vec!["a:80"]);
    }

    #[tokio::test]
    async fn test_failed_create_deletes_pool_and_keeps_error() {
        let store = store_with_nodes(&["a"]);
        store.fail(Op::AddPoolMember, None, 500, "member add failed");
        let config = ReconcilerConfig::default();

        let err = create_pool(&store, &config, &spec("web", &["a:80"]))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "member add failed");
        assert_eq!(store.calls_of(Op::DeletePool).len(), 1);
        assert!(store.pool("web", "Common").is_none());
    }

    #[tokio::test]
    async fn test_failed_cleanup_still_returns_convergence_error() {
        let store = store_with_nodes(&["a"]);
        store.fail(Op::ModifyPool, None, 400, "bad attributes");
        store.fail(Op::DeletePool, None, 500, "cleanup failed");
        let config = ReconcilerConfig::default();

        let err = create_pool(&store, &config, &spec("web", &["a:80"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "bad attributes");
    }

    #[tokio::test]
    async fn test_create_existing_pool_is_conflict() {
        let store = InMemoryStore::new().with_pool(pool("web"), &[]);
        let config = ReconcilerConfig::default();

        let err = create_pool(&store, &config, &PoolSpec::new("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store { status: 409, .. }));
        assert!(store.calls_of(Op::ModifyPool).is_empty());
    }
}
