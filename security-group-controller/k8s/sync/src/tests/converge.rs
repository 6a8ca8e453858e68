use super::*;
use crate::{policy, sync::Error, Context, ReconcileMetrics, Synchronizer};
use korifi_security_group_controller_core::{resolve, translate_all};
use kube::runtime::controller::Action;
use maplit::btreemap;
use pretty_assertions::assert_eq;
use std::time::Duration;

const RESYNC: Duration = Duration::from_secs(600);

fn context(cluster: FakeCluster) -> Context<FakeCluster> {
    Context::new(cluster, ReconcileMetrics::default(), RESYNC)
}

fn workload_types(policy: &NetworkPolicy) -> serde_json::Value {
    serde_json::to_value(policy).unwrap()["spec"]["podSelector"]["matchExpressions"][0]["values"]
        .clone()
}

#[tokio::test]
async fn end_to_end_example() {
    let ctx = context(FakeCluster::with_spaces(["space-A", "space-B"]));
    let group = group(
        "sg-1",
        spec(
            vec![rule(Protocol::Tcp, "192.168.1.1", Some("80"))],
            btreemap! { "space-A".to_string() => SecurityGroupWorkloads::RUNNING },
            Default::default(),
        ),
    );

    let action = ctx.reconcile(&group).await.expect("reconcile must succeed");
    assert_eq!(action, Action::requeue(RESYNC));

    let cluster = ctx.client();
    assert_eq!(cluster.policy_namespaces("sg-1"), vec!["space-A"]);

    let policy = cluster.policy("space-A", "sg-1").expect("policy must exist");
    let spec = serde_json::to_value(policy.spec).unwrap();
    assert_eq!(
        spec,
        serde_json::json!({
            "podSelector": {
                "matchExpressions": [{
                    "key": "korifi.cloudfoundry.org/workload-type",
                    "operator": "In",
                    "values": ["app"],
                }],
            },
            "policyTypes": ["Egress"],
            "egress": [{
                "ports": [{"protocol": "TCP", "port": 80}],
                "to": [{"ipBlock": {"cidr": "192.168.1.1/32"}}],
            }],
        })
    );

    let status = cluster.last_status().expect("status must be patched");
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(status.conditions.len(), 1);
    assert_eq!(status.conditions[0].type_, "Ready");
    assert_eq!(status.conditions[0].status, "True");
    assert_eq!(status.conditions[0].reason, "Synced");
}

#[tokio::test]
async fn second_pass_writes_nothing() {
    let ctx = context(FakeCluster::with_spaces(["space-a", "space-b", "space-c"]));
    let mut group = group(
        "sg-1",
        spec(
            vec![
                rule(Protocol::Tcp, "10.0.0.0-10.0.0.255", Some("443,8443")),
                rule(Protocol::All, "172.16.0.0/12", None),
            ],
            btreemap! {
                "space-a".to_string() => SecurityGroupWorkloads::BOTH,
                "space-b".to_string() => SecurityGroupWorkloads::STAGING,
            },
            SecurityGroupWorkloads::RUNNING,
        ),
    );

    ctx.reconcile(&group).await.unwrap();
    let writes = ctx.client().writes();
    assert_eq!(writes, 3);

    group.status = ctx.client().last_status();
    ctx.reconcile(&group).await.unwrap();
    assert_eq!(ctx.client().writes(), writes, "second pass must not write");
}

#[tokio::test]
async fn global_group_extends_to_new_spaces() {
    let ctx = context(FakeCluster::with_spaces(["space-a"]));
    let group = group(
        "sg-global",
        spec(
            vec![rule(Protocol::Udp, "8.8.8.8", Some("53"))],
            Default::default(),
            SecurityGroupWorkloads::RUNNING,
        ),
    );

    ctx.reconcile(&group).await.unwrap();
    assert_eq!(ctx.client().policy_namespaces("sg-global"), vec!["space-a"]);

    ctx.client().add_space("space-new");
    ctx.reconcile(&group).await.unwrap();
    assert_eq!(
        ctx.client().policy_namespaces("sg-global"),
        vec!["space-a", "space-new"]
    );
    let policy = ctx.client().policy("space-new", "sg-global").unwrap();
    assert_eq!(workload_types(&policy), serde_json::json!(["app"]));
}

#[tokio::test]
async fn running_and_staging_share_one_policy() {
    let ctx = context(FakeCluster::with_spaces(["space-a"]));
    let group = group(
        "sg-1",
        spec(
            vec![rule(Protocol::Tcp, "10.0.0.1", Some("5432"))],
            btreemap! { "space-a".to_string() => SecurityGroupWorkloads::BOTH },
            Default::default(),
        ),
    );

    ctx.reconcile(&group).await.unwrap();
    assert_eq!(ctx.client().policy_namespaces("sg-1"), vec!["space-a"]);
    let policy = ctx.client().policy("space-a", "sg-1").unwrap();
    assert_eq!(workload_types(&policy), serde_json::json!(["app", "build"]));
}

#[tokio::test]
async fn unbinding_deletes_only_the_orphan() {
    let ctx = context(FakeCluster::with_spaces(["space-a", "space-b"]));
    let rules = vec![rule(Protocol::Tcp, "10.0.0.1", Some("80"))];
    let bound = group(
        "sg-1",
        spec(
            rules.clone(),
            btreemap! {
                "space-a".to_string() => SecurityGroupWorkloads::RUNNING,
                "space-b".to_string() => SecurityGroupWorkloads::RUNNING,
            },
            Default::default(),
        ),
    );
    ctx.reconcile(&bound).await.unwrap();
    let before = ctx.client().policy("space-a", "sg-1").unwrap();

    let unbound = group(
        "sg-1",
        spec(
            rules,
            btreemap! { "space-a".to_string() => SecurityGroupWorkloads::RUNNING },
            Default::default(),
        ),
    );
    let writes = ctx.client().writes();
    ctx.reconcile(&unbound).await.unwrap();

    assert_eq!(ctx.client().writes(), writes + 1);
    assert_eq!(ctx.client().policy_namespaces("sg-1"), vec!["space-a"]);
    assert_eq!(ctx.client().policy("space-a", "sg-1").unwrap(), before);
}

#[tokio::test]
async fn rule_changes_replace_policies() {
    let ctx = context(FakeCluster::with_spaces(["space-a"]));
    let spaces = btreemap! { "space-a".to_string() => SecurityGroupWorkloads::RUNNING };
    let v1 = group(
        "sg-1",
        spec(
            vec![rule(Protocol::Tcp, "10.0.0.1", Some("80"))],
            spaces.clone(),
            Default::default(),
        ),
    );
    ctx.reconcile(&v1).await.unwrap();

    let v2 = group(
        "sg-1",
        spec(
            vec![rule(Protocol::Tcp, "10.0.0.1", Some("80-90"))],
            spaces,
            Default::default(),
        ),
    );
    ctx.reconcile(&v2).await.unwrap();

    assert_eq!(ctx.client().writes(), 2);
    let policy = ctx.client().policy("space-a", "sg-1").unwrap();
    let egress = serde_json::to_value(&policy).unwrap()["spec"]["egress"].clone();
    assert_eq!(
        egress,
        serde_json::json!([{
            "ports": [{"protocol": "TCP", "port": 80, "endPort": 90}],
            "to": [{"ipBlock": {"cidr": "10.0.0.1/32"}}],
        }])
    );
}

#[tokio::test]
async fn empty_group_derives_nothing() {
    let ctx = context(FakeCluster::with_spaces(["space-a"]));
    let group = group(
        "sg-empty",
        spec(vec![], Default::default(), Default::default()),
    );

    let action = ctx.reconcile(&group).await.unwrap();
    assert_eq!(action, Action::requeue(RESYNC));
    assert_eq!(ctx.client().writes(), 0);
    assert!(ctx.client().policy_namespaces("sg-empty").is_empty());
}

#[tokio::test]
async fn missing_namespace_is_skipped() {
    let cluster = FakeCluster::with_spaces(["space-a"]);
    let metrics = ReconcileMetrics::default();
    let spec = spec(
        vec![rule(Protocol::Tcp, "10.0.0.1", Some("80"))],
        btreemap! {
            "space-a".to_string() => SecurityGroupWorkloads::RUNNING,
            "space-gone".to_string() => SecurityGroupWorkloads::RUNNING,
        },
        Default::default(),
    );
    let targets = resolve(&spec, ["space-a"]);

    let summary = Synchronizer::new(&cluster, &metrics)
        .sync("sg-1", &spec, &targets)
        .await
        .expect("a vanished namespace must not fail the pass");
    assert_eq!(summary.created, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(cluster.policy_namespaces("sg-1"), vec!["space-a"]);
}

#[tokio::test]
async fn failed_namespace_does_not_block_others() {
    let cluster = FakeCluster::with_spaces(["space-a", "space-b", "space-c"]);
    cluster.fail_writes_in("space-b");
    let metrics = ReconcileMetrics::default();
    let spec = spec(
        vec![rule(Protocol::All, "10.0.0.0/8", None)],
        Default::default(),
        SecurityGroupWorkloads::STAGING,
    );
    let targets = resolve(&spec, ["space-a", "space-b", "space-c"]);
    let synchronizer = Synchronizer::new(&cluster, &metrics);

    match synchronizer.sync("sg-1", &spec, &targets).await {
        Err(Error::Incomplete(failures)) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].namespace, "space-b");
        }
        res => panic!("expected an incomplete pass, got {res:?}"),
    }
    assert_eq!(cluster.policy_namespaces("sg-1"), vec!["space-a", "space-c"]);

    cluster.heal();
    let summary = synchronizer.sync("sg-1", &spec, &targets).await.unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.unchanged, 2);
}

#[tokio::test]
async fn sync_failure_marks_group_not_ready() {
    let cluster = FakeCluster::with_spaces(["space-a"]);
    cluster.fail_writes_in("space-a");
    let ctx = context(cluster);
    let group = group(
        "sg-1",
        spec(
            vec![rule(Protocol::Tcp, "10.0.0.1", Some("80"))],
            btreemap! { "space-a".to_string() => SecurityGroupWorkloads::RUNNING },
            Default::default(),
        ),
    );

    assert!(ctx.reconcile(&group).await.is_err());
    let status = ctx.client().last_status().unwrap();
    assert_eq!(status.conditions[0].status, "False");
    assert_eq!(status.conditions[0].reason, "SyncFailed");
}

#[tokio::test]
async fn invalid_rules_write_nothing() {
    let cluster = FakeCluster::with_spaces(["space-a"]);
    cluster.insert_policy(policy::network_policy(
        "sg-1",
        "space-a",
        SecurityGroupWorkloads::RUNNING,
        &translate_all(&[rule(Protocol::Tcp, "10.0.0.1", Some("80"))]).unwrap(),
    ));
    let ctx = context(cluster);
    let group = group(
        "sg-1",
        spec(
            vec![
                rule(Protocol::Tcp, "10.0.0.1", Some("80")),
                rule(Protocol::All, "10.0.0.1", Some("80")),
            ],
            Default::default(),
            Default::default(),
        ),
    );

    let action = ctx.reconcile(&group).await.unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(ctx.client().writes(), 0);
    assert_eq!(ctx.client().policy_namespaces("sg-1"), vec!["space-a"]);

    let status = ctx.client().last_status().unwrap();
    assert_eq!(status.conditions[0].status, "False");
    assert_eq!(status.conditions[0].reason, "InvalidRules");
    assert_eq!(
        status.conditions[0].message,
        "rules are invalid: rules[1]: ports are not allowed for protocol all"
    );
}

#[tokio::test]
async fn space_listing_failure_is_retried() {
    let cluster = FakeCluster::with_spaces(["space-a"]);
    cluster.fail_list_spaces();
    let ctx = context(cluster);
    let group = group(
        "sg-1",
        spec(vec![], Default::default(), SecurityGroupWorkloads::RUNNING),
    );

    let error = ctx.reconcile(&group).await.unwrap_err();
    assert!(matches!(error, crate::Error::ListSpaces(_)), "{error}");
    assert_eq!(ctx.client().writes(), 0);
}
