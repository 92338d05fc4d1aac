use casbin::{Adapter, CoreApi, DefaultModel, Enforcer, Filter, MgmtApi, Model};
use casbin_docstore::{Config, DocStoreAdapter, RuleRow, load_model, save_model_text};
use docstore::memory::InMemoryStore;
use docstore::{DocumentStore, Key, encode};
use std::sync::Arc;

const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

fn shared_store() -> Arc<dyn DocumentStore> {
    Arc::new(InMemoryStore::new())
}

fn adapter(store: &Arc<dyn DocumentStore>, namespace: &str) -> DocStoreAdapter {
    DocStoreAdapter::with_config(store.clone(), Config::new("casbin", namespace))
}

async fn empty_model() -> DefaultModel {
    DefaultModel::from_str(MODEL).await.expect("model")
}

fn rule(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn policies(m: &DefaultModel, sec: &str, ptype: &str) -> Vec<Vec<String>> {
    let mut rules: Vec<Vec<String>> = m
        .get_model()
        .get(sec)
        .and_then(|ast_map| ast_map.get(ptype))
        .map(|ast| ast.get_policy().iter().cloned().collect())
        .unwrap_or_default();
    rules.sort();
    rules
}

async fn stored_rules(adapter: &DocStoreAdapter) -> Vec<Vec<String>> {
    let mut rules: Vec<Vec<String>> = adapter
        .load_rules()
        .await
        .expect("rules")
        .iter()
        .map(|row| {
            let mut rule = vec![row.p_type.clone()];
            rule.extend(row.to_rule());
            rule
        })
        .collect();
    rules.sort();
    rules
}

async fn scenario_model() -> DefaultModel {
    let mut m = empty_model().await;
    m.add_policy("p", "p", rule(&["alice", "data1", "read"]));
    m.add_policy("g", "g", rule(&["alice", "admin"]));
    m
}

#[tokio::test]
async fn save_then_load_reproduces_both_sections() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    let mut saved = scenario_model().await;
    adapter.save_policy(&mut saved).await.expect("save");

    let mut loaded = empty_model().await;
    adapter.load_policy(&mut loaded).await.expect("load");
    assert_eq!(
        policies(&loaded, "p", "p"),
        vec![rule(&["alice", "data1", "read"])]
    );
    assert_eq!(policies(&loaded, "g", "g"), vec![rule(&["alice", "admin"])]);
    assert!(!adapter.is_filtered());
}

#[tokio::test]
async fn save_policy_replaces_everything() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    adapter
        .add_policy("p", "p", rule(&["stale", "data9", "write"]))
        .await
        .expect("add");

    let mut m = scenario_model().await;
    adapter.save_policy(&mut m).await.expect("first save");
    adapter.save_policy(&mut m).await.expect("second save");

    assert_eq!(
        stored_rules(&adapter).await,
        vec![rule(&["g", "alice", "admin"]), rule(&["p", "alice", "data1", "read"])]
    );
}

#[tokio::test]
async fn remove_undoes_add_and_repeats_as_noop() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    let policy = rule(&["alice", "data1", "read"]);

    assert!(adapter.add_policy("p", "p", policy.clone()).await.expect("add"));
    assert!(adapter.remove_policy("p", "p", policy.clone()).await.expect("remove"));
    assert!(stored_rules(&adapter).await.is_empty());

    let again = adapter.remove_policy("p", "p", policy).await.expect("second remove");
    assert!(!again);
}

#[tokio::test]
async fn remove_deletes_duplicates_and_ignores_v5() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    let six = rule(&["a", "b", "c", "d", "e", "f"]);
    adapter.add_policy("p", "p", six.clone()).await.expect("add");
    adapter.add_policy("p", "p", six).await.expect("add duplicate");

    let removed = adapter
        .remove_policy("p", "p", rule(&["a", "b", "c", "d", "e", "other"]))
        .await
        .expect("remove");
    assert!(removed);
    assert!(stored_rules(&adapter).await.is_empty());
}

#[tokio::test]
async fn remove_policy_does_not_match_longer_rules() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    adapter
        .add_policy("p", "p", rule(&["alice", "data1", "read"]))
        .await
        .expect("add");

    let removed = adapter
        .remove_policy("p", "p", rule(&["alice", "data1"]))
        .await
        .expect("remove");
    assert!(!removed);
    assert_eq!(stored_rules(&adapter).await.len(), 1);
}

#[tokio::test]
async fn filtered_removal_treats_empty_values_as_wildcards() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    adapter
        .add_policies(
            "p",
            "p",
            vec![
                rule(&["alice", "data1", "write"]),
                rule(&["bob", "data2", "write"]),
                rule(&["alice", "data1", "read"]),
            ],
        )
        .await
        .expect("add");

    let removed = adapter
        .remove_filtered_policy("p", "p", 1, rule(&["", "write"]))
        .await
        .expect("remove filtered");
    assert!(removed);
    assert_eq!(
        stored_rules(&adapter).await,
        vec![rule(&["p", "alice", "data1", "read"])]
    );

    let none = adapter
        .remove_filtered_policy("p", "p", 0, rule(&["carol"]))
        .await
        .expect("remove filtered");
    assert!(!none);
}

#[tokio::test]
async fn filtered_removal_past_last_field_removes_nothing() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    adapter
        .add_policy("p", "p", rule(&["alice", "data1", "read"]))
        .await
        .expect("add");

    let removed = adapter
        .remove_filtered_policy("p", "p", 5, rule(&["", "x"]))
        .await
        .expect("remove filtered");
    assert!(!removed);
    assert_eq!(stored_rules(&adapter).await.len(), 1);
}

#[tokio::test]
async fn load_truncates_at_first_empty_field() {
    let store = shared_store();
    let row = RuleRow {
        p_type: "p".to_string(),
        v0: "a".to_string(),
        v1: "b".to_string(),
        v2: String::new(),
        v3: "x".to_string(),
        ..RuleRow::default()
    };
    store
        .put(Key::incomplete("casbin"), encode(&row).expect("encode"))
        .await
        .expect("put");

    let mut adapter = adapter(&store, "");
    let mut m = empty_model().await;
    adapter.load_policy(&mut m).await.expect("load");
    assert_eq!(policies(&m, "p", "p"), vec![rule(&["a", "b"])]);
}

#[tokio::test]
async fn load_skips_rows_for_unknown_policy_types() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    adapter
        .add_policy("p", "p9", rule(&["alice", "data1", "read"]))
        .await
        .expect("add");
    adapter
        .add_policy("g", "g", rule(&["alice", "admin"]))
        .await
        .expect("add");

    let mut m = empty_model().await;
    adapter.load_policy(&mut m).await.expect("load");
    assert!(policies(&m, "p", "p").is_empty());
    assert_eq!(policies(&m, "g", "g"), vec![rule(&["alice", "admin"])]);
}

#[tokio::test]
async fn namespaces_are_isolated() {
    let store = shared_store();
    let mut tenant_a = adapter(&store, "tenantA");
    let mut tenant_b = adapter(&store, "tenantB");

    tenant_a
        .add_policy("p", "p", rule(&["alice", "data1", "read"]))
        .await
        .expect("add a");
    tenant_b
        .add_policy("p", "p", rule(&["alice", "data1", "read"]))
        .await
        .expect("add b");
    save_model_text(store.as_ref(), MODEL, tenant_a.config())
        .await
        .expect("save model a");

    tenant_b.clear_policy().await.expect("clear b");
    assert_eq!(stored_rules(&tenant_a).await.len(), 1);
    assert!(stored_rules(&tenant_b).await.is_empty());
    assert!(load_model(store.as_ref(), tenant_b.config()).await.is_err());

    let mut m = empty_model().await;
    tenant_b.load_policy(&mut m).await.expect("load b");
    assert!(policies(&m, "p", "p").is_empty());
}

#[tokio::test]
async fn model_document_survives_policy_replace_and_clear() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    save_model_text(store.as_ref(), MODEL, adapter.config())
        .await
        .expect("save model");

    let mut m = scenario_model().await;
    adapter.save_policy(&mut m).await.expect("save policy");
    adapter.clear_policy().await.expect("clear");

    assert!(stored_rules(&adapter).await.is_empty());
    load_model(store.as_ref(), adapter.config())
        .await
        .expect("model still stored");
}

#[tokio::test]
async fn batch_add_and_remove() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    let rules = vec![rule(&["alice", "admin"]), rule(&["bob", "admin"])];
    assert!(adapter.add_policies("g", "g", rules.clone()).await.expect("add"));
    assert_eq!(stored_rules(&adapter).await.len(), 2);

    assert!(adapter.remove_policies("g", "g", rules.clone()).await.expect("remove"));
    assert!(stored_rules(&adapter).await.is_empty());
    assert!(!adapter.remove_policies("g", "g", rules).await.expect("remove again"));
}

#[tokio::test]
async fn filtered_load_keeps_matching_rows() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    let mut saved = empty_model().await;
    saved.add_policy("p", "p", rule(&["alice", "data1", "read"]));
    saved.add_policy("p", "p", rule(&["bob", "data2", "write"]));
    saved.add_policy("g", "g", rule(&["alice", "admin"]));
    saved.add_policy("g", "g", rule(&["bob", "staff"]));
    adapter.save_policy(&mut saved).await.expect("save");

    let mut m = empty_model().await;
    let filter = Filter {
        p: vec!["", "data1"],
        g: vec!["bob"],
    };
    adapter
        .load_filtered_policy(&mut m, filter)
        .await
        .expect("filtered load");
    assert!(adapter.is_filtered());
    assert_eq!(
        policies(&m, "p", "p"),
        vec![rule(&["alice", "data1", "read"])]
    );
    assert_eq!(policies(&m, "g", "g"), vec![rule(&["bob", "staff"])]);

    let mut full = empty_model().await;
    adapter.load_policy(&mut full).await.expect("load");
    assert!(!adapter.is_filtered());
    assert_eq!(policies(&full, "p", "p").len(), 2);
}

#[tokio::test]
async fn closed_store_surfaces_adapter_errors() {
    let store = shared_store();
    let mut adapter = adapter(&store, "");
    adapter.close().await.expect("close");

    let err = adapter
        .add_policy("p", "p", rule(&["alice", "data1", "read"]))
        .await
        .expect_err("closed");
    assert!(matches!(err, casbin::Error::AdapterError(_)));

    let mut m = empty_model().await;
    assert!(adapter.load_policy(&mut m).await.is_err());
}

#[tokio::test]
async fn enforcer_persists_through_adapter() {
    let store = shared_store();
    let mut enforcer = Enforcer::new(empty_model().await, adapter(&store, "tenantA"))
        .await
        .expect("enforcer");
    enforcer
        .add_policy(rule(&["admin", "data1", "read"]))
        .await
        .expect("add policy");
    enforcer
        .add_grouping_policy(rule(&["alice", "admin"]))
        .await
        .expect("add grouping");
    assert!(enforcer.enforce(("alice", "data1", "read")).expect("enforce"));

    let reloaded = Enforcer::new(empty_model().await, adapter(&store, "tenantA"))
        .await
        .expect("reloaded enforcer");
    assert!(reloaded.enforce(("alice", "data1", "read")).expect("enforce"));
    assert!(!reloaded.enforce(("alice", "data1", "write")).expect("enforce"));

    enforcer
        .remove_policy(rule(&["admin", "data1", "read"]))
        .await
        .expect("remove policy");
    let after_remove = Enforcer::new(empty_model().await, adapter(&store, "tenantA"))
        .await
        .expect("enforcer after remove");
    assert!(!after_remove.enforce(("alice", "data1", "read")).expect("enforce"));

    let other_tenant = Enforcer::new(empty_model().await, adapter(&store, "tenantB"))
        .await
        .expect("other tenant");
    assert!(other_tenant.get_grouping_policy().is_empty());
}
