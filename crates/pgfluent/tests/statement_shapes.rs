//! End-to-end statement shape checks through the public API.
//!
//! The pool handle is constructed lazily, so none of these tests open a
//! connection; they exercise the full chain → compile path.

use pgfluent::{Client, OrderOptions, PoolConfig, QueryError};
use serde_json::json;
use std::time::Duration;

fn client() -> Client {
    Client::connect("postgres://pgfluent@localhost/pgfluent", PoolConfig::default()).unwrap()
}

#[test]
fn select_chain_with_everything() {
    let sql = client()
        .from("payments")
        .select("id, amount, payer:users!payer_id(name, email)")
        .eq("year", 2024i32)
        .gte("amount", 100i64)
        .or_filter("method.eq.card,method.eq.invoice")
        .order(
            "created_at",
            OrderOptions {
                ascending: false,
                nulls_first: Some(false),
            },
        )
        .range(0, 24)
        .to_sql()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT payments.id, payments.amount, \
         _j_payer.name AS \"payer.name\", _j_payer.email AS \"payer.email\" \
         FROM payments LEFT JOIN users _j_payer ON payments.payer_id = _j_payer.id \
         WHERE payments.year = $1 AND payments.amount >= $2 \
         AND (payments.method = $3 OR payments.method = $4) \
         ORDER BY payments.created_at DESC NULLS LAST LIMIT 25 OFFSET 0"
    );
}

#[test]
fn placeholder_count_matches_parameter_count() {
    // Chains mixing no-operand and multi-operand filters still number
    // placeholders in lock-step with the parameter array; a mismatch would
    // surface as a compiler error from to_sql().
    let sql = client()
        .from("members")
        .eq("status", "active")
        .is_null("deleted_at")
        .in_list("role", vec!["admin", "board", "member"])
        .not_in("id", vec![1i64, 2])
        .to_sql()
        .unwrap();

    let highest = sql
        .match_indices('$')
        .map(|(i, _)| {
            sql[i + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse::<usize>()
                .unwrap()
        })
        .max()
        .unwrap();
    assert_eq!(highest, 6);
}

#[test]
fn empty_in_list_matches_no_rows() {
    let sql = client()
        .from("members")
        .in_list::<i64>("id", vec![])
        .to_sql()
        .unwrap();
    assert!(sql.contains("WHERE FALSE"));
    assert!(!sql.contains("IN ()"));
}

#[test]
fn update_after_filters_orders_params_set_then_where() {
    let sql = client()
        .from("members")
        .eq("status", "active")
        .gt("age", 18i32)
        .is_not_null("email")
        .update(json!({"role": "member", "verified": true}))
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "UPDATE members SET role = $1, verified = $2 \
         WHERE members.status = $3 AND members.age > $4 \
         AND members.email IS NOT NULL RETURNING *"
    );
}

#[test]
fn upsert_never_updates_the_conflict_key() {
    let sql = client()
        .from("members")
        .upsert(
            json!({"email": "a@x.no", "name": "A", "phone": "123"}),
            "email",
        )
        .to_sql()
        .unwrap();
    assert!(sql.contains("ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name, phone = EXCLUDED.phone"));
    assert!(!sql.contains("email = EXCLUDED.email"));
}

#[test]
fn delete_without_filters_is_rejected() {
    let err = client().from("members").delete().to_sql().unwrap_err();
    assert!(matches!(err, QueryError::Filter(_)));
}

#[tokio::test]
async fn head_on_mutation_still_reaches_the_database() {
    // Nothing listens on port 1. A mutation chained with head() must still
    // attempt execution, so resolving it here has to surface a pool error
    // instead of reporting success.
    let client = Client::connect(
        "postgres://pgfluent@127.0.0.1:1/pgfluent",
        PoolConfig {
            max_size: 1,
            acquire_timeout: Some(Duration::from_secs(2)),
            create_timeout: Some(Duration::from_secs(2)),
            recycle_timeout: Some(Duration::from_secs(2)),
        },
    )
    .unwrap();
    let err = client
        .from("members")
        .insert(json!({"name": "A"}))
        .head()
        .resolve()
        .await
        .unwrap_err();
    assert!(err.is_pool_error());
}

#[test]
fn malformed_or_group_fails_before_compilation() {
    let err = client()
        .from("members")
        .or_filter("status.unknownop.active")
        .eq("id", 1i64)
        .to_sql()
        .unwrap_err();
    assert!(matches!(err, QueryError::Filter(_)));
}
