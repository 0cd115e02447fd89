//! Unit tests for sheetwise-core module

use crate::test_utils::{numbered_dataset, record, sales_dataset};
use crate::*;
use proptest::prelude::*;
use serde_json::json;

#[test]
fn test_dataset_columns_in_first_seen_order() {
    let mut dataset = sales_dataset().records().to_vec();
    dataset.push(record(&[("notes", json!("late")), ("month", json!("Apr"))]));
    let dataset = Dataset::new(dataset);

    assert_eq!(dataset.columns(), vec!["month", "region", "revenue", "notes"]);
}

#[test]
fn test_dataset_head() {
    let dataset = numbered_dataset(150);
    assert_eq!(dataset.head(100).len(), 100);
    assert_eq!(dataset.head(500).len(), 150);
    assert_eq!(Dataset::default().head(10).len(), 0);
}

#[test]
fn test_first_non_scalar() {
    assert_eq!(sales_dataset().first_non_scalar(), None);

    let dataset = Dataset::new(vec![
        record(&[("a", json!(1))]),
        record(&[("a", json!(2)), ("nested", json!({"x": 1}))]),
    ]);
    assert_eq!(dataset.first_non_scalar(), Some((1, "nested")));
}

#[test]
fn test_request_deserialization_defaults() {
    let request: AnalysisRequest = serde_json::from_value(json!({
        "user_id": 42,
        "question": "Which month sold most?",
        "dataset": [{"month": "Jan", "revenue": 10}]
    }))
    .unwrap();

    assert_eq!(request.user_id, UserId(42));
    assert_eq!(request.action, ActionType::Analysis);
    assert!(request.history.is_empty());
    assert!(request.dataset_name.is_none());
    assert_eq!(request.dataset.len(), 1);
}

#[test]
fn test_chat_request_builder() {
    let history = vec![ChatTurn {
        role: ChatRole::Assistant,
        content: "Revenue peaked in January.".to_string(),
    }];
    let request = AnalysisRequest::new(UserId(1), "And the lowest?", sales_dataset())
        .with_dataset_name("sales.xlsx")
        .as_chat(history);

    assert_eq!(request.action, ActionType::Chat);
    assert_eq!(request.history.len(), 1);
    assert_eq!(request.dataset_name.as_deref(), Some("sales.xlsx"));
}

#[test]
fn test_user_id_parse() {
    assert_eq!(" 17 ".parse::<UserId>().unwrap(), UserId(17));
    assert!("abc".parse::<UserId>().is_err());
}

#[derive(Debug, Clone)]
enum Op {
    Debit(u64),
    DebitUpTo(u64),
    Credit(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..400).prop_map(Op::Debit),
        (0u64..400).prop_map(Op::DebitUpTo),
        (0u64..200).prop_map(Op::Credit),
    ]
}

proptest! {
    #[test]
    fn prop_balance_matches_model_and_never_underflows(
        initial in 0u64..1000,
        ops in proptest::collection::vec(op(), 0..50),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let ledger = InMemoryLedger::new();
            let user = UserId(1);
            ledger.open_account(user, None, initial).await.unwrap();
            let mut expected = initial;

            for op in ops {
                match op {
                    Op::Debit(amount) => match ledger.try_debit(user, amount).await {
                        Ok(balance) => {
                            prop_assert!(amount <= expected);
                            expected -= amount;
                            prop_assert_eq!(balance, expected);
                        }
                        Err(LedgerError::InsufficientQuota { requested, available }) => {
                            prop_assert_eq!(requested, amount);
                            prop_assert_eq!(available, expected);
                            prop_assert!(amount > expected);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {other}"),
                    },
                    Op::DebitUpTo(amount) => {
                        let settlement = ledger.debit_up_to(user, amount).await.unwrap();
                        prop_assert_eq!(settlement.charged + settlement.uncharged, amount);
                        expected -= settlement.charged;
                        prop_assert_eq!(settlement.balance, expected);
                    }
                    Op::Credit(amount) => {
                        expected += amount;
                        prop_assert_eq!(ledger.credit(user, amount).await.unwrap(), expected);
                    }
                }
            }
            prop_assert_eq!(ledger.get_balance(user).await.unwrap(), expected);
            Ok(())
        })?;
    }
}
