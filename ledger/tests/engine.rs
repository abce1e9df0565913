//! Ledger engine behaviour against the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use balance_common::{AccountId, HistoryQuery, LedgerError, Page, SortKey, SortOrder};
use balance_ledger::{replay_history, LedgerConfig, LedgerEngine, LedgerStore, MemoryLedgerStore};

type Engine = LedgerEngine<MemoryLedgerStore>;

fn engine() -> Engine {
    LedgerEngine::new(MemoryLedgerStore::new(), LedgerConfig::default())
}

fn id(n: i64) -> AccountId {
    AccountId::new(n)
}

fn dec(n: i64) -> Decimal {
    Decimal::from(n)
}

async fn full_history(engine: &Engine, account: AccountId) -> Vec<balance_ledger::Transaction> {
    engine
        .get_history(&HistoryQuery::new(account))
        .await
        .unwrap()
}

#[tokio::test]
async fn unknown_account_has_zero_balance() {
    let engine = engine();

    let account = engine.get_balance(id(404)).await.unwrap();

    assert_eq!(account.id, id(404));
    assert_eq!(account.balance, Decimal::ZERO);
    assert!(engine.store().accounts().is_empty());
}

#[tokio::test]
async fn credit_to_fresh_account_writes_one_entry() {
    let engine = engine();

    let entry = engine.adjust_balance(id(1), dec(100)).await.unwrap();

    assert_eq!(entry.remaining, dec(100));
    assert_eq!(engine.get_balance(id(1)).await.unwrap().balance, dec(100));

    let history = full_history(&engine, id(1)).await;
    assert_eq!(history, vec![entry]);
}

#[tokio::test]
async fn debit_of_fresh_account_changes_nothing() {
    let engine = engine();

    let err = engine.adjust_balance(id(1), dec(-50)).await.unwrap_err();

    assert_eq!(err, LedgerError::InsufficientFunds { account_id: id(1) });
    assert!(engine.store().accounts().is_empty());
    assert_eq!(engine.store().transaction_count(), 0);
}

#[tokio::test]
async fn overdraft_is_rejected_and_balance_kept() {
    let engine = engine();
    engine.adjust_balance(id(1), dec(20)).await.unwrap();

    let err = engine.adjust_balance(id(1), dec(-21)).await.unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(engine.get_balance(id(1)).await.unwrap().balance, dec(20));
    assert_eq!(engine.store().transaction_count(), 1);

    let entry = engine.adjust_balance(id(1), dec(-20)).await.unwrap();
    assert_eq!(entry.remaining, Decimal::ZERO);
}

#[tokio::test]
async fn transfer_with_insufficient_funds_changes_nothing() {
    let engine = engine();
    engine.adjust_balance(id(1), dec(20)).await.unwrap();
    engine.adjust_balance(id(2), dec(5)).await.unwrap();

    let err = engine.transfer(id(1), id(2), dec(30)).await.unwrap_err();

    assert_eq!(err, LedgerError::InsufficientFunds { account_id: id(1) });
    assert_eq!(engine.get_balance(id(1)).await.unwrap().balance, dec(20));
    assert_eq!(engine.get_balance(id(2)).await.unwrap().balance, dec(5));
    assert_eq!(engine.store().transaction_count(), 2);
}

#[tokio::test]
async fn transfer_from_unknown_account_is_insufficient_funds() {
    let engine = engine();

    let err = engine.transfer(id(8), id(9), dec(1)).await.unwrap_err();

    assert_eq!(err, LedgerError::InsufficientFunds { account_id: id(8) });
    assert!(engine.store().accounts().is_empty());
}

#[tokio::test]
async fn transfer_moves_funds_and_writes_two_entries() {
    let engine = engine();
    engine.adjust_balance(id(1), dec(100)).await.unwrap();

    let debit = engine.transfer(id(1), id(2), dec(30)).await.unwrap();

    assert_eq!(engine.get_balance(id(1)).await.unwrap().balance, dec(70));
    assert_eq!(engine.get_balance(id(2)).await.unwrap().balance, dec(30));
    assert_eq!(debit.account_id, id(1));
    assert_eq!(debit.delta, dec(-30));
    assert_eq!(debit.remaining, dec(70));

    let credit = full_history(&engine, id(2)).await;
    assert_eq!(credit.len(), 1);
    assert_eq!(credit[0].delta, dec(30));
    assert_eq!(credit[0].remaining, dec(30));
    assert_eq!(credit[0].created_at, debit.created_at);
    assert_eq!(credit[0].delta + debit.delta, Decimal::ZERO);
    assert!(credit[0].message.contains("from account [1] to account [2]"));
    assert_eq!(engine.store().transaction_count(), 3);
}

#[tokio::test]
async fn failed_entry_insert_rolls_back_balance() {
    let engine = engine();
    engine.adjust_balance(id(1), dec(100)).await.unwrap();
    engine.store().fail_transaction_inserts(true);

    let adjust = engine.adjust_balance(id(1), dec(10)).await.unwrap_err();
    let transfer = engine.transfer(id(1), id(2), dec(40)).await.unwrap_err();

    assert!(matches!(adjust, LedgerError::Storage(_)));
    assert!(matches!(transfer, LedgerError::Storage(_)));

    engine.store().fail_transaction_inserts(false);
    assert_eq!(engine.get_balance(id(1)).await.unwrap().balance, dec(100));
    assert_eq!(engine.store().find_account(id(2)).await.unwrap(), None);
    assert_eq!(engine.store().transaction_count(), 1);
}

#[tokio::test]
async fn history_sorted_by_sum_descending() {
    let engine = engine();
    for delta in [40, 10, 70, 20] {
        engine.adjust_balance(id(1), dec(delta)).await.unwrap();
    }
    engine.adjust_balance(id(1), dec(-15)).await.unwrap();

    let query = HistoryQuery::new(id(1))
        .sorted(SortKey::BySum, SortOrder::Desc)
        .page(Page::Number(1));
    let page = engine.get_history(&query).await.unwrap();

    let deltas: Vec<Decimal> = page.iter().map(|t| t.delta).collect();
    assert_eq!(deltas, vec![dec(70), dec(40), dec(20), dec(10), dec(-15)]);
}

#[tokio::test]
async fn history_pages_use_configured_size() {
    let config = LedgerConfig {
        page_size: 3,
        ..LedgerConfig::default()
    };
    let engine = LedgerEngine::new(MemoryLedgerStore::new(), config);
    for _ in 0..7 {
        engine.adjust_balance(id(1), dec(1)).await.unwrap();
    }

    let page = |n| {
        HistoryQuery::new(id(1))
            .sorted(SortKey::ByTime, SortOrder::Asc)
            .page(Page::from_option(Some(n)))
    };

    assert_eq!(engine.get_history(&page(0)).await.unwrap().len(), 3);
    assert_eq!(engine.get_history(&page(3)).await.unwrap().len(), 1);
    assert!(engine.get_history(&page(4)).await.unwrap().is_empty());
    assert_eq!(
        engine.get_history(&page(0)).await.unwrap(),
        engine.get_history(&page(1)).await.unwrap()
    );
}

#[tokio::test]
async fn history_of_unknown_account_is_empty() {
    let engine = engine();
    assert!(full_history(&engine, id(77)).await.is_empty());
}

#[tokio::test]
async fn reads_are_repeatable_without_mutations() {
    let engine = engine();
    engine.adjust_balance(id(1), dec(50)).await.unwrap();
    engine.transfer(id(1), id(2), dec(20)).await.unwrap();

    let query = HistoryQuery::new(id(1)).sorted(SortKey::BySum, SortOrder::Asc);
    assert_eq!(
        engine.get_history(&query).await.unwrap(),
        engine.get_history(&query).await.unwrap()
    );
    assert_eq!(
        engine.get_balance(id(2)).await.unwrap(),
        engine.get_balance(id(2)).await.unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_transfers_do_not_deadlock() {
    let engine = Arc::new(engine());
    engine.adjust_balance(id(1), dec(1_000)).await.unwrap();
    engine.adjust_balance(id(2), dec(1_000)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..200 {
        let engine = engine.clone();
        let (from, to) = if i % 2 == 0 { (id(1), id(2)) } else { (id(2), id(1)) };
        handles.push(tokio::spawn(async move {
            engine.transfer(from, to, dec(7)).await
        }));
    }

    let results = tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(handles))
        .await
        .expect("transfers deadlocked");

    for result in results {
        result.unwrap().unwrap();
    }
    assert_eq!(engine.get_balance(id(1)).await.unwrap().balance, dec(1_000));
    assert_eq!(engine.get_balance(id(2)).await.unwrap().balance, dec(1_000));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_credits_to_fresh_account_all_apply() {
    let engine = Arc::new(engine());

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.adjust_balance(id(5), dec(2)).await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    assert_eq!(engine.get_balance(id(5)).await.unwrap().balance, dec(100));
    assert_eq!(full_history(&engine, id(5)).await.len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mutations_conserve_reported_deltas() {
    let engine = Arc::new(engine());
    let accounts: Vec<AccountId> = (1..=5).map(id).collect();

    let mut handles = Vec::new();
    for i in 0..300i64 {
        let engine = engine.clone();
        let a = accounts[(i % 5) as usize];
        let b = accounts[((i * 3 + 1) % 5) as usize];
        let amount = dec(i % 13 + 1);
        handles.push(tokio::spawn(async move {
            match i % 3 {
                0 => engine
                    .adjust_balance(a, amount)
                    .await
                    .map(|_| vec![(a, amount)]),
                1 => engine
                    .adjust_balance(a, -amount)
                    .await
                    .map(|_| vec![(a, -amount)]),
                _ if a != b => engine
                    .transfer(a, b, amount)
                    .await
                    .map(|_| vec![(a, -amount), (b, amount)]),
                _ => Ok(Vec::new()),
            }
        }));
    }

    let mut expected: HashMap<AccountId, Decimal> = HashMap::new();
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(deltas) => {
                for (account, delta) in deltas {
                    *expected.entry(account).or_insert(Decimal::ZERO) += delta;
                }
            }
            Err(LedgerError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }

    for account in accounts {
        let balance = engine.get_balance(account).await.unwrap().balance;
        let want = expected.get(&account).copied().unwrap_or(Decimal::ZERO);
        assert_eq!(balance, want, "account {account}");
        assert!(balance >= Decimal::ZERO);

        let history = full_history(&engine, account).await;
        assert_eq!(replay_history(&history), Ok(balance), "account {account}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfers_around_absent_lower_account_settle() {
    let engine = Arc::new(engine());

    for round in 0..50 {
        let a = id(1_000 + round * 2);
        let b = id(1_000 + round * 2 + 1);
        engine.adjust_balance(b, dec(100)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let e = engine.clone();
            handles.push(tokio::spawn(async move { e.transfer(b, a, dec(10)).await.map(|_| ()) }));
            let e = engine.clone();
            handles.push(tokio::spawn(async move { e.adjust_balance(a, dec(50)).await.map(|_| ()) }));
            let e = engine.clone();
            handles.push(tokio::spawn(async move { e.transfer(a, b, dec(5)).await.map(|_| ()) }));
        }

        let results = tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(handles))
            .await
            .expect("transfers deadlocked");
        for result in results {
            match result.unwrap() {
                Ok(()) | Err(LedgerError::InsufficientFunds { .. }) => {}
                Err(other) => panic!("round {round}: {other}"),
            }
        }

        let balance_a = engine.get_balance(a).await.unwrap().balance;
        let balance_b = engine.get_balance(b).await.unwrap().balance;
        assert_eq!(balance_a + balance_b, dec(200), "round {round}");
        assert_eq!(replay_history(&full_history(&engine, a).await), Ok(balance_a));
        assert_eq!(replay_history(&full_history(&engine, b).await), Ok(balance_b));
    }
    assert_eq!(engine.store().row_lock_count(), 0);
}
