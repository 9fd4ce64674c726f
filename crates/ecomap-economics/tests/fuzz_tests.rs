use ecomap_economics::{
    storage::MemoryStorage, AccountLedger, Currency, EntityId, LedgerError, TransactionKind,
};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Credit(Currency, u64),
    Debit(Currency, u64),
    Convert(u64),
}

fn arb_currency() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::Points),
        Just(Currency::Tokens),
        Just(Currency::Credits),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arb_currency(), 1u64..500).prop_map(|(c, a)| Op::Credit(c, a)),
        (arb_currency(), 1u64..500).prop_map(|(c, a)| Op::Debit(c, a)),
        (0u64..200).prop_map(Op::Convert),
    ]
}

// Property: balances stay non-negative and always equal the ledger sums
proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_balances_reconcile_with_ledger(ops in prop::collection::vec(arb_op(), 1..60)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let storage = Arc::new(MemoryStorage::new());
            let ledger = AccountLedger::new(storage.clone(), storage);
            let user = EntityId::from("prop-user");
            ledger.open_account(&user).await.unwrap();

            for op in ops {
                let before = ledger.get_account(&user).await.unwrap();
                let result = match op {
                    Op::Credit(currency, amount) => ledger
                        .credit(&user, currency, amount, TransactionKind::Purchase)
                        .await
                        .map(|_| ()),
                    Op::Debit(currency, amount) => ledger
                        .debit(&user, currency, amount, TransactionKind::Redemption)
                        .await
                        .map(|_| ()),
                    Op::Convert(points) => ledger
                        .convert_points_to_credits(&user, points)
                        .await
                        .map(|_| ()),
                };

                if let Err(e) = result {
                    let expected_error = matches!(
                        e,
                        LedgerError::InsufficientBalance { .. } | LedgerError::Validation(_)
                    );
                    prop_assert!(expected_error);
                    let after = ledger.get_account(&user).await.unwrap();
                    prop_assert_eq!(before, after);
                }

                let report = ledger.audit(&user).await.unwrap();
                prop_assert!(report.is_consistent());
            }

            Ok(())
        })?;
    }
}
