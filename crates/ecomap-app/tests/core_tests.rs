use chrono::Utc;
use ecomap_app::{
    EcoConfig, EcoMapCore, JobRequest, ProductCategory, ProductItem, ReportRequest, RewardItem,
};
use ecomap_economics::{Currency, EntityId, LedgerError, TransactionKind, STARTING_CREDITS};
use rust_decimal::Decimal;

#[tokio::test]
async fn test_conversion_rule() {
    let (core, _) = EcoMapCore::in_memory(&EcoConfig::default());
    let user = EntityId::from("converter");
    core.open_account(&user).await.unwrap();
    core.ledger()
        .credit(&user, Currency::Points, 30, TransactionKind::ReportReward)
        .await
        .unwrap();

    let err = core.convert_points(&user, 7).await.unwrap_err();
    assert!(matches!(
        err,
        ecomap_app::AppError::Ledger(LedgerError::Validation(_))
    ));

    let conversion = core.convert_points(&user, 25).await.unwrap();
    assert_eq!(conversion.credits_gained, 5);
    assert_eq!(conversion.new_points_balance, 5);
    assert_eq!(conversion.new_credits_balance, STARTING_CREDITS + 5);

    // Both lines of the conversion share one transaction id.
    let lines: Vec<_> = core
        .history(&user, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|line| line.kind == TransactionKind::Convert)
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].txn_id, lines[1].txn_id);

    let err = core.convert_points(&user, 10).await.unwrap_err();
    assert!(matches!(
        err,
        ecomap_app::AppError::Ledger(LedgerError::InsufficientBalance {
            currency: Currency::Points,
            shortfall: 5,
            ..
        })
    ));
}

#[tokio::test]
async fn test_full_flow_and_dashboard() {
    let (core, storage) = EcoMapCore::in_memory(&EcoConfig::default());
    let reporter = EntityId::from("reporter");
    let cleaner = EntityId::from("cleaner");
    let poster = EntityId::from("poster");
    for user in [&reporter, &cleaner, &poster] {
        core.open_account(user).await.unwrap();
    }

    let bag = RewardItem::curated("Eco Bag", 60, 5);
    let bag_id = bag.id.clone();
    storage.upsert_reward(bag).await;
    storage
        .upsert_product(ProductItem {
            id: EntityId::generate(),
            partner_id: EntityId::from("partner"),
            partner_name: "Refill Station".to_string(),
            name: "Shampoo refill".to_string(),
            description: String::new(),
            price: Decimal::new(9500, 2),
            points_price: 120,
            category: ProductCategory::Merchandise,
            stock: 2,
            created_at: Utc::now(),
        })
        .await;
    assert_eq!(core.market().list_catalog().await.unwrap().len(), 2);

    let report = core
        .gate()
        .submit_report(
            ReportRequest::new(reporter.clone(), 10.3, 123.9).with_trash_count(2),
            Utc::now(),
        )
        .await
        .unwrap()
        .report;
    core.gate()
        .mark_report_cleaned(&report.id, &cleaner, "https://img.example/clean.jpg")
        .await
        .unwrap();

    let receipt = core.market().redeem(&reporter, &bag_id).await.unwrap();
    assert!(receipt.code.starts_with("ECO-"));

    core.purchase_tokens(&poster, 10, Decimal::new(10000, 2))
        .await
        .unwrap();
    core.jobs()
        .create_job(JobRequest::new(poster.clone(), "Beach cleanup", 10))
        .await
        .unwrap();

    let stats = core.dashboard().stats().await.unwrap();
    assert_eq!(stats.total_users, 3);
    assert_eq!(stats.total_reports, 1);
    assert_eq!(stats.cleaned_reports, 1);
    assert_eq!(stats.points_distributed, 66 + 100);
    assert_eq!(stats.total_redemptions, 1);
    assert_eq!(stats.total_jobs, 1);
    assert_eq!(stats.pending_jobs, 1);
    assert_eq!(stats.partner_products, 1);
    assert_eq!(stats.recent_redemptions[0].item_id, bag_id);

    assert_eq!(core.balances(&reporter).await.unwrap().points_balance, 6);
    assert_eq!(core.balances(&cleaner).await.unwrap().points_balance, 100);
    for user in [&reporter, &cleaner, &poster] {
        assert!(core.ledger().audit(user).await.unwrap().is_consistent());
    }
}

#[tokio::test]
async fn test_purchase_records_cash_amount() {
    let (core, _) = EcoMapCore::in_memory(&EcoConfig::default());
    let user = EntityId::from("buyer");
    core.open_account(&user).await.unwrap();

    let receipt = core
        .purchase_tokens(&user, 50, Decimal::new(4999, 2))
        .await
        .unwrap();
    assert_eq!(receipt.account.tokens_balance, 50);
    assert_eq!(receipt.lines[0].cash_php, Some(Decimal::new(4999, 2)));

    assert!(core.purchase_tokens(&user, 0, Decimal::ONE).await.is_err());
    assert!(core.purchase_tokens(&user, 5, Decimal::ZERO).await.is_err());
}

#[tokio::test]
async fn test_open_account_twice_fails() {
    let (core, _) = EcoMapCore::in_memory(&EcoConfig::default());
    let user = EntityId::from("dup");
    core.open_account(&user).await.unwrap();
    let err = core.open_account(&user).await.unwrap_err();
    assert_eq!(
        err,
        ecomap_app::AppError::Ledger(LedgerError::AccountExists(user))
    );
}
