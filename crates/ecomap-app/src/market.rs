use crate::error::{AppError, Result};
use crate::lifecycle::RedemptionStatus;
use crate::locks::KeyedLocks;
use crate::storage::{CatalogStore, RedemptionStore, StockOutcome};
use crate::types::{Redemption, RedemptionReceipt, RewardItem};
use chrono::Utc;
use ecomap_economics::{AccountLedger, Currency, EntityId, LedgerError, TransactionKind, UserId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Points-for-stock exchange over the curated and partner catalogs.
#[derive(Clone)]
pub struct RedemptionMarket {
    ledger: Arc<AccountLedger>,
    catalog: Arc<dyn CatalogStore>,
    redemptions: Arc<dyn RedemptionStore>,
    item_locks: KeyedLocks,
}

impl RedemptionMarket {
    pub fn new(
        ledger: Arc<AccountLedger>,
        catalog: Arc<dyn CatalogStore>,
        redemptions: Arc<dyn RedemptionStore>,
    ) -> Self {
        Self {
            ledger,
            catalog,
            redemptions,
            item_locks: KeyedLocks::new(),
        }
    }

    /// Curated rewards followed by partner products that carry a points price.
    pub async fn list_catalog(&self) -> Result<Vec<RewardItem>> {
        let mut items = self.catalog.curated_items().await?;
        items.extend(
            self.catalog
                .partner_products()
                .await?
                .iter()
                .filter(|product| product.is_redeemable())
                .map(|product| product.to_reward()),
        );
        Ok(items)
    }

    /// Looks the id up in the curated catalog first, then in partner products.
    pub async fn resolve_item(&self, item_id: &EntityId) -> Result<RewardItem> {
        if let Some(item) = self.catalog.get_curated(item_id).await? {
            return Ok(item);
        }
        self.catalog
            .get_product(item_id)
            .await?
            .map(|product| product.to_reward())
            .ok_or_else(|| AppError::not_found("item", item_id))
    }

    pub async fn redemptions_for(&self, user_id: &UserId) -> Result<Vec<Redemption>> {
        let mut redemptions = self.redemptions.redemptions_for(user_id).await?;
        redemptions.sort_by(|a, b| b.redeemed_at.cmp(&a.redeemed_at));
        Ok(redemptions)
    }

    /// Exchanges the item's points price for one unit of stock.
    ///
    /// All checks and writes for one item run under that item's lock, inside a
    /// spawned task so a dropped caller cannot stop the exchange half way.
    pub async fn redeem(&self, user_id: &UserId, item_id: &EntityId) -> Result<RedemptionReceipt> {
        // Fail fast on unknown ids before queueing on the lock.
        self.resolve_item(item_id).await?;

        let guard = self.item_locks.acquire(item_id).await;
        let market = self.clone();
        let user_id = user_id.clone();
        let item_id = item_id.clone();
        tokio::spawn(async move {
            let _guard = guard;
            market.exchange(&user_id, &item_id).await
        })
        .await?
    }

    async fn exchange(&self, user_id: &UserId, item_id: &EntityId) -> Result<RedemptionReceipt> {
        let start = std::time::Instant::now();
        let item = self.resolve_item(item_id).await?;

        let points = self.ledger.balance(user_id, Currency::Points).await?;
        if points < item.points_required {
            warn!(
                user = %user_id,
                item = %item_id,
                balance = points,
                required = item.points_required,
                "Redemption rejected: insufficient points"
            );
            return Err(LedgerError::insufficient(Currency::Points, points, item.points_required).into());
        }
        if item.stock == 0 {
            return Err(AppError::OutOfStock(item_id.clone()));
        }

        let remaining = match self.catalog.take_one(item.source_catalog, item_id).await? {
            StockOutcome::Taken { remaining } => remaining,
            StockOutcome::OutOfStock => return Err(AppError::OutOfStock(item_id.clone())),
            StockOutcome::Missing => return Err(AppError::not_found("item", item_id)),
        };

        if item.points_required > 0 {
            if let Err(e) = self
                .ledger
                .debit(
                    user_id,
                    Currency::Points,
                    item.points_required,
                    TransactionKind::Redemption,
                )
                .await
            {
                self.restock(&item).await;
                return Err(e.into());
            }
        }

        let redemption = Redemption {
            id: EntityId::generate(),
            user_id: user_id.clone(),
            item_id: item_id.clone(),
            item_name: item.name.clone(),
            source_catalog: item.source_catalog,
            points_spent: item.points_required,
            code: Redemption::generate_code(),
            status: RedemptionStatus::Pending,
            redeemed_at: Utc::now(),
        };
        if let Err(e) = self.redemptions.insert_redemption(redemption.clone()).await {
            self.refund(user_id, item.points_required).await;
            self.restock(&item).await;
            return Err(e.into());
        }

        info!(
            user = %user_id,
            item = %item_id,
            source = ?item.source_catalog,
            points_spent = item.points_required,
            stock_remaining = remaining,
            code = %redemption.code,
            duration_ms = start.elapsed().as_millis() as u64,
            "🎁 Reward redeemed"
        );

        Ok(RedemptionReceipt {
            redemption_id: redemption.id,
            code: redemption.code,
            status: redemption.status,
        })
    }

    async fn restock(&self, item: &RewardItem) {
        match self.catalog.put_back(item.source_catalog, &item.id).await {
            Ok(()) => debug!(item = %item.id, "Stock unit returned"),
            Err(e) => error!(item = %item.id, error = %e, "❌ Failed to return stock unit"),
        }
    }

    async fn refund(&self, user_id: &UserId, points: u64) {
        if points == 0 {
            return;
        }
        if let Err(e) = self
            .ledger
            .credit(user_id, Currency::Points, points, TransactionKind::Refund)
            .await
        {
            error!(user = %user_id, points, error = %e, "❌ Failed to refund redemption points");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryAppStorage;
    use crate::types::{ProductCategory, ProductItem};
    use ecomap_economics::MemoryStorage;
    use rust_decimal::Decimal;

    async fn setup() -> (RedemptionMarket, Arc<AccountLedger>, MemoryAppStorage) {
        let accounts = Arc::new(MemoryStorage::new());
        let ledger = Arc::new(AccountLedger::new(accounts.clone(), accounts));
        let app = MemoryAppStorage::new();
        let market = RedemptionMarket::new(
            ledger.clone(),
            Arc::new(app.clone()),
            Arc::new(app.clone()),
        );
        (market, ledger, app)
    }

    fn product(points_price: u64) -> ProductItem {
        ProductItem {
            id: EntityId::generate(),
            partner_id: EntityId::from("partner-1"),
            partner_name: "Green Cafe".to_string(),
            name: "Iced Coffee".to_string(),
            description: String::new(),
            price: Decimal::new(12000, 2),
            points_price,
            category: ProductCategory::Drink,
            stock: 3,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_catalog_lists_curated_then_redeemable_products() {
        let (market, _, app) = setup().await;
        app.upsert_reward(RewardItem::curated("Eco Bag", 50, 10)).await;
        app.upsert_product(product(80)).await;
        app.upsert_product(product(0)).await;

        let items = market.list_catalog().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Eco Bag");
        assert_eq!(items[1].icon, "🥤");
    }

    #[tokio::test]
    async fn test_redeem_debits_points_and_stock() {
        let (market, ledger, app) = setup().await;
        let user = EntityId::from("maria");
        ledger.open_account(&user).await.unwrap();
        ledger
            .credit(&user, Currency::Points, 120, TransactionKind::ReportReward)
            .await
            .unwrap();
        let item = RewardItem::curated("Eco Bag", 50, 10);
        let item_id = item.id.clone();
        app.upsert_reward(item).await;

        let receipt = market.redeem(&user, &item_id).await.unwrap();
        assert!(receipt.code.starts_with("ECO-"));
        assert_eq!(receipt.status, RedemptionStatus::Pending);

        assert_eq!(ledger.balance(&user, Currency::Points).await.unwrap(), 70);
        assert_eq!(app.get_curated(&item_id).await.unwrap().unwrap().stock, 9);
        assert_eq!(market.redemptions_for(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_points_checked_before_stock() {
        let (market, ledger, app) = setup().await;
        let user = EntityId::from("jose");
        ledger.open_account(&user).await.unwrap();
        let item = RewardItem::curated("Tumbler", 200, 0);
        let item_id = item.id.clone();
        app.upsert_reward(item).await;

        let err = market.redeem(&user, &item_id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Ledger(LedgerError::InsufficientBalance {
                currency: Currency::Points,
                shortfall: 200,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unknown_item_is_not_found() {
        let (market, ledger, _) = setup().await;
        let user = EntityId::from("ana");
        ledger.open_account(&user).await.unwrap();

        let err = market.redeem(&user, &EntityId::from("missing")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "item", .. }));
    }

    #[tokio::test]
    async fn test_unpriced_product_redeems_without_ledger_line() {
        let (market, ledger, app) = setup().await;
        let user = EntityId::from("ana");
        ledger.open_account(&user).await.unwrap();
        let unpriced = product(0);
        let unpriced_id = unpriced.id.clone();
        app.upsert_product(unpriced).await;

        // Hidden from the listing but still redeemable by id.
        assert!(market.list_catalog().await.unwrap().is_empty());
        let receipt = market.redeem(&user, &unpriced_id).await.unwrap();
        assert!(receipt.code.starts_with("ECO-"));

        assert_eq!(app.get_product(&unpriced_id).await.unwrap().unwrap().stock, 2);
        assert_eq!(ledger.balance(&user, Currency::Points).await.unwrap(), 0);
        assert!(ledger
            .history(&user, Some(Currency::Points))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(market.redemptions_for(&user).await.unwrap()[0].points_spent, 0);
    }

    #[tokio::test]
    async fn test_partner_product_stock_is_decremented() {
        let (market, ledger, app) = setup().await;
        let user = EntityId::from("leo");
        ledger.open_account(&user).await.unwrap();
        ledger
            .credit(&user, Currency::Points, 100, TransactionKind::CleanupReward)
            .await
            .unwrap();
        let item = product(80);
        let item_id = item.id.clone();
        app.upsert_product(item).await;

        market.redeem(&user, &item_id).await.unwrap();
        assert_eq!(app.get_product(&item_id).await.unwrap().unwrap().stock, 2);
        assert_eq!(ledger.balance(&user, Currency::Points).await.unwrap(), 20);
    }
}
