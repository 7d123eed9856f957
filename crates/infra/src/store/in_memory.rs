use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use storepulse_core::{Cents, CustomerId, ExpenseId, SaleId, TimeWindow, TrendInterval};
use storepulse_records::{Customer, Expense, Sale};

use super::r#trait::{
    AnalyticsQuery, CategoryTotal, CustomerPurchases, PeriodRevenue, ProductRevenue, RecordStore,
    SalesTotals, StoreError, UNCATEGORIZED,
};

#[derive(Debug, Default)]
struct Tables {
    sales: HashMap<SaleId, Sale>,
    expenses: HashMap<ExpenseId, Expense>,
    customers: BTreeMap<CustomerId, Customer>,
}

/// In-memory record store.
///
/// Intended for tests/dev and the simulation binary. Aggregates are computed
/// by scanning; there are no indexes.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(f(&tables))
    }

    fn write<R>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        f(&mut tables)
    }

    fn sales_in(tables: &Tables, window: TimeWindow) -> impl Iterator<Item = &Sale> {
        tables.sales.values().filter(move |s| window.contains(s.date))
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert_sale(&self, sale: &Sale) -> Result<(), StoreError> {
        self.write(|t| {
            if t.sales.contains_key(&sale.id) {
                return Err(StoreError::Conflict(format!("sale {}", sale.id)));
            }
            t.sales.insert(sale.id, sale.clone());
            Ok(())
        })
    }

    async fn update_sale(&self, sale: &Sale) -> Result<(), StoreError> {
        self.write(|t| match t.sales.get_mut(&sale.id) {
            Some(existing) => {
                *existing = sale.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("sale {}", sale.id))),
        })
    }

    async fn delete_sale(&self, id: SaleId) -> Result<Sale, StoreError> {
        self.write(|t| {
            t.sales
                .remove(&id)
                .ok_or_else(|| StoreError::NotFound(format!("sale {id}")))
        })
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        self.read(|t| t.sales.get(&id).cloned())
    }

    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        self.write(|t| {
            if t.expenses.contains_key(&expense.id) {
                return Err(StoreError::Conflict(format!("expense {}", expense.id)));
            }
            t.expenses.insert(expense.id, expense.clone());
            Ok(())
        })
    }

    async fn update_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        self.write(|t| match t.expenses.get_mut(&expense.id) {
            Some(existing) => {
                *existing = expense.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("expense {}", expense.id))),
        })
    }

    async fn delete_expense(&self, id: ExpenseId) -> Result<Expense, StoreError> {
        self.write(|t| {
            t.expenses
                .remove(&id)
                .ok_or_else(|| StoreError::NotFound(format!("expense {id}")))
        })
    }

    async fn get_expense(&self, id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        self.read(|t| t.expenses.get(&id).cloned())
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        self.write(|t| {
            if t.customers.contains_key(&customer.id) {
                return Err(StoreError::Conflict(format!("customer {}", customer.id)));
            }
            t.customers.insert(customer.id.clone(), customer.clone());
            Ok(())
        })
    }

    async fn update_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        self.write(|t| match t.customers.get_mut(&customer.id) {
            Some(existing) => {
                *existing = customer.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("customer {}", customer.id))),
        })
    }

    async fn delete_customer(&self, id: &CustomerId) -> Result<Customer, StoreError> {
        self.write(|t| {
            t.customers
                .remove(id)
                .ok_or_else(|| StoreError::NotFound(format!("customer {id}")))
        })
    }

    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError> {
        self.read(|t| t.customers.get(id).cloned())
    }
}

#[async_trait]
impl AnalyticsQuery for InMemoryRecordStore {
    async fn sales_totals(&self, window: TimeWindow) -> Result<SalesTotals, StoreError> {
        self.read(|t| {
            Self::sales_in(t, window).fold(SalesTotals::default(), |acc, sale| SalesTotals {
                total_cents: acc.total_cents + sale.amount_cents,
                count: acc.count + 1,
            })
        })
    }

    async fn revenue_by_product(
        &self,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<ProductRevenue>, StoreError> {
        self.read(|t| {
            let mut groups: HashMap<&str, (Cents, u64)> = HashMap::new();
            for sale in Self::sales_in(t, window) {
                let entry = groups.entry(sale.product_name.as_str()).or_default();
                entry.0 += sale.amount_cents;
                entry.1 += 1;
            }

            let mut ranking: Vec<ProductRevenue> = groups
                .into_iter()
                .map(|(name, (total, count))| ProductRevenue {
                    product_name: name.to_string(),
                    total_cents: total,
                    sales_count: count,
                })
                .collect();
            ranking.sort_by(|a, b| {
                b.total_cents
                    .cmp(&a.total_cents)
                    .then_with(|| a.product_name.cmp(&b.product_name))
            });
            ranking.truncate(limit);
            ranking
        })
    }

    async fn repeat_customer_count(&self, window: TimeWindow) -> Result<u64, StoreError> {
        let purchases = self.customer_purchases(window).await?;
        Ok(purchases.iter().filter(|c| c.purchase_count > 1).count() as u64)
    }

    async fn customer_purchases(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<CustomerPurchases>, StoreError> {
        self.read(|t| {
            let mut groups: BTreeMap<&CustomerId, (u64, Cents)> = BTreeMap::new();
            for sale in Self::sales_in(t, window) {
                if let Some(customer_id) = &sale.customer_id {
                    let entry = groups.entry(customer_id).or_default();
                    entry.0 += 1;
                    entry.1 += sale.amount_cents;
                }
            }
            groups
                .into_iter()
                .map(|(id, (count, spent))| CustomerPurchases {
                    customer_id: id.clone(),
                    purchase_count: count,
                    total_spent: spent,
                })
                .collect()
        })
    }

    async fn expense_total(&self, window: TimeWindow) -> Result<Cents, StoreError> {
        self.read(|t| {
            t.expenses
                .values()
                .filter(|e| window.contains(e.date))
                .map(|e| e.amount_cents)
                .sum()
        })
    }

    async fn expenses_by_category(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<CategoryTotal>, StoreError> {
        self.read(|t| {
            let mut groups: HashMap<&str, (Cents, u64)> = HashMap::new();
            for expense in t.expenses.values().filter(|e| window.contains(e.date)) {
                let category = expense.category.as_deref().unwrap_or(UNCATEGORIZED);
                let entry = groups.entry(category).or_default();
                entry.0 += expense.amount_cents;
                entry.1 += 1;
            }

            let mut totals: Vec<CategoryTotal> = groups
                .into_iter()
                .map(|(category, (total, count))| CategoryTotal {
                    category: category.to_string(),
                    total_cents: total,
                    count,
                })
                .collect();
            totals.sort_by(|a, b| {
                b.total_cents
                    .cmp(&a.total_cents)
                    .then_with(|| a.category.cmp(&b.category))
            });
            totals
        })
    }

    async fn revenue_by_period(
        &self,
        window: TimeWindow,
        interval: TrendInterval,
    ) -> Result<Vec<PeriodRevenue>, StoreError> {
        self.read(|t| {
            let mut buckets: BTreeMap<String, Cents> = BTreeMap::new();
            for sale in Self::sales_in(t, window) {
                *buckets.entry(interval.bucket_label(sale.date)).or_default() += sale.amount_cents;
            }
            buckets
                .into_iter()
                .map(|(period, revenue)| PeriodRevenue { period, revenue })
                .collect()
        })
    }

    async fn customer_count(&self) -> Result<u64, StoreError> {
        self.read(|t| t.customers.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use storepulse_records::{NewCustomer, NewExpense, NewSale};

    fn jan(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn january() -> TimeWindow {
        TimeWindow::new(jan(1, 0), Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()).unwrap()
    }

    async fn sale(store: &InMemoryRecordStore, at: DateTime<Utc>, product: &str, cents: i64, customer: Option<&str>) -> Sale {
        let mut input = NewSale::new(at, product, Cents::new(cents));
        if let Some(c) = customer {
            input = input.with_customer(CustomerId::new(c).unwrap());
        }
        let sale = input.into_sale(SaleId::new(), at).unwrap();
        store.insert_sale(&sale).await.unwrap();
        sale
    }

    async fn coffee_shop() -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        sale(&store, jan(15, 9), "Coffee", 599, Some("CUST001")).await;
        sale(&store, jan(16, 9), "Coffee", 599, Some("CUST001")).await;
        sale(&store, jan(17, 12), "Sandwich", 850, Some("CUST002")).await;
        store
    }

    #[tokio::test]
    async fn totals_respect_half_open_window() {
        let store = coffee_shop().await;
        let totals = store.sales_totals(january()).await.unwrap();
        assert_eq!(totals, SalesTotals { total_cents: Cents::new(2048), count: 3 });

        // End is exclusive.
        let until_17th_noon = TimeWindow::new(jan(1, 0), jan(17, 12)).unwrap();
        let totals = store.sales_totals(until_17th_noon).await.unwrap();
        assert_eq!(totals.count, 2);
    }

    #[tokio::test]
    async fn product_ranking_and_repeat_customers() {
        let store = coffee_shop().await;
        let ranking = store.revenue_by_product(january(), 2).await.unwrap();
        assert_eq!(ranking[0].product_name, "Coffee");
        assert_eq!(ranking[0].total_cents, Cents::new(1198));
        assert_eq!(ranking[0].sales_count, 2);
        assert_eq!(ranking[1].product_name, "Sandwich");

        assert_eq!(store.repeat_customer_count(january()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ranking_ties_break_by_name() {
        let store = InMemoryRecordStore::new();
        sale(&store, jan(3, 9), "Tea", 300, None).await;
        sale(&store, jan(3, 10), "Bagel", 300, None).await;
        let ranking = store.revenue_by_product(january(), 10).await.unwrap();
        let names: Vec<_> = ranking.iter().map(|p| p.product_name.as_str()).collect();
        assert_eq!(names, ["Bagel", "Tea"]);
    }

    #[tokio::test]
    async fn anonymous_sales_are_not_customers() {
        let store = InMemoryRecordStore::new();
        sale(&store, jan(3, 9), "Tea", 300, None).await;
        sale(&store, jan(3, 10), "Tea", 300, None).await;
        assert_eq!(store.repeat_customer_count(january()).await.unwrap(), 0);
        assert!(store.customer_purchases(january()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expenses_group_missing_category() {
        let store = InMemoryRecordStore::new();
        for (desc, cents, category) in [("Rent", 50_000, Some("Rent")), ("Mop", 1_500, None), ("Soap", 500, None)] {
            let mut input = NewExpense::new(jan(5, 8), desc, Cents::new(cents));
            if let Some(c) = category {
                input = input.with_category(c);
            }
            store
                .insert_expense(&input.into_expense(ExpenseId::new(), jan(5, 8)).unwrap())
                .await
                .unwrap();
        }

        assert_eq!(store.expense_total(january()).await.unwrap(), Cents::new(52_000));
        let breakdown = store.expenses_by_category(january()).await.unwrap();
        assert_eq!(breakdown[0].category, "Rent");
        assert_eq!(breakdown[1].category, UNCATEGORIZED);
        assert_eq!(breakdown[1].total_cents, Cents::new(2_000));
        assert_eq!(breakdown[1].count, 2);
    }

    #[tokio::test]
    async fn revenue_buckets_are_ordered() {
        let store = coffee_shop().await;
        let daily = store.revenue_by_period(january(), TrendInterval::Daily).await.unwrap();
        let labels: Vec<_> = daily.iter().map(|p| p.period.as_str()).collect();
        assert_eq!(labels, ["2024-01-15", "2024-01-16", "2024-01-17"]);

        let weekly = store.revenue_by_period(january(), TrendInterval::Weekly).await.unwrap();
        assert_eq!(weekly, vec![PeriodRevenue { period: "2024-W03".into(), revenue: Cents::new(2048) }]);
    }

    #[tokio::test]
    async fn customer_ids_are_unique() {
        let store = InMemoryRecordStore::new();
        let customer = NewCustomer::new(CustomerId::new("CUST001").unwrap())
            .into_customer(jan(1, 0))
            .unwrap();
        store.insert_customer(&customer).await.unwrap();
        assert!(matches!(
            store.insert_customer(&customer).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.customer_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_and_delete_missing_rows() {
        let store = coffee_shop().await;
        let ghost = NewSale::new(jan(2, 0), "Ghost", Cents::new(1))
            .into_sale(SaleId::new(), jan(2, 0))
            .unwrap();
        assert!(matches!(store.update_sale(&ghost).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete_sale(ghost.id).await, Err(StoreError::NotFound(_))));
    }
}
