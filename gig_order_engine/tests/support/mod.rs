#![allow(dead_code)]
//! A marketplace on a throwaway SQLite database, and shortcuts for getting orders into a given state.
use gig_order_engine::{
    db_types::{Actor, Money, NewOrder, Order, OrderId, OrderStatus, Role, UserId, WorkType},
    events::EventProducers,
    test_utils::prepare_env::{drop_database, prepare_test_env, random_db_path},
    BidApi,
    LedgerApi,
    MarketplaceDatabase,
    OrderFlowApi,
    PaymentApi,
    PayoutPolicy,
    SqliteDatabase,
    TierRate,
    TierTable,
    TransitionMetadata,
};
use log::*;

pub const CLIENT: UserId = UserId(100);
pub const WRITER: UserId = UserId(200);
pub const MANAGER: UserId = UserId(300);
pub const ADMIN: UserId = UserId(1);
pub const PLATFORM: UserId = UserId(0);

/// The states an order passes through on the way to client acceptance, in order.
pub const HAPPY_PATH: [OrderStatus; 7] = [
    OrderStatus::Approved,
    OrderStatus::Assigned,
    OrderStatus::InProgress,
    OrderStatus::ManagerReview,
    OrderStatus::Editing,
    OrderStatus::Delivered,
    OrderStatus::AcceptedByClient,
];

#[derive(Debug)]
pub struct Marketplace {
    pub url: String,
    pub db: SqliteDatabase,
    pub orders: OrderFlowApi<SqliteDatabase, TierTable>,
    pub bids: BidApi<SqliteDatabase, TierTable>,
    pub payments: PaymentApi<SqliteDatabase>,
    pub ledger: LedgerApi<SqliteDatabase>,
}

impl Marketplace {
    pub async fn new() -> Self {
        Self::with_setup(TierTable::new(TierRate::flat(Money::from(150))), EventProducers::default()).await
    }

    pub async fn with_setup(tiers: TierTable, producers: EventProducers) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 10).await.expect("Error creating connection to database");
        debug!("🚀️ Created test marketplace at {url}");
        let policy = PayoutPolicy::default();
        let orders = OrderFlowApi::new(db.clone(), tiers.clone(), policy, producers.clone());
        let bids = BidApi::new(db.clone(), tiers, policy, producers.clone());
        let payments = PaymentApi::new(db.clone(), policy, producers);
        let ledger = LedgerApi::new(db.clone());
        Self { url, db, orders, bids, payments, ledger }
    }

    pub async fn tear_down(self) {
        let Self { url, mut db, .. } = self;
        if let Err(e) = db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        drop_database(&url).await;
    }

    /// Creates a pending order for `units` pages of ordinary work.
    pub async fn new_order(&self, units: i64, total: i64) -> Order {
        let order = NewOrder::new(CLIENT, Money::from(total)).with_work_type(WorkType::Ordinary).with_units(units, 0, 0);
        self.orders.create_order(order, Actor::new(CLIENT, Role::Client)).await.unwrap()
    }

    /// Moves the order through each status in `path`, starting from wherever it is now.
    ///
    /// Assignment goes to [`WRITER`], cancellation is done by an admin, and everything else by [`MANAGER`].
    pub async fn walk(&self, order_id: OrderId, path: &[OrderStatus]) -> Order {
        let mut order = self.orders.fetch_order(order_id).await.unwrap();
        for &to in path {
            let (actor, metadata) = match to {
                OrderStatus::Assigned => (Actor::manager(MANAGER), TransitionMetadata::default().with_writer(WRITER)),
                OrderStatus::Cancelled => (Actor::admin(ADMIN), TransitionMetadata::default()),
                _ => (Actor::manager(MANAGER), TransitionMetadata::default()),
            };
            order = self
                .orders
                .transition(order_id, order.status, to, actor, metadata)
                .await
                .unwrap_or_else(|e| panic!("Could not move order {order_id} to {to}: {e}"));
        }
        order
    }

    /// Creates an order of 3 ordinary units for 900, and takes it all the way to client acceptance.
    pub async fn order_awaiting_payment(&self) -> Order {
        let order = self.new_order(3, 900).await;
        self.walk(order.id, &HAPPY_PATH).await
    }

    /// Like [`Self::order_awaiting_payment`], and then confirms payment.
    pub async fn settled_order(&self) -> Order {
        let order = self.order_awaiting_payment().await;
        self.payments.confirm_payment(order.id, Actor::system(), "MPESA-SETTLE").await.unwrap();
        self.orders.fetch_order(order.id).await.unwrap()
    }

    /// Returns an order whose current status is `status`.
    pub async fn order_in(&self, status: OrderStatus) -> Order {
        use OrderStatus::*;
        match status {
            Completed => self.settled_order().await,
            Paid => {
                let settled = self.settled_order().await;
                self.walk(settled.id, &[RevisionPending, Editing, Delivered, AcceptedByClient, Paid]).await
            },
            RevisionPending => {
                let order = self.new_order(3, 900).await;
                let path = [&HAPPY_PATH[..6], &[RevisionPending][..]].concat();
                self.walk(order.id, &path).await
            },
            Cancelled => {
                let order = self.new_order(3, 900).await;
                self.walk(order.id, &[Cancelled]).await
            },
            other => {
                let order = self.new_order(3, 900).await;
                let n = HAPPY_PATH.iter().position(|s| *s == other).map(|i| i + 1).unwrap_or(0);
                self.walk(order.id, &HAPPY_PATH[..n]).await
            },
        }
    }

    pub async fn balance(&self, user: UserId) -> Money {
        self.ledger.balance(user).await.unwrap().balance
    }
}
