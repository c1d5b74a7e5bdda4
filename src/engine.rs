// src/engine.rs
//
// SyncEngine - wiring of fetcher, collections, realtime bridge, and
// reducers.
//
// One engine per application session. The realtime connection and the
// reducer subscription live behind an explicit init()/teardown() pair; no
// module-level connection state exists anywhere.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::backend::{FetcherConfig, HttpPageFetcher, PageFetcher};
use crate::domain::{
    CacheEntity, Customer, ProfitRow, Product, Purchase, PurchasePayment, Sale, SalePayment,
    Supplier, Transaction,
};
use crate::error::AppResult;
use crate::realtime::{
    BridgeConfig, CascadeRule, JsonLineTransport, RealtimeBridge, RealtimeTransport,
    ReducerRegistry, RemoteEvent, ResourceCache, TokenSource,
};
use crate::sync::{Collection, PagingMode, SyncConfig};

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub fetcher: FetcherConfig,
    pub sync: SyncConfig,
    pub bridge: BridgeConfig,
    /// Address of the realtime endpoint.
    pub realtime_addr: String,
}

pub struct SyncEngine {
    customers: Arc<Collection<Customer>>,
    suppliers: Arc<Collection<Supplier>>,
    products: Arc<Collection<Product>>,
    sales: Arc<Collection<Sale>>,
    sale_payments: Arc<Collection<SalePayment>>,
    purchases: Arc<Collection<Purchase>>,
    purchase_payments: Arc<Collection<PurchasePayment>>,
    transactions: Arc<Collection<Transaction>>,
    profits: Arc<Collection<ProfitRow>>,
    bridge: RealtimeBridge,
    registry: Arc<ReducerRegistry>,
    subscription: Mutex<Option<Uuid>>,
}

impl SyncEngine {
    pub fn new(config: EngineConfig, tokens: Arc<dyn TokenSource>) -> AppResult<Self> {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new(config.fetcher)?);
        let transport: Arc<dyn RealtimeTransport> =
            Arc::new(JsonLineTransport::new(config.realtime_addr));
        Ok(Self::with_parts(
            fetcher,
            transport,
            tokens,
            config.sync,
            config.bridge,
        ))
    }

    /// Assemble the engine from its seams. Tests inject scripted fetchers
    /// and transports here.
    pub fn with_parts(
        fetcher: Arc<dyn PageFetcher>,
        transport: Arc<dyn RealtimeTransport>,
        tokens: Arc<dyn TokenSource>,
        sync: SyncConfig,
        bridge: BridgeConfig,
    ) -> Self {
        let customers = Arc::new(Collection::new(
            Arc::clone(&fetcher),
            sync.clone(),
            PagingMode::Uniform,
        ));
        let suppliers = Arc::new(Collection::new(
            Arc::clone(&fetcher),
            sync.clone(),
            PagingMode::Uniform,
        ));
        let products = Arc::new(Collection::new(
            Arc::clone(&fetcher),
            sync.clone(),
            PagingMode::Uniform,
        ));
        let sales = Arc::new(Collection::new(
            Arc::clone(&fetcher),
            sync.clone(),
            PagingMode::Uniform,
        ));
        let sale_payments = Arc::new(Collection::new(
            Arc::clone(&fetcher),
            sync.clone(),
            PagingMode::Uniform,
        ));
        let purchases = Arc::new(Collection::new(
            Arc::clone(&fetcher),
            sync.clone(),
            PagingMode::Uniform,
        ));
        let purchase_payments = Arc::new(Collection::new(
            Arc::clone(&fetcher),
            sync.clone(),
            PagingMode::Uniform,
        ));
        // Transactions churn at the head: new rows prepend on page 1, so the
        // head is refreshed independently of the warmed tail.
        let transactions = Arc::new(Collection::new(
            Arc::clone(&fetcher),
            sync.clone(),
            PagingMode::HeadTail,
        ));
        let profits = Arc::new(Collection::new(
            Arc::clone(&fetcher),
            sync,
            PagingMode::Uniform,
        ));

        let mut registry = ReducerRegistry::new();
        registry.register(Arc::clone(&customers) as Arc<dyn ResourceCache>);
        registry.register(Arc::clone(&suppliers) as Arc<dyn ResourceCache>);
        registry.register(Arc::clone(&products) as Arc<dyn ResourceCache>);
        registry.register(Arc::clone(&sales) as Arc<dyn ResourceCache>);
        registry.register(Arc::clone(&sale_payments) as Arc<dyn ResourceCache>);
        registry.register(Arc::clone(&purchases) as Arc<dyn ResourceCache>);
        registry.register(Arc::clone(&purchase_payments) as Arc<dyn ResourceCache>);
        registry.register(Arc::clone(&transactions) as Arc<dyn ResourceCache>);
        registry.register(Arc::clone(&profits) as Arc<dyn ResourceCache>);
        registry.cascade(CascadeRule {
            parent: Sale::RESOURCE,
            children: vec![
                SalePayment::RESOURCE,
                Transaction::RESOURCE,
                ProfitRow::RESOURCE,
            ],
        });
        registry.cascade(CascadeRule {
            parent: Purchase::RESOURCE,
            children: vec![PurchasePayment::RESOURCE, Transaction::RESOURCE],
        });

        let bridge = RealtimeBridge::new(transport, tokens, bridge);

        Self {
            customers,
            suppliers,
            products,
            sales,
            sale_payments,
            purchases,
            purchase_payments,
            transactions,
            profits,
            bridge,
            registry: Arc::new(registry),
            subscription: Mutex::new(None),
        }
    }

    /// Open the realtime connection and start routing events to the
    /// reducers.
    pub fn init(&self) {
        let registry = Arc::clone(&self.registry);
        let id = self.bridge.subscribe(move |event| registry.handle(event));
        *self.subscription.lock().unwrap() = Some(id);
        self.bridge.init();
    }

    /// Intentional session end: close the connection for good.
    pub fn teardown(&self) {
        if let Some(id) = self.subscription.lock().unwrap().take() {
            self.bridge.unsubscribe(id);
        }
        self.bridge.teardown();
    }

    /// Raw event subscription for callers outside the reducer path.
    pub fn subscribe<F>(&self, handler: F) -> Uuid
    where
        F: Fn(&RemoteEvent) + Send + Sync + 'static,
    {
        self.bridge.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.bridge.unsubscribe(id);
    }

    pub fn customers(&self) -> &Arc<Collection<Customer>> {
        &self.customers
    }

    pub fn suppliers(&self) -> &Arc<Collection<Supplier>> {
        &self.suppliers
    }

    pub fn products(&self) -> &Arc<Collection<Product>> {
        &self.products
    }

    pub fn sales(&self) -> &Arc<Collection<Sale>> {
        &self.sales
    }

    pub fn sale_payments(&self) -> &Arc<Collection<SalePayment>> {
        &self.sale_payments
    }

    pub fn purchases(&self) -> &Arc<Collection<Purchase>> {
        &self.purchases
    }

    pub fn purchase_payments(&self) -> &Arc<Collection<PurchasePayment>> {
        &self.purchase_payments
    }

    pub fn transactions(&self) -> &Arc<Collection<Transaction>> {
        &self.transactions
    }

    pub fn profits(&self) -> &Arc<Collection<ProfitRow>> {
        &self.profits
    }
}
