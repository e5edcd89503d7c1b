//! Shared handler state.

use std::sync::Arc;

use domain::{
    ActivityService, ItemService, NotificationDispatcher, OrderStateService, PaymentService,
    ReviewService,
};
use store::MarketStore;

/// Services shared by all handlers, built over one store.
pub struct AppState<S: MarketStore> {
    pub orders: OrderStateService<S>,
    pub payments: PaymentService<S>,
    pub reviews: ReviewService<S>,
    pub items: ItemService<S>,
    pub activity: ActivityService<S>,
}

impl<S: MarketStore> AppState<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        let orders = OrderStateService::new(Arc::clone(&store), notifier);

        Self {
            payments: PaymentService::new(orders.clone()),
            reviews: ReviewService::new(Arc::clone(&store)),
            items: ItemService::new(Arc::clone(&store)),
            activity: ActivityService::new(store),
            orders,
        }
    }
}
