//! Carts service.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    slice,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use mockall::automock;
use tracing::{Span, debug, info, warn};

use crate::{
    config::CartsSettings,
    domain::{
        carts::{
            errors::{CartsServiceError, InvalidOperation},
            fsm::{self, CartEvent, CartState},
            keys::CartKeys,
            models::CartLine,
            repositories::{
                KvCartItemsRepository, KvLeaseRepository, KvSessionRepository, Lease,
                LeaseSettings,
            },
        },
        catalog::{ProductCatalog, models::ProductId},
    },
    ids::{CartId, CartIdGenerator},
    store::KeyValueStore,
};

/// Fresh ids tried by `create_cart` before giving up.
const CREATE_ATTEMPTS: usize = 8;

/// Cart engine over an expiring key-value store.
///
/// Mutations hold the cart's lease for their whole read-check-write cycle.
/// Reads take no lease.
#[derive(Clone)]
pub struct KvCartsService {
    store: Arc<dyn KeyValueStore>,
    catalog: Arc<dyn ProductCatalog>,
    ids: CartIdGenerator,
    sessions: KvSessionRepository,
    items: KvCartItemsRepository,
    leases: KvLeaseRepository,
    ttl: Duration,
}

impl Debug for KvCartsService {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("KvCartsService")
            .field("ttl", &self.ttl)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl KvCartsService {
    /// Build the engine. `settings` should already be validated.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        catalog: Arc<dyn ProductCatalog>,
        settings: &CartsSettings,
    ) -> Self {
        let keys = CartKeys::new(settings.key_prefix.clone());

        Self {
            store,
            catalog,
            ids: CartIdGenerator::new(settings.id_alphabet.clone()),
            sessions: KvSessionRepository::new(keys.clone()),
            items: KvCartItemsRepository::new(keys.clone()),
            leases: KvLeaseRepository::new(
                keys,
                LeaseSettings {
                    ttl: settings.lease_ttl,
                    wait: settings.lease_wait,
                    retry_interval: settings.lease_retry_interval,
                },
            ),
            ttl: settings.ttl,
        }
    }

    fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Current state, or `Expired` after removing whatever keys the session
    /// left behind.
    async fn live_state(&self, cart: &CartId) -> Result<CartState, CartsServiceError> {
        if let Some(state) = self.sessions.get_state(self.store(), cart).await? {
            return Ok(state);
        }

        let removed = self.sessions.destroy(self.store(), cart).await?;

        if removed > 0 {
            warn!(cart_id = %cart, removed, "removed stray keys of expired cart session");
        }

        Err(CartsServiceError::Expired { cart: cart.clone() })
    }

    async fn mutable_state(&self, cart: &CartId) -> Result<CartState, CartsServiceError> {
        let state = self.live_state(cart).await?;

        if state.is_mutable() {
            Ok(state)
        } else {
            Err(CartsServiceError::InvalidState { state })
        }
    }

    async fn pending_state(&self, cart: &CartId) -> Result<CartState, CartsServiceError> {
        let state = self.live_state(cart).await?;

        if state == CartState::CheckoutPending {
            Ok(state)
        } else {
            Err(CartsServiceError::InvalidOperation {
                state,
                reason: InvalidOperation::RequiresState {
                    required: CartState::CheckoutPending,
                },
            })
        }
    }

    /// Drive `event`, write the resulting state and restart the TTL of every
    /// session key.
    async fn commit(
        &self,
        cart: &CartId,
        state: CartState,
        event: CartEvent,
    ) -> Result<CartState, CartsServiceError> {
        let next = fsm::apply(state, event);

        self.sessions
            .touch_items(self.store(), cart, self.ttl)
            .await?;

        self.sessions
            .put_state(self.store(), cart, next, self.ttl)
            .await?;

        Ok(next)
    }

    async fn lease(&self, cart: &CartId) -> Result<Lease, CartsServiceError> {
        match self.leases.acquire(self.store(), cart).await? {
            Some(lease) => Ok(lease),
            None => {
                warn!(cart_id = %cart, "timed out waiting for cart lease");

                Err(CartsServiceError::Busy { cart: cart.clone() })
            }
        }
    }

    /// Release a lease. Failures are logged; the lease key expires anyway.
    async fn release(&self, lease: Lease) {
        match self.leases.release(self.store(), lease).await {
            Ok(true) => {}
            Ok(false) => warn!("cart lease expired before release"),
            Err(source) => warn!(error = %source, "failed to release cart lease"),
        }
    }

    async fn add_first_time_leased(
        &self,
        cart: &CartId,
        product: &ProductId,
    ) -> Result<u32, CartsServiceError> {
        let state = self.mutable_state(cart).await?;

        let found = self
            .catalog
            .resolve_summaries(slice::from_ref(product))
            .await?;

        if !found.contains_key(product) {
            return Err(CartsServiceError::ProductNotFound(product.clone()));
        }

        let quantity = match self.items.quantity(self.store(), cart, product).await? {
            Some(_) => {
                self.items
                    .increment(self.store(), cart, product, 1)
                    .await?
            }
            None => {
                if let Err(source) = self
                    .items
                    .insert(self.store(), cart, product, self.ttl)
                    .await
                {
                    self.undo_insert(cart, product).await;

                    return Err(source.into());
                }

                1
            }
        };

        let state = self.commit(cart, state, CartEvent::AddItem).await?;

        debug!(quantity, %state, "added item");

        Ok(quantity)
    }

    /// Best-effort removal of a partly written insert.
    async fn undo_insert(&self, cart: &CartId, product: &ProductId) {
        if let Err(source) = self.items.remove(self.store(), cart, product).await {
            warn!(
                cart_id = %cart,
                product_id = %product,
                error = %source,
                "failed to roll back item insert"
            );
        }
    }

    async fn change_quantity_leased(
        &self,
        cart: &CartId,
        product: &ProductId,
        delta: i64,
    ) -> Result<u32, CartsServiceError> {
        let state = self.mutable_state(cart).await?;

        let Some(current) = self.items.quantity(self.store(), cart, product).await? else {
            return Err(CartsServiceError::InvalidOperation {
                state,
                reason: InvalidOperation::ItemNotInCart {
                    product: product.clone(),
                },
            });
        };

        let next = i64::from(current).saturating_add(delta);

        if next < 1 {
            return Err(CartsServiceError::InvalidOperation {
                state,
                reason: InvalidOperation::BelowMinimumQuantity { current, delta },
            });
        }

        if next > i64::from(u32::MAX) {
            return Err(CartsServiceError::InvalidOperation {
                state,
                reason: InvalidOperation::AboveMaximumQuantity { current, delta },
            });
        }

        let quantity = if delta == 0 {
            current
        } else {
            self.items
                .increment(self.store(), cart, product, delta)
                .await?
        };

        let event = if delta > 0 {
            CartEvent::AddItem
        } else {
            CartEvent::RemoveItem
        };

        let state = self.commit(cart, state, event).await?;

        debug!(quantity, %state, "changed item quantity");

        Ok(quantity)
    }

    async fn remove_item_leased(
        &self,
        cart: &CartId,
        product: &ProductId,
    ) -> Result<(), CartsServiceError> {
        let state = self.mutable_state(cart).await?;

        self.items.remove(self.store(), cart, product).await?;

        let state = self.commit(cart, state, CartEvent::RemoveItem).await?;

        debug!(%state, "removed item");

        Ok(())
    }

    async fn begin_checkout_leased(&self, cart: &CartId) -> Result<CartState, CartsServiceError> {
        let state = self.live_state(cart).await?;

        if state.is_terminal() {
            return Err(CartsServiceError::InvalidState { state });
        }

        if !self.items.has_items(self.store(), cart).await? {
            return Err(CartsServiceError::InvalidOperation {
                state,
                reason: InvalidOperation::EmptyCart,
            });
        }

        let next = self.commit(cart, state, CartEvent::Checkout).await?;

        info!(from = %state, state = %next, "began checkout");

        Ok(next)
    }

    async fn payment_success_leased(&self, cart: &CartId) -> Result<(), CartsServiceError> {
        let state = self.pending_state(cart).await?;

        let closed = fsm::apply(state, CartEvent::PaymentSuccess);

        self.sessions
            .put_state(self.store(), cart, closed, self.ttl)
            .await?;

        let removed = self.sessions.destroy(self.store(), cart).await?;

        info!(removed, "payment succeeded, cart closed");

        Ok(())
    }

    async fn cancel_checkout_leased(&self, cart: &CartId) -> Result<CartState, CartsServiceError> {
        let state = self.pending_state(cart).await?;

        let next = self.commit(cart, state, CartEvent::Cancel).await?;

        info!(state = %next, "cancelled checkout");

        Ok(next)
    }

    async fn clear_leased(&self, cart: &CartId) -> Result<(), CartsServiceError> {
        let removed = self.sessions.destroy(self.store(), cart).await?;

        info!(removed, "cleared cart");

        Ok(())
    }
}

#[async_trait]
impl CartsService for KvCartsService {
    #[tracing::instrument(
        name = "carts.service.create_cart",
        skip(self),
        fields(cart_id = tracing::field::Empty),
        err
    )]
    async fn create_cart(&self) -> Result<CartId, CartsServiceError> {
        for _ in 0..CREATE_ATTEMPTS {
            let cart = self.ids.generate();

            if self.open_session(&cart).await? {
                Span::current().record("cart_id", tracing::field::display(&cart));

                return Ok(cart);
            }
        }

        Err(CartsServiceError::IdCollision {
            attempts: CREATE_ATTEMPTS,
        })
    }

    #[tracing::instrument(
        name = "carts.service.open_session",
        skip(self, cart),
        fields(cart_id = %cart),
        err
    )]
    async fn open_session(&self, cart: &CartId) -> Result<bool, CartsServiceError> {
        let created = self
            .sessions
            .initialise(self.store(), cart, self.ttl)
            .await?;

        if created {
            info!("opened cart session");
        } else {
            debug!("cart session already exists");
        }

        Ok(created)
    }

    #[tracing::instrument(
        name = "carts.service.state",
        skip(self, cart),
        fields(cart_id = %cart),
        err
    )]
    async fn state(&self, cart: &CartId) -> Result<CartState, CartsServiceError> {
        self.live_state(cart).await
    }

    #[tracing::instrument(
        name = "carts.service.quantity",
        skip(self, cart, product),
        fields(cart_id = %cart, product_id = %product),
        err
    )]
    async fn quantity(&self, cart: &CartId, product: &ProductId) -> Result<u32, CartsServiceError> {
        self.live_state(cart).await?;

        Ok(self
            .items
            .quantity(self.store(), cart, product)
            .await?
            .unwrap_or(0))
    }

    #[tracing::instrument(
        name = "carts.service.add_first_time",
        skip(self, cart, product),
        fields(cart_id = %cart, product_id = %product),
        err
    )]
    async fn add_first_time(
        &self,
        cart: &CartId,
        product: &ProductId,
    ) -> Result<u32, CartsServiceError> {
        let lease = self.lease(cart).await?;
        let result = self.add_first_time_leased(cart, product).await;
        self.release(lease).await;

        result
    }

    #[tracing::instrument(
        name = "carts.service.change_quantity",
        skip(self, cart, product),
        fields(cart_id = %cart, product_id = %product),
        err
    )]
    async fn change_quantity(
        &self,
        cart: &CartId,
        product: &ProductId,
        delta: i64,
    ) -> Result<u32, CartsServiceError> {
        let lease = self.lease(cart).await?;
        let result = self.change_quantity_leased(cart, product, delta).await;
        self.release(lease).await;

        result
    }

    #[tracing::instrument(
        name = "carts.service.remove_item",
        skip(self, cart, product),
        fields(cart_id = %cart, product_id = %product),
        err
    )]
    async fn remove_item(&self, cart: &CartId, product: &ProductId) -> Result<(), CartsServiceError> {
        let lease = self.lease(cart).await?;
        let result = self.remove_item_leased(cart, product).await;
        self.release(lease).await;

        result
    }

    #[tracing::instrument(
        name = "carts.service.get_all",
        skip(self, cart),
        fields(cart_id = %cart, lines_count = tracing::field::Empty),
        err
    )]
    async fn get_all(&self, cart: &CartId) -> Result<Vec<CartLine>, CartsServiceError> {
        self.live_state(cart).await?;

        let products = self.items.product_ids(self.store(), cart).await?;

        if products.is_empty() {
            Span::current().record("lines_count", 0);

            return Ok(Vec::new());
        }

        let quantities = self
            .items
            .quantities(self.store(), cart, &products)
            .await?;

        let mut summaries = self.catalog.resolve_summaries(&products).await?;

        let lines: Vec<CartLine> = products
            .iter()
            .zip(quantities)
            .filter(|(_, quantity)| *quantity > 0)
            .filter_map(|(product, quantity)| {
                summaries
                    .remove(product)
                    .map(|product| CartLine { product, quantity })
            })
            .collect();

        Span::current().record("lines_count", lines.len());

        Ok(lines)
    }

    #[tracing::instrument(
        name = "carts.service.begin_checkout",
        skip(self, cart),
        fields(cart_id = %cart),
        err
    )]
    async fn begin_checkout(&self, cart: &CartId) -> Result<CartState, CartsServiceError> {
        let lease = self.lease(cart).await?;
        let result = self.begin_checkout_leased(cart).await;
        self.release(lease).await;

        result
    }

    #[tracing::instrument(
        name = "carts.service.checkout_handoff",
        skip(self, cart),
        fields(cart_id = %cart),
        err
    )]
    async fn checkout_handoff(&self, cart: &CartId) -> Result<Vec<CartLine>, CartsServiceError> {
        if self.state(cart).await? != CartState::CheckoutPending {
            self.begin_checkout(cart).await?;
        }

        self.get_all(cart).await
    }

    #[tracing::instrument(
        name = "carts.service.payment_success",
        skip(self, cart),
        fields(cart_id = %cart),
        err
    )]
    async fn payment_success(&self, cart: &CartId) -> Result<(), CartsServiceError> {
        let lease = self.lease(cart).await?;
        let result = self.payment_success_leased(cart).await;
        self.release(lease).await;

        result
    }

    #[tracing::instrument(
        name = "carts.service.cancel_checkout",
        skip(self, cart),
        fields(cart_id = %cart),
        err
    )]
    async fn cancel_checkout(&self, cart: &CartId) -> Result<CartState, CartsServiceError> {
        let lease = self.lease(cart).await?;
        let result = self.cancel_checkout_leased(cart).await;
        self.release(lease).await;

        result
    }

    #[tracing::instrument(
        name = "carts.service.clear",
        skip(self, cart),
        fields(cart_id = %cart),
        err
    )]
    async fn clear(&self, cart: &CartId) -> Result<(), CartsServiceError> {
        let lease = self.leases.acquire(self.store(), cart).await?;

        if lease.is_none() {
            warn!("cart lease still held, clearing anyway");
        }

        let result = self.clear_leased(cart).await;

        if let Some(lease) = lease {
            self.release(lease).await;
        }

        result
    }
}

/// Cart session operations. Every call is scoped to one cart.
#[automock]
#[async_trait]
pub trait CartsService: Send + Sync {
    /// Create a new, empty cart session and return its id. Fails with
    /// `IdCollision` when every fresh id tried already had a session.
    async fn create_cart(&self) -> Result<CartId, CartsServiceError>;

    /// Initialise a session for `cart` unless one exists. Returns whether
    /// this call created it.
    async fn open_session(&self, cart: &CartId) -> Result<bool, CartsServiceError>;

    /// Current lifecycle state.
    async fn state(&self, cart: &CartId) -> Result<CartState, CartsServiceError>;

    /// Stored quantity of a product, 0 when it is not in the cart.
    async fn quantity(&self, cart: &CartId, product: &ProductId) -> Result<u32, CartsServiceError>;

    /// Add one unit of a product, inserting it when new to the cart.
    /// Returns the resulting quantity.
    async fn add_first_time(
        &self,
        cart: &CartId,
        product: &ProductId,
    ) -> Result<u32, CartsServiceError>;

    /// Change a carted quantity by `delta`. Never removes the item.
    async fn change_quantity(
        &self,
        cart: &CartId,
        product: &ProductId,
        delta: i64,
    ) -> Result<u32, CartsServiceError>;

    /// Remove a product from the cart, whatever its quantity.
    async fn remove_item(&self, cart: &CartId, product: &ProductId) -> Result<(), CartsServiceError>;

    /// Resolved cart lines in insertion order. Products the catalog no
    /// longer knows are left out.
    async fn get_all(&self, cart: &CartId) -> Result<Vec<CartLine>, CartsServiceError>;

    /// Move a non-empty cart into checkout. A pending cart stays pending; a
    /// closed one is rejected.
    async fn begin_checkout(&self, cart: &CartId) -> Result<CartState, CartsServiceError>;

    /// Begin checkout unless already pending, then return the cart lines.
    async fn checkout_handoff(&self, cart: &CartId) -> Result<Vec<CartLine>, CartsServiceError>;

    /// Close a pending cart and destroy its session.
    async fn payment_success(&self, cart: &CartId) -> Result<(), CartsServiceError>;

    /// Return a pending cart to `IN_PROGRESS`.
    async fn cancel_checkout(&self, cart: &CartId) -> Result<CartState, CartsServiceError>;

    /// Destroy the session. Succeeds for sessions that are already gone, and
    /// proceeds without the lease once the lease wait runs out.
    async fn clear(&self, cart: &CartId) -> Result<(), CartsServiceError>;
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;
    use tokio::time;

    use crate::{
        config::DEFAULT_CART_TTL,
        domain::carts::errors::ErrorClass,
        store::{MockKeyValueStore, StoreError},
        test::{FailOnceStore, FailingCall, TestContext, sku},
    };

    use super::*;

    #[tokio::test]
    async fn create_cart_starts_empty() -> TestResult {
        let ctx = TestContext::new();

        let cart = ctx.carts.create_cart().await?;

        assert_eq!(ctx.carts.state(&cart).await?, CartState::Empty);
        assert!(ctx.carts.get_all(&cart).await?.is_empty(), "new cart has no lines");

        Ok(())
    }

    #[tokio::test]
    async fn open_session_does_not_clobber_existing_cart() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;

        assert!(!ctx.carts.open_session(&cart).await?, "session already exists");
        assert_eq!(ctx.carts.state(&cart).await?, CartState::InProgress);
        assert_eq!(ctx.carts.quantity(&cart, &sku(1)).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn unknown_cart_is_expired() {
        let ctx = TestContext::new();
        let cart = ctx.unknown_cart();

        let result = ctx.carts.get_all(&cart).await;

        assert!(
            matches!(&result, Err(CartsServiceError::Expired { cart: c }) if *c == cart),
            "expected Expired, got {result:?}"
        );
        assert_eq!(
            result.as_ref().err().map(CartsServiceError::class),
            Some(ErrorClass::Gone)
        );
    }

    #[tokio::test]
    async fn expired_check_removes_stray_item_keys() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;
        ctx.store.delete(&[ctx.keys.state(&cart)]).await?;

        let result = ctx.carts.quantity(&cart, &sku(1)).await;

        assert!(
            matches!(result, Err(CartsServiceError::Expired { .. })),
            "expected Expired, got {result:?}"
        );
        assert!(
            ctx.store.live_keys(&ctx.keys.cart_prefix(&cart)).is_empty(),
            "stray keys should have been removed"
        );

        Ok(())
    }

    #[tokio::test]
    async fn add_first_time_inserts_then_increments() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        assert_eq!(ctx.carts.add_first_time(&cart, &sku(1)).await?, 1);
        assert_eq!(ctx.carts.add_first_time(&cart, &sku(1)).await?, 2);
        assert_eq!(ctx.carts.add_first_time(&cart, &sku(2)).await?, 1);

        let lines = ctx.carts.get_all(&cart).await?;
        let quantities: Vec<(String, u32)> = lines
            .iter()
            .map(|line| (line.product.product_id.to_string(), line.quantity))
            .collect();

        assert_eq!(
            quantities,
            vec![("sku-1".to_string(), 2), ("sku-2".to_string(), 1)]
        );
        assert_eq!(ctx.carts.state(&cart).await?, CartState::InProgress);

        Ok(())
    }

    #[tokio::test]
    async fn get_all_skips_products_the_catalog_dropped() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        for n in [3, 1, 2] {
            ctx.carts.add_first_time(&cart, &sku(n)).await?;
        }

        ctx.catalog.remove(&sku(1));

        let lines = ctx.carts.get_all(&cart).await?;
        let products: Vec<&str> = lines
            .iter()
            .map(|line| line.product.product_id.as_str())
            .collect();

        assert_eq!(products, vec!["sku-3", "sku-2"]);
        assert_eq!(ctx.carts.quantity(&cart, &sku(1)).await?, 1, "item still stored");

        Ok(())
    }

    #[tokio::test]
    async fn add_first_time_unknown_product_is_not_found() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;
        let missing = ProductId::new("sku-404").expect("non-blank id");

        let result = ctx.carts.add_first_time(&cart, &missing).await;

        assert!(
            matches!(&result, Err(CartsServiceError::ProductNotFound(p)) if *p == missing),
            "expected ProductNotFound, got {result:?}"
        );
        assert_eq!(ctx.carts.state(&cart).await?, CartState::Empty, "state untouched");

        Ok(())
    }

    #[tokio::test]
    async fn change_quantity_rejects_results_below_one() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;
        ctx.carts.change_quantity(&cart, &sku(1), 1).await?;

        let result = ctx.carts.change_quantity(&cart, &sku(1), -2).await;

        assert!(
            matches!(
                result,
                Err(CartsServiceError::InvalidOperation {
                    state: CartState::InProgress,
                    reason: InvalidOperation::BelowMinimumQuantity { current: 2, delta: -2 },
                })
            ),
            "expected BelowMinimumQuantity, got {result:?}"
        );
        assert_eq!(ctx.carts.quantity(&cart, &sku(1)).await?, 2, "quantity unchanged");

        Ok(())
    }

    #[tokio::test]
    async fn change_quantity_requires_carted_item() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        let result = ctx.carts.change_quantity(&cart, &sku(1), 1).await;

        assert!(
            matches!(
                &result,
                Err(CartsServiceError::InvalidOperation {
                    state: CartState::Empty,
                    reason: InvalidOperation::ItemNotInCart { .. },
                })
            ),
            "expected ItemNotInCart, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn change_quantity_by_zero_keeps_quantity() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;

        assert_eq!(ctx.carts.change_quantity(&cart, &sku(1), 0).await?, 1);
        assert_eq!(ctx.carts.state(&cart).await?, CartState::InProgress);

        Ok(())
    }

    #[tokio::test]
    async fn remove_item_drops_line_regardless_of_quantity() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;
        ctx.carts.change_quantity(&cart, &sku(1), 4).await?;
        ctx.carts.remove_item(&cart, &sku(1)).await?;

        assert_eq!(ctx.carts.quantity(&cart, &sku(1)).await?, 0);
        assert!(ctx.carts.get_all(&cart).await?.is_empty(), "no lines left");
        assert_eq!(ctx.carts.state(&cart).await?, CartState::InProgress);

        Ok(())
    }

    #[tokio::test]
    async fn pending_cart_rejects_item_mutations() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;
        ctx.carts.begin_checkout(&cart).await?;

        let add = ctx.carts.add_first_time(&cart, &sku(2)).await;
        let change = ctx.carts.change_quantity(&cart, &sku(1), 1).await;
        let remove = ctx.carts.remove_item(&cart, &sku(1)).await;

        for result in [add.map(|_| ()), change.map(|_| ()), remove] {
            assert!(
                matches!(
                    result,
                    Err(CartsServiceError::InvalidState {
                        state: CartState::CheckoutPending
                    })
                ),
                "expected InvalidState, got {result:?}"
            );
        }

        assert_eq!(ctx.carts.quantity(&cart, &sku(1)).await?, 1);
        assert_eq!(ctx.carts.quantity(&cart, &sku(2)).await?, 0);

        Ok(())
    }

    /// A carted session whose state key says `CLOSED`, as left behind when
    /// destruction after payment fails.
    async fn closed_cart(ctx: &TestContext) -> Result<CartId, CartsServiceError> {
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;
        ctx.store
            .set(&ctx.keys.state(&cart), CartState::Closed.as_str(), DEFAULT_CART_TTL)
            .await?;

        Ok(cart)
    }

    #[tokio::test]
    async fn closed_cart_rejects_item_mutations() -> TestResult {
        let ctx = TestContext::new();
        let cart = closed_cart(&ctx).await?;

        let add = ctx.carts.add_first_time(&cart, &sku(2)).await;
        let change = ctx.carts.change_quantity(&cart, &sku(1), 1).await;
        let remove = ctx.carts.remove_item(&cart, &sku(1)).await;

        for result in [add.map(|_| ()), change.map(|_| ()), remove] {
            assert!(
                matches!(
                    result,
                    Err(CartsServiceError::InvalidState {
                        state: CartState::Closed
                    })
                ),
                "expected InvalidState, got {result:?}"
            );
        }

        assert_eq!(ctx.carts.quantity(&cart, &sku(1)).await?, 1);
        assert_eq!(ctx.carts.quantity(&cart, &sku(2)).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn closed_cart_cannot_check_out_again() -> TestResult {
        let ctx = TestContext::new();
        let cart = closed_cart(&ctx).await?;

        let begin = ctx.carts.begin_checkout(&cart).await.map(|_| ());
        let handoff = ctx.carts.checkout_handoff(&cart).await.map(|_| ());

        for result in [begin, handoff] {
            assert!(
                matches!(
                    result,
                    Err(CartsServiceError::InvalidState {
                        state: CartState::Closed
                    })
                ),
                "expected InvalidState, got {result:?}"
            );
        }

        assert_eq!(ctx.carts.state(&cart).await?, CartState::Closed);

        Ok(())
    }

    #[tokio::test]
    async fn begin_checkout_rejects_empty_cart() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        let result = ctx.carts.begin_checkout(&cart).await;

        assert!(
            matches!(
                result,
                Err(CartsServiceError::InvalidOperation {
                    state: CartState::Empty,
                    reason: InvalidOperation::EmptyCart,
                })
            ),
            "expected EmptyCart, got {result:?}"
        );
        assert_eq!(ctx.carts.state(&cart).await?, CartState::Empty);

        Ok(())
    }

    #[tokio::test]
    async fn begin_checkout_twice_stays_pending() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;

        assert_eq!(ctx.carts.begin_checkout(&cart).await?, CartState::CheckoutPending);
        assert_eq!(ctx.carts.begin_checkout(&cart).await?, CartState::CheckoutPending);

        Ok(())
    }

    #[tokio::test]
    async fn payment_and_cancel_require_pending_checkout() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;

        let payment = ctx.carts.payment_success(&cart).await;
        let cancel = ctx.carts.cancel_checkout(&cart).await.map(|_| ());

        for result in [payment, cancel] {
            assert!(
                matches!(
                    result,
                    Err(CartsServiceError::InvalidOperation {
                        state: CartState::InProgress,
                        reason: InvalidOperation::RequiresState {
                            required: CartState::CheckoutPending
                        },
                    })
                ),
                "expected RequiresState, got {result:?}"
            );
        }

        assert_eq!(ctx.carts.state(&cart).await?, CartState::InProgress);

        Ok(())
    }

    #[tokio::test]
    async fn payment_success_destroys_session() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;
        ctx.carts.begin_checkout(&cart).await?;
        ctx.carts.payment_success(&cart).await?;

        assert!(
            ctx.store.live_keys(&ctx.keys.cart_prefix(&cart)).is_empty(),
            "no session key should remain"
        );

        let result = ctx.carts.state(&cart).await;

        assert!(
            matches!(result, Err(CartsServiceError::Expired { .. })),
            "expected Expired, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn checkout_handoff_is_idempotent() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;

        let first = ctx.carts.checkout_handoff(&cart).await?;
        let second = ctx.carts.checkout_handoff(&cart).await?;

        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(ctx.carts.state(&cart).await?, CartState::CheckoutPending);

        Ok(())
    }

    #[tokio::test]
    async fn clear_is_idempotent() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;
        ctx.carts.clear(&cart).await?;
        ctx.carts.clear(&cart).await?;

        let result = ctx.carts.get_all(&cart).await;

        assert!(
            matches!(result, Err(CartsServiceError::Expired { .. })),
            "expected Expired, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn clear_proceeds_past_a_held_lease() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.carts.add_first_time(&cart, &sku(1)).await?;
        ctx.store
            .set(&ctx.keys.lease(&cart), "someone-else", Duration::from_secs(60))
            .await?;

        ctx.carts.clear(&cart).await?;

        assert_eq!(
            ctx.store.live_keys(&ctx.keys.cart_prefix(&cart)),
            vec![ctx.keys.lease(&cart)],
            "only the other holder's lease remains"
        );

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_insert_leaves_nothing_behind() -> TestResult {
        let ctx = TestContext::wrapping(|store| {
            Arc::new(FailOnceStore::new(store, FailingCall::HashSet))
        });
        let cart = ctx.carts.create_cart().await?;

        let first = ctx.carts.add_first_time(&cart, &sku(1)).await;

        assert!(
            first.as_ref().is_err_and(CartsServiceError::is_retryable),
            "expected a retryable error, got {first:?}"
        );
        assert!(
            !ctx.store.exists(&ctx.keys.item_index(&cart)).await?,
            "index not written"
        );

        assert_eq!(ctx.carts.add_first_time(&cart, &sku(1)).await?, 1);
        assert_eq!(
            ctx.store.list_range(&ctx.keys.item_index(&cart)).await?,
            vec!["sku-1"]
        );

        time::advance(DEFAULT_CART_TTL + Duration::from_secs(1)).await;
        ctx.store.purge_expired();

        assert!(
            ctx.store.live_keys(&ctx.keys.cart_prefix(&cart)).is_empty(),
            "abandoned session should expire completely"
        );

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn insert_failing_after_quantity_write_is_rolled_back() -> TestResult {
        let ctx = TestContext::wrapping(|store| {
            Arc::new(FailOnceStore::new(store, FailingCall::ListPush))
        });
        let cart = ctx.carts.create_cart().await?;

        let first = ctx.carts.add_first_time(&cart, &sku(1)).await;

        assert!(
            first.as_ref().is_err_and(CartsServiceError::is_retryable),
            "expected a retryable error, got {first:?}"
        );
        assert_eq!(ctx.carts.quantity(&cart, &sku(1)).await?, 0, "quantity rolled back");

        assert_eq!(ctx.carts.add_first_time(&cart, &sku(1)).await?, 1);
        assert_eq!(
            ctx.store.list_range(&ctx.keys.item_index(&cart)).await?,
            vec!["sku-1"]
        );
        assert_eq!(
            ctx.store.ttl(&ctx.keys.quantities(&cart)).await?,
            Some(DEFAULT_CART_TTL)
        );

        Ok(())
    }

    #[tokio::test]
    async fn create_cart_gives_up_when_every_id_is_taken() {
        let mut store = MockKeyValueStore::new();

        store
            .expect_set_if_absent()
            .times(CREATE_ATTEMPTS)
            .returning(|_, _, _| Ok(false));

        let ctx = TestContext::with_store(Arc::new(store));

        let result = ctx.carts.create_cart().await;

        assert!(
            matches!(
                result,
                Err(CartsServiceError::IdCollision {
                    attempts: CREATE_ATTEMPTS
                })
            ),
            "expected IdCollision, got {result:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn held_lease_makes_mutations_busy() -> TestResult {
        let ctx = TestContext::new();
        let cart = ctx.carts.create_cart().await?;

        ctx.store
            .set(&ctx.keys.lease(&cart), "someone-else", Duration::from_secs(60))
            .await?;

        let result = ctx.carts.add_first_time(&cart, &sku(1)).await;

        assert!(
            matches!(&result, Err(CartsServiceError::Busy { cart: c }) if *c == cart),
            "expected Busy, got {result:?}"
        );
        assert!(
            result.as_ref().is_err_and(CartsServiceError::is_retryable),
            "Busy is retryable"
        );
        assert_eq!(ctx.carts.state(&cart).await?, CartState::Empty, "reads need no lease");

        Ok(())
    }

    #[tokio::test]
    async fn store_failures_surface_as_retryable_errors() {
        let mut store = MockKeyValueStore::new();

        store.expect_set_if_absent().returning(|_, _, _| Ok(true));
        store
            .expect_get()
            .returning(|_| Err(StoreError::Timeout(Duration::from_millis(250))));
        store.expect_delete_if_equals().returning(|_, _| Ok(true));

        let ctx = TestContext::with_store(Arc::new(store));
        let cart = ctx.unknown_cart();

        let result = ctx.carts.add_first_time(&cart, &sku(1)).await;

        assert!(
            matches!(result, Err(CartsServiceError::Store(StoreError::Timeout(_)))),
            "expected Store(Timeout), got {result:?}"
        );
        assert!(
            result.as_ref().is_err_and(CartsServiceError::is_retryable),
            "timeouts are retryable"
        );
    }
}
