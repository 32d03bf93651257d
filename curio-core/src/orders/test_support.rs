//! Scripted gateway and fixtures for engine tests.

use super::{CheckoutCommand, CheckoutOutcome, OrderEngine};
use crate::config::{ConfigStore, MarketplacePolicy};
use crate::entities::order_records::OrderRecord;
use crate::entities::products::ProductRecord;
use crate::entities::users::{AddressRecord, SellerProfile, UserRecord};
use crate::gateway::{
    Charge, ChargeRequest, ChargeSource, ChargeStatus, GatewayError, PaymentGateway, Recipient,
    RecipientRequest, Source, SourceRequest, Transfer, TransferRequest,
};
use crate::store::{InMemoryStore, UserDirectory};
use crate::utils::clock::ManualClock;
use async_trait::async_trait;
use curio_sdk::objects::{CheckoutItem, PaymentSelection};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// How the fake answers the next card charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeBehavior {
    Approve,
    Decline,
    /// Accept the charge but leave it pending, e.g. awaiting 3-D Secure.
    Pending,
    /// Apply the charge but lose the response on the way back.
    LoseResponse,
    /// Never answer; the engine deadline must fire.
    Hang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferBehavior {
    Succeed,
    Reject,
    Hang,
}

struct FakeState {
    charge_behavior: ChargeBehavior,
    transfer_behavior: TransferBehavior,
    /// Charges keyed by idempotency key, like the provider deduplicates them.
    charges: HashMap<String, Charge>,
    charge_calls: usize,
    retrieve_calls: usize,
    last_charge_id: Option<String>,
    transfers: HashMap<String, (Transfer, i64)>,
    transfer_calls: usize,
    marked_sources: Vec<String>,
    recipients: Vec<RecipientRequest>,
    sequence: usize,
}

pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                charge_behavior: ChargeBehavior::Approve,
                transfer_behavior: TransferBehavior::Succeed,
                charges: HashMap::new(),
                charge_calls: 0,
                retrieve_calls: 0,
                last_charge_id: None,
                transfers: HashMap::new(),
                transfer_calls: 0,
                marked_sources: Vec::new(),
                recipients: Vec::new(),
                sequence: 0,
            }),
        }
    }

    pub fn set_charge_behavior(&self, behavior: ChargeBehavior) {
        self.state.lock().unwrap().charge_behavior = behavior;
    }

    pub fn set_transfer_behavior(&self, behavior: TransferBehavior) {
        self.state.lock().unwrap().transfer_behavior = behavior;
    }

    pub fn charge_calls(&self) -> usize {
        self.state.lock().unwrap().charge_calls
    }

    pub fn retrieve_calls(&self) -> usize {
        self.state.lock().unwrap().retrieve_calls
    }

    /// Id of the most recently created charge, answered or not.
    pub fn last_charge_id(&self) -> Option<String> {
        self.state.lock().unwrap().last_charge_id.clone()
    }

    /// Distinct charges the provider holds.
    pub fn charge_count(&self) -> usize {
        self.state.lock().unwrap().charges.len()
    }

    pub fn transfer_calls(&self) -> usize {
        self.state.lock().unwrap().transfer_calls
    }

    /// Amounts of the distinct transfers the provider executed.
    pub fn transfer_amounts(&self) -> Vec<i64> {
        let state = self.state.lock().unwrap();
        state.transfers.values().map(|(_, amount)| *amount).collect()
    }

    pub fn marked_sources(&self) -> Vec<String> {
        self.state.lock().unwrap().marked_sources.clone()
    }

    pub fn recipients(&self) -> Vec<RecipientRequest> {
        self.state.lock().unwrap().recipients.clone()
    }

    /// Simulate the buyer paying a charge outside the engine.
    pub fn settle_charge(&self, charge_id: &str) {
        let mut state = self.state.lock().unwrap();
        for charge in state.charges.values_mut() {
            if charge.id == charge_id {
                charge.paid = true;
                charge.status = ChargeStatus::Successful;
            }
        }
    }

    /// Simulate a pending charge failing outside the engine.
    pub fn fail_charge(&self, charge_id: &str) {
        let mut state = self.state.lock().unwrap();
        for charge in state.charges.values_mut() {
            if charge.id == charge_id {
                charge.status = ChargeStatus::Failed;
                charge.failure_message = Some("authentication failed".to_string());
            }
        }
    }

    /// Store a new charge under its idempotency key.
    fn record_charge(state: &mut FakeState, key: String, charge: Charge) -> Charge {
        state.last_charge_id = Some(charge.id.clone());
        state.charges.insert(key, charge.clone());
        charge
    }

    fn next_id(state: &mut FakeState, prefix: &str) -> String {
        state.sequence += 1;
        format!("{prefix}_test_{}", state.sequence)
    }
}

async fn hang() -> GatewayError {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    GatewayError::Timeout
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_charge(&self, req: ChargeRequest) -> Result<Charge, GatewayError> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            state.charge_calls += 1;
            if let Some(existing) = state.charges.get(&req.idempotency_key) {
                return Ok(existing.clone());
            }
            state.charge_behavior
        };
        if let ChargeSource::Source(source_id) = &req.source {
            let mut state = self.state.lock().unwrap();
            let id = Self::next_id(&mut state, "chrg");
            let charge = Charge {
                qr_image_url: Some(format!("https://qr.example/{id}.png")),
                id,
                status: ChargeStatus::Pending,
                paid: false,
                source_id: Some(source_id.clone()),
                failure_message: None,
                order_id: Some(req.order_id),
            };
            return Ok(Self::record_charge(&mut state, req.idempotency_key, charge));
        }
        if behavior == ChargeBehavior::Hang {
            return Err(hang().await);
        }
        let mut state = self.state.lock().unwrap();
        let (status, paid, failure_message) = match behavior {
            ChargeBehavior::Decline => (
                ChargeStatus::Failed,
                false,
                Some("insufficient funds".to_string()),
            ),
            ChargeBehavior::Pending => (ChargeStatus::Pending, false, None),
            _ => (ChargeStatus::Successful, true, None),
        };
        let charge = Charge {
            id: Self::next_id(&mut state, "chrg"),
            status,
            paid,
            source_id: None,
            qr_image_url: None,
            failure_message,
            order_id: Some(req.order_id),
        };
        let charge = Self::record_charge(&mut state, req.idempotency_key, charge);
        if behavior == ChargeBehavior::LoseResponse {
            state.charge_behavior = ChargeBehavior::Approve;
            return Err(GatewayError::Transport("connection reset".to_string()));
        }
        Ok(charge)
    }

    async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.retrieve_calls += 1;
        state
            .charges
            .values()
            .find(|c| c.id == charge_id)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                code: "not_found".to_string(),
                message: format!("charge {charge_id} was not found"),
            })
    }

    async fn create_source(&self, _req: SourceRequest) -> Result<Source, GatewayError> {
        let mut state = self.state.lock().unwrap();
        Ok(Source {
            id: Self::next_id(&mut state, "src"),
            qr_image_url: None,
        })
    }

    async fn mark_source_paid(&self, source_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.marked_sources.push(source_id.to_string());
        for charge in state.charges.values_mut() {
            if charge.source_id.as_deref() == Some(source_id) {
                charge.paid = true;
                charge.status = ChargeStatus::Successful;
            }
        }
        Ok(())
    }

    async fn create_transfer(&self, req: TransferRequest) -> Result<Transfer, GatewayError> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            state.transfer_calls += 1;
            if let Some((existing, _)) = state.transfers.get(&req.idempotency_key) {
                return Ok(existing.clone());
            }
            state.transfer_behavior
        };
        match behavior {
            TransferBehavior::Hang => Err(hang().await),
            TransferBehavior::Reject => Err(GatewayError::Api {
                status: 400,
                code: "failed_transfer".to_string(),
                message: "recipient cannot receive transfers".to_string(),
            }),
            TransferBehavior::Succeed => {
                let mut state = self.state.lock().unwrap();
                let transfer = Transfer {
                    id: Self::next_id(&mut state, "trsf"),
                };
                state
                    .transfers
                    .insert(req.idempotency_key, (transfer.clone(), req.amount_minor));
                Ok(transfer)
            }
        }
    }

    async fn create_recipient(&self, req: RecipientRequest) -> Result<Recipient, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.recipients.push(req);
        Ok(Recipient {
            id: Self::next_id(&mut state, "recp"),
            verified: false,
        })
    }
}

/// 2026-03-01 10:00:00 UTC
pub fn start_time() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_772_359_200).unwrap()
}

pub fn card(token: &str) -> PaymentSelection {
    PaymentSelection::Card {
        token: token.to_string(),
    }
}

pub struct Harness {
    pub engine: OrderEngine,
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub clock: Arc<ManualClock>,
    pub buyer: Uuid,
    pub seller: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(MarketplacePolicy {
            sandbox: true,
            ..MarketplacePolicy::default()
        })
    }

    pub fn with_policy(policy: MarketplacePolicy) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(FakeGateway::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let engine = OrderEngine::from_store(store.clone(), gateway.clone(), ConfigStore::new(policy))
            .with_clock(clock.clone());
        let mut harness = Self {
            engine,
            store,
            gateway,
            clock,
            buyer: Uuid::nil(),
            seller: Uuid::nil(),
        };
        harness.buyer = harness.add_user("Malee", "Srisuk");
        harness.seller = harness.add_user("Somchai", "Jaidee");
        harness
    }

    /// Add a user with one default address.
    pub fn add_user(&self, first_name: &str, last_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store.add_user(UserRecord {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: format!("{}@example.com", first_name.to_lowercase()),
        });
        self.store.add_address(AddressRecord {
            id: Uuid::new_v4(),
            user_id: id,
            name: format!("{first_name} {last_name}"),
            phone: "0812345678".to_string(),
            line: "99/1 Sukhumvit Rd".to_string(),
            subdistrict: "Khlong Toei Nuea".to_string(),
            district: "Watthana".to_string(),
            province: "Bangkok".to_string(),
            zipcode: "10110".to_string(),
            is_default: true,
        });
        id
    }

    pub fn list_product(&self, seller_id: Uuid, price: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.store.add_product(ProductRecord {
            id,
            seller_id,
            name: format!("Vintage figure {price}"),
            price: Decimal::from(price),
            sold: false,
            reserved_by: None,
        });
        id
    }

    pub fn command(
        &self,
        buyer_id: Uuid,
        products: &[Uuid],
        payment: PaymentSelection,
    ) -> CheckoutCommand {
        CheckoutCommand {
            buyer_id,
            items: products
                .iter()
                .map(|&product_id| CheckoutItem {
                    product_id,
                    quantity: None,
                })
                .collect(),
            address_id: None,
            payment,
        }
    }

    pub async fn promptpay_checkout(&self, products: &[Uuid]) -> CheckoutOutcome {
        self.engine
            .checkout(self.command(self.buyer, products, PaymentSelection::PromptPay))
            .await
            .unwrap()
    }

    /// A PromptPay order for one product, confirmed and now `pending`.
    pub async fn pending_order(&self, price: i64) -> OrderRecord {
        let product = self.list_product(self.seller, price);
        let outcome = self.promptpay_checkout(&[product]).await;
        self.engine
            .confirm_promptpay_payment(outcome.order.id)
            .await
            .unwrap()
    }

    /// A pending order that the seller has already shipped.
    pub async fn shipped_order(&self, price: i64) -> OrderRecord {
        let order = self.pending_order(price).await;
        self.engine
            .submit_tracking(
                order.id,
                self.seller,
                curio_sdk::objects::TrackingUpdate {
                    tracking_number: "TH12345678AB".to_string(),
                    sender_name: "Somchai Jaidee".to_string(),
                },
            )
            .await
            .unwrap()
    }

    pub async fn verify_seller(&self) {
        self.store
            .insert_seller_profile(SellerProfile {
                user_id: self.seller,
                recipient_id: "recp_test_seller".to_string(),
                bank_brand: "kbank".to_string(),
                account_number: "1234567890".to_string(),
                account_name: "Somchai Jaidee".to_string(),
                verified: true,
                created_at: start_time(),
            })
            .await
            .unwrap();
    }
}
