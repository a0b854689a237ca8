use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{StoryFilter, StoryPart, StoryStore};
use crate::checkout::{CheckoutGateway, CheckoutSessionRequest, PaymentStatus, SessionMetadata};
use crate::config::settings::CheckoutConfig;
use crate::error::{AppError, Result};
use crate::subscription::{LedgerStore, Plan, PlanStore};
use crate::users::{EntitlementState, UserStatus, UserStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementStatus {
    Active,
    None,
}

/// Outcome of a confirmed payment, consumed by the success page.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub user_id: String,
    pub plan: Plan,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatedStory {
    #[serde(flatten)]
    pub story: crate::catalog::Story,
    pub parts: Vec<StoryPart>,
    pub loved: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
}

enum AccessState {
    Active,
    Expired,
    Missing,
}

/// Owner of the subscription purchase/confirmation/expiry state machine:
/// NONE → PENDING (checkout intent issued) → ACTIVE (entitlement window open)
/// → NONE on expiry, cyclically. Nothing else writes the entitlement fields.
pub struct EntitlementManager {
    users: Arc<dyn UserStore>,
    plans: Arc<dyn PlanStore>,
    ledger: Arc<dyn LedgerStore>,
    stories: Arc<dyn StoryStore>,
    gateway: Arc<dyn CheckoutGateway>,
    checkout: CheckoutConfig,
}

impl EntitlementManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        plans: Arc<dyn PlanStore>,
        ledger: Arc<dyn LedgerStore>,
        stories: Arc<dyn StoryStore>,
        gateway: Arc<dyn CheckoutGateway>,
        checkout: CheckoutConfig,
    ) -> Self {
        Self {
            users,
            plans,
            ledger,
            stories,
            gateway,
            checkout,
        }
    }

    /// Opens a checkout intent and returns the hosted-payment redirect URL.
    /// Only the pending session id changes on the user; the entitlement window
    /// is untouched until the gateway confirms payment.
    pub async fn initiate(&self, user_id: &str, plan_id: &str) -> Result<String> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found!".into()))?;
        if user.status != UserStatus::Active {
            return Err(AppError::Forbidden(format!(
                "Your account was {}!",
                user.status.as_str()
            )));
        }

        let now = Utc::now();
        if let Some(expires_at) = user.entitlement.expires_at {
            if expires_at > now {
                return Err(AppError::InvalidState(
                    "Your subscription has not expired yet!".into(),
                ));
            }
        }

        let plan = self
            .plans
            .get_plan(plan_id)
            .await?
            .filter(|p| !p.is_deleted)
            .ok_or_else(|| AppError::NotFound("Plan not found!".into()))?;

        let session = self
            .gateway
            .create_session(CheckoutSessionRequest {
                line_item_name: plan.name.clone(),
                unit_amount_minor: plan.price_minor_units()?,
                success_url: self.checkout.success_url.clone(),
                cancel_url: self.checkout.cancel_url.clone(),
                metadata: SessionMetadata {
                    user_id: user.id.clone(),
                    plan_id: plan.id.clone(),
                },
            })
            .await?;

        // One pending checkout per user; a newer intent abandons the old one.
        self.users
            .set_entitlement(
                &user.id,
                &EntitlementState {
                    plan_id: user.entitlement.plan_id.clone(),
                    expires_at: user.entitlement.expires_at,
                    pending_session_id: Some(session.session_id.clone()),
                },
            )
            .await?;

        Ok(session.redirect_url)
    }

    /// Called from the gateway's success redirect. Every verification step
    /// aborts with no state change; only a fully verified session opens the
    /// entitlement window and appends a ledger row.
    pub async fn confirm(&self, session_id: &str) -> Result<Confirmation> {
        let session = self
            .gateway
            .retrieve_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Checkout session was not found!".into()))?;

        if session.payment_status != PaymentStatus::Paid {
            return Err(AppError::InvalidState("Payment was not completed!".into()));
        }

        let user = self
            .users
            .get_user(&session.metadata.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User was not found!".into()))?;

        // An empty or mismatched pending token means this confirmation is
        // stale or replayed; grant nothing.
        match user.entitlement.pending_session_id.as_deref() {
            Some(pending) if pending == session_id => {}
            _ => {
                return Err(AppError::InvalidState(
                    "No pending checkout matches this session!".into(),
                ));
            }
        }

        let plan = self
            .plans
            .get_plan(&session.metadata.plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Plan was not found!".into()))?;

        let expires_at = Utc::now() + Duration::days(plan.billing.entitlement_days());

        self.users
            .set_entitlement(
                &user.id,
                &EntitlementState {
                    plan_id: Some(plan.id.clone()),
                    expires_at: Some(expires_at),
                    pending_session_id: None,
                },
            )
            .await?;

        self.ledger.append_entry(&user.id, &plan.id).await?;

        Ok(Confirmation {
            user_id: user.id,
            plan,
            expires_at,
        })
    }

    /// Lazy expiry: a past window is cleared here, on the read path; there is
    /// no background sweep.
    pub async fn check(&self, user_id: &str) -> Result<EntitlementStatus> {
        match self.check_access(user_id).await? {
            AccessState::Active => Ok(EntitlementStatus::Active),
            AccessState::Expired | AccessState::Missing => Ok(EntitlementStatus::None),
        }
    }

    async fn check_access(&self, user_id: &str) -> Result<AccessState> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found!".into()))?;

        let now = Utc::now();
        if user.entitlement.is_active_at(now) {
            return Ok(AccessState::Active);
        }
        if user.entitlement.plan_id.is_some() || user.entitlement.expires_at.is_some() {
            // Window closed: drop plan and expiry together, keep any in-flight
            // checkout correlation.
            self.users
                .set_entitlement(
                    user_id,
                    &EntitlementState {
                        plan_id: None,
                        expires_at: None,
                        pending_session_id: user.entitlement.pending_session_id.clone(),
                    },
                )
                .await?;
            return Ok(AccessState::Expired);
        }
        Ok(AccessState::Missing)
    }

    /// Paid-content read: stories matching the filter, each annotated with the
    /// caller's favorite flag and its playable parts.
    pub async fn gated_stories(
        &self,
        user_id: &str,
        filter: &StoryFilter,
        page: i64,
        limit: i64,
    ) -> Result<Vec<GatedStory>> {
        match self.check_access(user_id).await? {
            AccessState::Active => {}
            AccessState::Expired => {
                return Err(AppError::Forbidden("Your subscription has expired!".into()));
            }
            AccessState::Missing => {
                return Err(AppError::Forbidden("Your subscription was not found!".into()));
            }
        }

        let stories = self.stories.list_stories(filter, page, limit).await?;
        let favorites: HashSet<String> =
            self.users.list_favorites(user_id).await?.into_iter().collect();

        let mut out = Vec::with_capacity(stories.len());
        for story in stories {
            let parts = self
                .stories
                .parts_of_story(&story.id)
                .await?
                .into_iter()
                .filter(|p| p.tracks.is_complete())
                .collect();
            let loved = favorites.contains(&story.id);
            out.push(GatedStory {
                story,
                parts,
                loved,
            });
        }
        Ok(out)
    }

    /// Webhook deliveries are acknowledged and logged; the entitlement
    /// decision stays on the success-redirect path.
    pub async fn handle_webhook(&self, event: WebhookEvent) -> Result<()> {
        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let intent_id = event.payment_intent_id.ok_or_else(|| {
                    AppError::InvalidState("Payment intent id not found in event!".into())
                })?;
                let intent = self.gateway.retrieve_payment_intent(&intent_id).await?;
                match intent {
                    Some(intent) => {
                        tracing::info!("checkout completed, intent {} is {}", intent.id, intent.status);
                    }
                    None => {
                        tracing::warn!("checkout completed but intent {} is unknown", intent_id);
                    }
                }
            }
            "checkout.session.async_payment_failed" => {
                tracing::warn!(
                    "async payment failed for session {:?}",
                    event.session_id.as_deref()
                );
            }
            other => {
                tracing::debug!("ignoring webhook event type {}", other);
            }
        }
        Ok(())
    }
}
