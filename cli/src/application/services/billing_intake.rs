//! Application service: entry points for the billing workflow.
//!
//! Every guard runs before anything is written: a rejected document leaves
//! platform state untouched.

use anyhow::Result;

use crate::application::ports::{Clock, InstanceControl, PlatformStateStore};
use crate::application::services::subscription::{Transition, restart_if_stopped};
use crate::domain::billing::{
    BillingDocument, InstanceCreationRequest, instance_request, renewal_purchase,
    subscription_purchase,
};
use crate::domain::error::{InstanceError, ValidationError};
use crate::domain::platform::PlatformState;
use crate::domain::subscription::Subscription;

/// Stored copy of `incoming`, merged so set-once flags survive resubmission.
fn merged(state: &PlatformState, incoming: BillingDocument) -> BillingDocument {
    match state.documents.get(&incoming.id) {
        Some(stored) => {
            let mut doc = stored.clone();
            doc.absorb(incoming);
            doc
        }
        None => incoming,
    }
}

/// Create a `draft` subscription from a paid customer invoice.
///
/// The subscription is bound to `instance` when given, otherwise to the
/// instance created from the same document, if any. An instance serves one
/// subscription at a time: expired or cancelled subscriptions still bound to
/// it are detached first.
///
/// # Errors
///
/// Any `ValidationError` from the document guards, a document that already
/// produced a subscription, an unknown instance, or an instance another
/// unfinished subscription already holds.
pub async fn create_subscription(
    store: &impl PlatformStateStore,
    clock: &impl Clock,
    document: BillingDocument,
    instance: Option<String>,
) -> Result<Subscription> {
    let _lock = store.lock().await?;
    let mut state = store.load_async().await?;
    let doc = merged(&state, document);
    let purchase = subscription_purchase(&doc)?;

    if let Some(existing) = state
        .subscriptions
        .values()
        .find(|s| s.document.as_deref() == Some(doc.id.as_str()))
    {
        return Err(ValidationError::AlreadyConverted {
            document: doc.name.clone(),
            reference: existing.reference.clone(),
        }
        .into());
    }
    let bound = match instance {
        Some(name) => {
            state.instance(&name)?;
            if let Some(holder) = state.holder_of(&name) {
                return Err(ValidationError::InstanceAlreadyBound {
                    instance: name,
                    reference: holder.reference.clone(),
                }
                .into());
            }
            Some(name)
        }
        None => state
            .instances
            .values()
            .find(|i| i.source_document.as_deref() == Some(doc.id.as_str()))
            .map(|i| i.name.clone())
            .filter(|name| {
                let holder = state.holder_of(name);
                if let Some(holder) = holder {
                    tracing::warn!(
                        instance = %name,
                        holder = %holder.reference,
                        "instance from this document is already held; subscription left unbound"
                    );
                }
                holder.is_none()
            }),
    };
    if let Some(name) = &bound {
        for reference in state.detach_finished(name) {
            tracing::info!(instance = %name, subscription = %reference, "detached finished subscription");
        }
    }

    let reference = state.next_reference(clock.today());
    let mut sub = Subscription::new(reference, purchase.customer.id, purchase.plan);
    sub.document = Some(doc.id.clone());
    sub.instance = bound;
    state.subscriptions.insert(sub.reference.clone(), sub.clone());
    state.documents.insert(doc.id.clone(), doc);
    store.save_async(&state).await?;
    tracing::info!(subscription = %sub.reference, customer = %sub.customer, "created subscription");
    Ok(sub)
}

/// Renew the customer's renewable subscription for the document's plan.
/// A document can drive at most one renewal.
///
/// # Errors
///
/// Document guards, `AlreadyUsedForRenewal`, `NoRenewableSubscription`,
/// `NoDurationConfigured`, or the bound instance failing to start.
pub async fn renew_subscription(
    store: &impl PlatformStateStore,
    clock: &impl Clock,
    instances: &impl InstanceControl,
    document: BillingDocument,
) -> Result<Transition> {
    let lock = store.lock().await?;
    let mut state = store.load_async().await?;
    let mut doc = merged(&state, document);
    let purchase = renewal_purchase(&doc)?;
    let reference = state
        .renewable_for(&purchase.customer.id, &purchase.plan.id)
        .map(|s| s.reference.clone())
        .ok_or_else(|| ValidationError::NoRenewableSubscription {
            customer: purchase.customer.name.clone(),
            plan: purchase.plan.name.clone(),
        })?;

    let sub = state.subscription_mut(&reference)?;
    sub.renew(clock.today(), Some(doc.id.clone()), clock.now())?;
    let subscription = sub.clone();
    doc.renewal_used = true;
    state.documents.insert(doc.id.clone(), doc);
    store.save_async(&state).await?;
    // Starting the instance takes the lock again.
    drop(lock);
    tracing::info!(
        subscription = %reference,
        end = ?subscription.end_date(),
        "renewed subscription from document"
    );

    let instance = restart_if_stopped(instances, &subscription).await?;
    Ok(Transition {
        subscription,
        instance,
    })
}

/// Pre-filled instance creation request for a paid customer invoice.
///
/// # Errors
///
/// Document guards, or an instance already created from this document.
pub async fn instance_from_document(
    store: &impl PlatformStateStore,
    document: BillingDocument,
) -> Result<InstanceCreationRequest> {
    let state = store.load_async().await?;
    let doc = merged(&state, document);
    let request = instance_request(&doc)?;
    if let Some(existing) = state
        .instances
        .values()
        .find(|i| i.source_document.as_deref() == Some(doc.id.as_str()))
    {
        return Err(InstanceError::AlreadyExists(existing.name.clone()).into());
    }
    Ok(request)
}
