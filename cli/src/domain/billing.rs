//! Billing documents handed in by the invoicing workflow, and the guards that
//! decide whether a document may create or renew a subscription.

use serde::{Deserialize, Serialize};

use crate::domain::error::ValidationError;
use crate::domain::instance::suggested_name;
use crate::domain::subscription::Plan;

/// Document type of a customer sales invoice.
pub const CUSTOMER_INVOICE: &str = "out_invoice";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentLine {
    pub description: String,
    /// Present when the line sells a subscription plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillingDocument {
    pub id: String,
    pub name: String,
    pub move_type: String,
    #[serde(default)]
    pub paid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub lines: Vec<DocumentLine>,
    /// Set once a renewal has been driven by this document. Never cleared.
    #[serde(default)]
    pub renewal_used: bool,
}

impl BillingDocument {
    /// Merge a freshly submitted copy with the stored one. The set-once
    /// renewal flag survives even if the new copy omits it.
    pub fn absorb(&mut self, incoming: Self) {
        let used = self.renewal_used || incoming.renewal_used;
        *self = incoming;
        self.renewal_used = used;
    }
}

/// What a valid document resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPurchase {
    pub customer: Customer,
    pub plan: Plan,
}

/// Pre-filled instance creation request derived from a paid document.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceCreationRequest {
    pub name: String,
    pub customer: String,
    pub document: String,
}

fn paid_customer_invoice(doc: &BillingDocument) -> Result<&Customer, ValidationError> {
    if doc.move_type != CUSTOMER_INVOICE {
        return Err(ValidationError::NotCustomerInvoice(doc.move_type.clone()));
    }
    if !doc.paid {
        return Err(ValidationError::NotPaid(doc.name.clone()));
    }
    doc.customer
        .as_ref()
        .ok_or_else(|| ValidationError::NoCustomer(doc.name.clone()))
}

/// Guard for creating a subscription from `doc`.
///
/// # Errors
///
/// Returns the first failing `ValidationError`: wrong document type, unpaid,
/// no customer, zero or several plan lines, plan without a duration.
pub fn subscription_purchase(doc: &BillingDocument) -> Result<PlanPurchase, ValidationError> {
    let customer = paid_customer_invoice(doc)?;
    let plans: Vec<&Plan> = doc.lines.iter().filter_map(|l| l.plan.as_ref()).collect();
    let plan = match plans.as_slice() {
        [] => return Err(ValidationError::NoPlanLine(doc.name.clone())),
        [plan] => *plan,
        many => {
            return Err(ValidationError::MultiplePlanLines {
                document: doc.name.clone(),
                count: many.len(),
            });
        }
    };
    if plan.duration.is_none() {
        return Err(ValidationError::PlanWithoutDuration(plan.name.clone()));
    }
    Ok(PlanPurchase {
        customer: customer.clone(),
        plan: plan.clone(),
    })
}

/// Guard for renewing from `doc`: the purchase guard plus single use.
///
/// # Errors
///
/// Same as [`subscription_purchase`], plus `AlreadyUsedForRenewal`.
pub fn renewal_purchase(doc: &BillingDocument) -> Result<PlanPurchase, ValidationError> {
    if doc.renewal_used {
        return Err(ValidationError::AlreadyUsedForRenewal(doc.name.clone()));
    }
    subscription_purchase(doc)
}

/// Guard for creating an instance from `doc`.
///
/// # Errors
///
/// Wrong document type, unpaid, or no customer.
pub fn instance_request(doc: &BillingDocument) -> Result<InstanceCreationRequest, ValidationError> {
    let customer = paid_customer_invoice(doc)?;
    Ok(InstanceCreationRequest {
        name: suggested_name(&customer.name, &doc.name),
        customer: customer.id.clone(),
        document: doc.id.clone(),
    })
}
