//! `microsaas subscription`: subscription lifecycle and billing intake.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use crate::app::AppContext;
use crate::application::ports::{Clock, PlatformStateStore};
use crate::application::services::queries::{
    DEFAULT_PAGE_SIZE, all_subscriptions, customer_page, subscription_status,
};
use crate::application::services::subscription::{self as service, Transition};
use crate::application::services::billing_intake;

/// Subscription subcommands.
#[derive(Subcommand)]
pub enum SubscriptionCommand {
    /// Create a draft subscription from a paid customer invoice
    FromDocument {
        /// Billing document (JSON)
        document: PathBuf,
        /// Bind to this instance instead of the one created from the document
        #[arg(long)]
        instance: Option<String>,
    },
    /// Renew the customer's subscription for the document's plan
    RenewFromDocument {
        /// Billing document (JSON)
        document: PathBuf,
    },
    /// Activate a draft subscription and start its instance
    Activate { reference: String },
    /// Cancel a subscription and stop its instance
    Cancel { reference: String },
    /// Extend by one plan period
    Renew { reference: String },
    /// Show one subscription
    Show { reference: String },
    /// List renewal history
    Renewals { reference: String },
    /// List subscriptions
    List {
        /// Only this customer's subscriptions (cancelled ones hidden)
        #[arg(long)]
        customer: Option<String>,
        /// Page number, from 1
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
}

/// Run the subscription command.
pub async fn run(app: &AppContext, cmd: SubscriptionCommand) -> Result<ExitCode> {
    match cmd {
        SubscriptionCommand::FromDocument { document, instance } => {
            let doc = super::read_document(&document)?;
            let sub =
                billing_intake::create_subscription(&app.state_store, &app.clock, doc, instance)
                    .await?;
            show(app, &sub.reference).await
        }
        SubscriptionCommand::RenewFromDocument { document } => {
            let doc = super::read_document(&document)?;
            let reporter = app.reporter();
            let supervisor = app.supervisor(&reporter);
            let transition =
                billing_intake::renew_subscription(&app.state_store, &app.clock, &supervisor, doc)
                    .await?;
            finish(app, &transition).await
        }
        SubscriptionCommand::Activate { reference } => {
            let reporter = app.reporter();
            let supervisor = app.supervisor(&reporter);
            let transition =
                service::activate(&app.state_store, &app.clock, &supervisor, &reference).await?;
            finish(app, &transition).await
        }
        SubscriptionCommand::Cancel { reference } => {
            let reporter = app.reporter();
            let supervisor = app.supervisor(&reporter);
            let transition = service::cancel(&app.state_store, &supervisor, &reference).await?;
            finish(app, &transition).await
        }
        SubscriptionCommand::Renew { reference } => {
            let reporter = app.reporter();
            let supervisor = app.supervisor(&reporter);
            let transition =
                service::renew(&app.state_store, &app.clock, &supervisor, &reference).await?;
            finish(app, &transition).await
        }
        SubscriptionCommand::Show { reference } => show(app, &reference).await,
        SubscriptionCommand::Renewals { reference } => {
            let state = app.state_store.load_async().await?;
            app.renderer().renewals(state.subscription(&reference)?)?;
            Ok(ExitCode::SUCCESS)
        }
        SubscriptionCommand::List {
            customer,
            page,
            page_size,
        } => {
            let state = app.state_store.load_async().await?;
            let today = app.clock.today();
            match customer {
                Some(customer) => {
                    let page = customer_page(
                        &state,
                        &customer,
                        page,
                        page_size,
                        &app.policy.endpoint,
                        today,
                    );
                    app.renderer().customer_page(&page)?;
                }
                None => {
                    let list = all_subscriptions(&state, &app.policy.endpoint, today);
                    app.renderer().subscriptions(&list)?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn finish(app: &AppContext, transition: &Transition) -> Result<ExitCode> {
    if let Some((name, state)) = &transition.instance {
        app.output.info(&format!("Instance {name} is now {state}"));
    }
    show(app, &transition.subscription.reference).await
}

async fn show(app: &AppContext, reference: &str) -> Result<ExitCode> {
    let state = app.state_store.load_async().await?;
    let status = subscription_status(
        &state,
        state.subscription(reference)?,
        &app.policy.endpoint,
        app.clock.today(),
    );
    app.renderer().subscription(&status)?;
    Ok(ExitCode::SUCCESS)
}
