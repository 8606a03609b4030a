//! Domain models for subscription-service.

mod advertiser;
mod cascade;
mod history;
mod invoice;
mod payment;
mod plan;
mod refund;
mod subscription;
mod summary;

pub use advertiser::{
    Advertiser, AdvertiserStatus, CoverageType, CreateAdvertiser, CustomerType,
    UpdateBillingSettings,
};
pub use cascade::{CascadeRecord, CascadeStatus, CascadeStep, CascadeStepResult};
pub use history::{ActionType, SubscriptionStatusHistory};
pub use invoice::{Invoice, InvoiceStatus};
pub use payment::{Payment, RecordPayment};
pub use plan::{CreatePlan, Plan, PlanCoverage};
pub use refund::{CreateRefund, Refund, RefundStatus};
pub use subscription::{
    CancellationOutcome, CreateSubscription, CreatedSubscription, DiscountInput, DiscountType,
    GracePeriodExtension, GraceState, InitialPayment, PaymentStatus, Subscription,
    SubscriptionStatus, SubscriptionView, TransitionOutcome,
};
pub use summary::{FinancialSummary, SweepReport};
