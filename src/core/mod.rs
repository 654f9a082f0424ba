mod engine;
pub mod format;
mod session;
mod types;

pub use engine::{clamp, monthly_payment, option_estimates, quote_for, reconcile};
pub use session::{FormSession, FormView, OptionCard, ViewStep};
pub use types::{
    Bounds, COLLATERAL_OPTIONS, CollateralChoice, CollateralOption, FIXED_TERM_YEARS,
    LoanConfiguration, PERIODS_PER_YEAR, PaymentQuote, ToggleState, Variant, WizardStep,
};
