use serde::Serialize;
use tracing::{debug, info, warn};

use super::engine::{clamp, option_estimates, quote_for, reconcile};
use super::format::{format_rubles, format_years};
use super::types::{
    Bounds, CollateralChoice, LoanConfiguration, PaymentQuote, ToggleState, Variant, WizardStep,
};
use crate::error::FormError;
use crate::storage::{FlagStore, SHOW_THANKS_KEY};
use crate::submission::SubmissionRecord;

const CONFIGURE_BACKGROUND: &str = "#F3F4F5";
const PLAIN_BACKGROUND: &str = "#FFFFFF";

/// State of one form instance: inputs, wizard position and the submit guard.
///
/// Every mutation funnels through [`FormSession::settle_from`], so the
/// configuration is consistent with the toggles between events.
#[derive(Debug, Clone)]
pub struct FormSession {
    variant: Variant,
    variant_id: String,
    config: LoanConfiguration,
    toggles: ToggleState,
    step: WizardStep,
    loading: bool,
    thanks: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewStep {
    Configure,
    Review,
    Thanks,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionCard {
    pub choice: CollateralChoice,
    pub label: &'static str,
    pub selected: bool,
    pub selectable: bool,
    pub annual_rate: f64,
    pub term_years: u32,
    pub term_display: String,
    pub monthly_payment: f64,
    pub monthly_payment_display: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormView {
    pub step: ViewStep,
    pub loading: bool,
    pub background: &'static str,
    pub variant: Variant,
    pub principal: f64,
    pub principal_display: String,
    pub term_years: u32,
    pub term_display: String,
    pub collateral: CollateralChoice,
    pub collateral_label: &'static str,
    pub toggles: ToggleState,
    pub amount_bounds: Bounds<f64>,
    pub term_bounds: Bounds<u32>,
    pub monthly_payment: f64,
    pub monthly_payment_display: String,
    pub options: Vec<OptionCard>,
}

impl FormSession {
    pub fn new(variant: Variant, variant_id: impl Into<String>, already_submitted: bool) -> Self {
        Self {
            variant,
            variant_id: variant_id.into(),
            config: LoanConfiguration::initial(variant),
            toggles: ToggleState::default(),
            step: WizardStep::Configure,
            loading: false,
            thanks: already_submitted,
        }
    }

    /// Opens a session, starting on the thank-you view when a previous
    /// session already submitted. An unreadable flag counts as unset.
    pub fn restore(variant: Variant, variant_id: impl Into<String>, flags: &dyn FlagStore) -> Self {
        let already_submitted = flags.get(SHOW_THANKS_KEY).unwrap_or_else(|e| {
            warn!(error = %e, "could not read persisted submission flag");
            false
        });
        Self::new(variant, variant_id, already_submitted)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn config(&self) -> LoanConfiguration {
        self.config
    }

    pub fn toggles(&self) -> ToggleState {
        self.toggles
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn shows_thanks(&self) -> bool {
        self.thanks
    }

    pub fn view_step(&self) -> ViewStep {
        match (self.thanks, self.step) {
            (true, _) => ViewStep::Thanks,
            (false, WizardStep::Configure) => ViewStep::Configure,
            (false, WizardStep::Review) => ViewStep::Review,
        }
    }

    pub fn background(&self) -> &'static str {
        match self.view_step() {
            ViewStep::Configure => CONFIGURE_BACKGROUND,
            ViewStep::Review | ViewStep::Thanks => PLAIN_BACKGROUND,
        }
    }

    pub fn amount_bounds(&self) -> Bounds<f64> {
        self.config.collateral.option().amount
    }

    pub fn term_bounds(&self) -> Bounds<u32> {
        self.variant.term_bounds(self.config.collateral)
    }

    /// Quote for the current selection: selected option's rate over the
    /// session term.
    pub fn selected_quote(&self) -> PaymentQuote {
        quote_for(
            self.config.collateral.option(),
            self.config.principal,
            self.config.term_years,
        )
    }

    /// Slider input. Values come from the slider range, so no blur clamp.
    pub fn set_amount(&mut self, value: f64) -> Result<(), FormError> {
        self.ensure_configuring()?;
        if !value.is_finite() || value < 0.0 {
            return Err(FormError::InvalidAmount);
        }
        self.config.principal = value;
        self.settle();
        Ok(())
    }

    /// Typed amount input, reported in kopecks. Left unclamped until blur.
    pub fn set_amount_minor(&mut self, minor: i64) -> Result<(), FormError> {
        if minor < 0 {
            return Err(FormError::InvalidAmount);
        }
        self.set_amount(minor as f64 / 100.0)
    }

    pub fn blur_amount(&mut self) -> Result<(), FormError> {
        self.ensure_configuring()?;
        let bounds = self.amount_bounds();
        self.config.principal = clamp(self.config.principal, bounds.min, bounds.max);
        self.settle();
        Ok(())
    }

    /// Only the fixed-term variant lets the user pick the term.
    pub fn set_term(&mut self, years: u32) -> Result<(), FormError> {
        self.ensure_configuring()?;
        if self.variant == Variant::Collateral {
            return Err(FormError::TermFixed);
        }
        self.config.term_years = years;
        self.settle();
        Ok(())
    }

    pub fn toggle_auto(&mut self) -> Result<(), FormError> {
        let next = ToggleState {
            auto: !self.toggles.auto,
            ..self.toggles
        };
        self.set_toggles(next)
    }

    pub fn toggle_real_estate(&mut self) -> Result<(), FormError> {
        let next = ToggleState {
            real_estate: !self.toggles.real_estate,
            ..self.toggles
        };
        self.set_toggles(next)
    }

    pub fn set_toggles(&mut self, toggles: ToggleState) -> Result<(), FormError> {
        self.ensure_configuring()?;
        let previous = std::mem::replace(&mut self.toggles, toggles);
        self.settle_from(previous);
        Ok(())
    }

    /// Card selection. A card whose toggle is off is not offered, so the
    /// settled choice may differ from the requested one.
    pub fn select_collateral(&mut self, choice: CollateralChoice) -> Result<CollateralChoice, FormError> {
        self.ensure_configuring()?;
        self.config.collateral = choice;
        self.settle();
        if self.config.collateral != choice {
            debug!(
                requested = ?choice,
                settled = ?self.config.collateral,
                "collateral card not offered by toggles"
            );
        }
        Ok(self.config.collateral)
    }

    pub fn proceed(&mut self) -> Result<(), FormError> {
        self.ensure_configuring()?;
        self.step = WizardStep::Review;
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), FormError> {
        self.ensure_reviewing()?;
        self.step = WizardStep::Configure;
        Ok(())
    }

    /// Submit guard: hands out the payload at most once per flow and flips
    /// the session into loading until [`FormSession::complete_submission`].
    pub fn begin_submit(&mut self) -> Result<SubmissionRecord, FormError> {
        self.ensure_reviewing()?;
        self.loading = true;
        let record = SubmissionRecord::new(&self.config, self.variant, &self.variant_id);
        info!(
            collateral = record.chosen_option(),
            principal = %record.principal(),
            "submission started"
        );
        Ok(record)
    }

    /// Finishes a submission attempt regardless of how delivery went.
    /// Returns `false` when the thank-you view was already showing.
    pub fn complete_submission(&mut self, flags: &dyn FlagStore) -> bool {
        self.loading = false;
        if self.thanks {
            return false;
        }
        if let Err(e) = flags.set(SHOW_THANKS_KEY, true) {
            warn!(error = %e, "could not persist submission flag");
        }
        self.thanks = true;
        true
    }

    pub fn view(&self) -> FormView {
        let quote = self.selected_quote();
        let options = option_estimates(self.config.principal)
            .into_iter()
            .map(|estimate| OptionCard {
                choice: estimate.collateral,
                label: estimate.collateral.label(),
                selected: estimate.collateral == self.config.collateral,
                selectable: self.is_selectable(estimate.collateral),
                annual_rate: estimate.annual_rate,
                term_years: estimate.term_years,
                term_display: format!("На {}", format_years(estimate.term_years)),
                monthly_payment: estimate.monthly_payment,
                monthly_payment_display: format_rubles(estimate.monthly_payment),
            })
            .collect();

        FormView {
            step: self.view_step(),
            loading: self.loading,
            background: self.background(),
            variant: self.variant,
            principal: self.config.principal,
            principal_display: format_rubles(self.config.principal),
            term_years: self.config.term_years,
            term_display: format!("На {}", format_years(self.config.term_years)),
            collateral: self.config.collateral,
            collateral_label: self.config.collateral.label(),
            toggles: self.toggles,
            amount_bounds: self.amount_bounds(),
            term_bounds: self.term_bounds(),
            monthly_payment: quote.monthly_payment,
            monthly_payment_display: format_rubles(quote.monthly_payment),
            options,
        }
    }

    fn is_selectable(&self, choice: CollateralChoice) -> bool {
        match choice {
            CollateralChoice::None => true,
            CollateralChoice::Auto => self.toggles.auto,
            CollateralChoice::RealEstate => self.toggles.real_estate,
        }
    }

    fn settle(&mut self) {
        self.settle_from(self.toggles);
    }

    fn settle_from(&mut self, previous: ToggleState) {
        self.config = reconcile(self.config, previous, self.toggles, self.variant);
    }

    fn ensure_active(&self) -> Result<(), FormError> {
        if self.thanks {
            return Err(FormError::AlreadySubmitted);
        }
        if self.loading {
            return Err(FormError::Busy);
        }
        Ok(())
    }

    fn ensure_configuring(&self) -> Result<(), FormError> {
        self.ensure_active()?;
        if self.step != WizardStep::Configure {
            return Err(FormError::NotConfiguring);
        }
        Ok(())
    }

    fn ensure_reviewing(&self) -> Result<(), FormError> {
        self.ensure_active()?;
        if self.step != WizardStep::Review {
            return Err(FormError::NotReviewing);
        }
        Ok(())
    }
}
