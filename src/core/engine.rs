use super::types::{
    COLLATERAL_OPTIONS, CollateralChoice, CollateralOption, LoanConfiguration, PERIODS_PER_YEAR,
    PaymentQuote, ToggleState, Variant,
};

/// Fixed periodic payment of a fully amortizing loan.
///
/// Returns `None` when `total_periods` is zero. A zero rate degrades to the
/// straight-line limit `principal / total_periods`.
pub fn monthly_payment(
    annual_rate: f64,
    periods_per_year: u32,
    total_periods: u32,
    principal: f64,
) -> Option<f64> {
    if total_periods == 0 || periods_per_year == 0 {
        return None;
    }

    let periodic_rate = annual_rate / periods_per_year as f64;
    if periodic_rate == 0.0 {
        return Some(principal / total_periods as f64);
    }

    let discount = (1.0 + periodic_rate).powf(-(total_periods as f64));
    Some((periodic_rate * principal) / (1.0 - discount))
}

pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    min.max(max.min(value))
}

pub fn quote_for(option: &CollateralOption, principal: f64, term_years: u32) -> PaymentQuote {
    let periods = term_years * PERIODS_PER_YEAR;
    debug_assert!(term_years > 0, "quote needs a term of at least one year");
    let payment = monthly_payment(option.annual_rate, PERIODS_PER_YEAR, periods, principal)
        .unwrap_or(0.0);
    let total_paid = payment * periods as f64;

    PaymentQuote {
        collateral: option.choice,
        annual_rate: option.annual_rate,
        principal,
        term_years,
        periods,
        monthly_payment: payment,
        total_paid,
        overpayment: total_paid - principal,
    }
}

/// Estimate shown on each collateral card: the option's own rate over its
/// longest term.
pub fn option_estimates(principal: f64) -> Vec<PaymentQuote> {
    COLLATERAL_OPTIONS
        .iter()
        .map(|option| quote_for(option, principal, option.term_years.max))
        .collect()
}

/// Restores every invariant between the loan configuration and the toggles.
///
/// `previous` holds the toggles before the event being settled. Switching a
/// toggle forces the matching collateral (real estate over auto); any other
/// event only drops a choice its toggle no longer offers, so a card picked
/// among the offered ones sticks. Settling with unchanged toggles is a no-op
/// on an already settled configuration.
pub fn reconcile(
    config: LoanConfiguration,
    previous: ToggleState,
    toggles: ToggleState,
    variant: Variant,
) -> LoanConfiguration {
    let mut next = config;
    let toggled = previous != toggles;

    if next.collateral == CollateralChoice::Auto && !toggles.auto {
        next.collateral = CollateralChoice::None;
    }
    if next.collateral == CollateralChoice::RealEstate && !toggles.real_estate {
        next.collateral = CollateralChoice::None;
    }
    if toggled && toggles.auto && !toggles.real_estate {
        next.collateral = CollateralChoice::Auto;
    }
    if toggled && toggles.real_estate {
        next.collateral = CollateralChoice::RealEstate;
    }

    let amount = next.collateral.option().amount;
    if next.collateral == CollateralChoice::RealEstate && next.principal < amount.min {
        next.principal = amount.min;
    }
    if next.principal > amount.max {
        next.principal = amount.max;
    }

    let term_bounds = variant.term_bounds(next.collateral);
    next.term_years = match variant {
        Variant::Collateral => term_bounds.max,
        Variant::FixedTerm => next.term_years.clamp(term_bounds.min, term_bounds.max),
    };

    next
}
