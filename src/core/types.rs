use serde::{Deserialize, Serialize};

pub const PERIODS_PER_YEAR: u32 = 12;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollateralChoice {
    #[default]
    None,
    Auto,
    RealEstate,
}

impl CollateralChoice {
    pub const ALL: [CollateralChoice; 3] = [
        CollateralChoice::None,
        CollateralChoice::Auto,
        CollateralChoice::RealEstate,
    ];

    /// Vocabulary used by the analytics collector.
    pub fn analytics_code(self) -> &'static str {
        match self {
            CollateralChoice::None => "nothing",
            CollateralChoice::Auto => "auto",
            CollateralChoice::RealEstate => "property",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CollateralChoice::None => "Без залога",
            CollateralChoice::Auto => "Авто",
            CollateralChoice::RealEstate => "Недвижимость",
        }
    }

    pub fn option(self) -> &'static CollateralOption {
        match self {
            CollateralChoice::None => &COLLATERAL_OPTIONS[0],
            CollateralChoice::Auto => &COLLATERAL_OPTIONS[1],
            CollateralChoice::RealEstate => &COLLATERAL_OPTIONS[2],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: Copy + PartialOrd> Bounds<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralOption {
    pub choice: CollateralChoice,
    pub amount: Bounds<f64>,
    pub term_years: Bounds<u32>,
    pub annual_rate: f64,
}

pub static COLLATERAL_OPTIONS: [CollateralOption; 3] = [
    CollateralOption {
        choice: CollateralChoice::None,
        amount: Bounds::new(30_000.0, 7_500_000.0),
        term_years: Bounds::new(1, 5),
        annual_rate: 0.339,
    },
    CollateralOption {
        choice: CollateralChoice::Auto,
        amount: Bounds::new(30_000.0, 7_500_000.0),
        term_years: Bounds::new(1, 5),
        annual_rate: 0.27,
    },
    CollateralOption {
        choice: CollateralChoice::RealEstate,
        amount: Bounds::new(500_000.0, 30_000_000.0),
        term_years: Bounds::new(1, 15),
        annual_rate: 0.2807,
    },
];

pub const FIXED_TERM_YEARS: Bounds<u32> = Bounds::new(1, 5);

/// Product variant of the landing form. Decides where the term bounds come
/// from and which identifier the analytics payload carries.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Term follows the selected collateral and is pinned to the option's
    /// longest term.
    #[default]
    Collateral,
    /// One global term range regardless of collateral.
    FixedTerm,
}

impl Variant {
    pub fn default_id(self) -> &'static str {
        match self {
            Variant::Collateral => "ghk_5478_2",
            Variant::FixedTerm => "ghk_5478_1",
        }
    }

    pub fn term_bounds(self, choice: CollateralChoice) -> Bounds<u32> {
        match self {
            Variant::Collateral => choice.option().term_years,
            Variant::FixedTerm => FIXED_TERM_YEARS,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleState {
    pub auto: bool,
    pub real_estate: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanConfiguration {
    pub principal: f64,
    pub term_years: u32,
    pub collateral: CollateralChoice,
}

impl LoanConfiguration {
    pub fn initial(variant: Variant) -> Self {
        let collateral = CollateralChoice::None;
        Self {
            principal: 1_000_000.0,
            term_years: variant.term_bounds(collateral).max,
            collateral,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardStep {
    #[default]
    Configure,
    Review,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQuote {
    pub collateral: CollateralChoice,
    pub annual_rate: f64,
    pub principal: f64,
    pub term_years: u32,
    pub periods: u32,
    pub monthly_payment: f64,
    pub total_paid: f64,
    pub overpayment: f64,
}
