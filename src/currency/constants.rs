//! Supported currencies, their display rules and the country mapping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::LicenseError;

/// How a converted price is rounded before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingStrategy {
    /// `floor(x) + 0.99`
    Point99,
    /// `floor(x) + 0.95`
    Point95,
    /// `.99` below 100, `x99` below 1000, `x999` above
    Whole99,
    /// Nearest integer
    Whole,
    /// Nearest multiple of 100
    Hundred,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CurrencyCode {
    USD,
    EUR,
    GBP,
    EGP,
    SAR,
    AED,
    KWD,
    QAR,
    MAD,
    BRL,
    MXN,
    ARS,
    COP,
    CLP,
    INR,
    TRY,
}

/// Display and rounding rules for one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyInfo {
    pub code: CurrencyCode,
    pub symbol: &'static str,
    pub name: &'static str,
    /// Decimal places shown when formatting
    pub decimals: u32,
    pub rounding: RoundingStrategy,
}

const fn info(
    code: CurrencyCode,
    symbol: &'static str,
    name: &'static str,
    decimals: u32,
    rounding: RoundingStrategy,
) -> CurrencyInfo {
    CurrencyInfo {
        code,
        symbol,
        name,
        decimals,
        rounding,
    }
}

use CurrencyCode::*;
use RoundingStrategy::*;

pub const CURRENCIES: [CurrencyInfo; 16] = [
    info(USD, "$", "US Dollar", 2, Point99),
    info(EUR, "€", "Euro", 2, Point99),
    info(GBP, "£", "British Pound", 2, Point99),
    info(EGP, "E£", "Egyptian Pound", 2, Point99),
    info(SAR, "SR", "Saudi Riyal", 2, Point95),
    info(AED, "AED", "UAE Dirham", 2, Point95),
    info(KWD, "KD", "Kuwaiti Dinar", 3, Point99),
    info(QAR, "QR", "Qatari Riyal", 2, Point95),
    info(MAD, "MAD", "Moroccan Dirham", 2, Point99),
    info(BRL, "R$", "Brazilian Real", 2, Whole99),
    info(MXN, "MX$", "Mexican Peso", 2, Whole99),
    info(ARS, "ARS$", "Argentine Peso", 2, Whole),
    info(COP, "COP$", "Colombian Peso", 0, Hundred),
    info(CLP, "CLP$", "Chilean Peso", 0, Hundred),
    info(INR, "₹", "Indian Rupee", 2, Whole99),
    info(TRY, "₺", "Turkish Lira", 2, Point99),
];

/// ISO 3166-1 alpha-2 country to currency. Countries not listed use USD.
const COUNTRY_TO_CURRENCY: &[(&str, CurrencyCode)] = &[
    // North America
    ("US", USD),
    ("CA", USD),
    ("MX", MXN),
    // Eurozone
    ("AT", EUR),
    ("BE", EUR),
    ("CY", EUR),
    ("EE", EUR),
    ("FI", EUR),
    ("FR", EUR),
    ("DE", EUR),
    ("GR", EUR),
    ("IE", EUR),
    ("IT", EUR),
    ("LV", EUR),
    ("LT", EUR),
    ("LU", EUR),
    ("MT", EUR),
    ("NL", EUR),
    ("PT", EUR),
    ("SK", EUR),
    ("SI", EUR),
    ("ES", EUR),
    ("GB", GBP),
    // Middle East and North Africa
    ("EG", EGP),
    ("SA", SAR),
    ("AE", AED),
    ("KW", KWD),
    ("QA", QAR),
    ("MA", MAD),
    ("BH", USD),
    ("OM", USD),
    ("JO", USD),
    ("LB", USD),
    // Latin America
    ("BR", BRL),
    ("AR", ARS),
    ("CO", COP),
    ("CL", CLP),
    ("PE", USD),
    ("VE", USD),
    ("EC", USD),
    ("UY", USD),
    // Asia
    ("IN", INR),
    ("TR", TRY),
];

impl CurrencyCode {
    pub fn info(&self) -> &'static CurrencyInfo {
        // CURRENCIES is declared in enum order.
        &CURRENCIES[*self as usize]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            USD => "USD",
            EUR => "EUR",
            GBP => "GBP",
            EGP => "EGP",
            SAR => "SAR",
            AED => "AED",
            KWD => "KWD",
            QAR => "QAR",
            MAD => "MAD",
            BRL => "BRL",
            MXN => "MXN",
            ARS => "ARS",
            COP => "COP",
            CLP => "CLP",
            INR => "INR",
            TRY => "TRY",
        }
    }

    pub fn all() -> impl Iterator<Item = CurrencyCode> {
        CURRENCIES.iter().map(|c| c.code)
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = LicenseError;

    /// Case-insensitive parse of a supported currency code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        CurrencyCode::all()
            .find(|c| c.as_str() == upper)
            .ok_or_else(|| LicenseError::UnsupportedCurrency(s.to_string()))
    }
}

/// Currency shown to visitors from `country_code`, USD when unmapped.
pub fn currency_for_country(country_code: &str) -> CurrencyCode {
    let upper = country_code.trim().to_ascii_uppercase();
    COUNTRY_TO_CURRENCY
        .iter()
        .find(|(country, _)| *country == upper)
        .map(|(_, currency)| *currency)
        .unwrap_or(USD)
}

pub fn is_supported_currency(code: &str) -> bool {
    code.parse::<CurrencyCode>().is_ok()
}

/// Sanitize a user-supplied currency preference, falling back to USD.
pub fn validate_currency_preference(currency: Option<&str>) -> CurrencyCode {
    currency
        .and_then(|c| c.parse::<CurrencyCode>().ok())
        .unwrap_or(USD)
}

/// Format an amount with the currency symbol, grouped thousands and the
/// currency's fixed number of decimals (`$1,299.99`, `COP$120,000`).
pub fn format_currency(amount: f64, currency: CurrencyCode) -> String {
    let info = currency.info();
    format!("{}{}", info.symbol, group_thousands(amount, info.decimals))
}

fn group_thousands(amount: f64, decimals: u32) -> String {
    let fixed = format!("{:.*}", decimals as usize, amount.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && fixed.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_in_enum_order() {
        for (i, info) in CURRENCIES.iter().enumerate() {
            assert_eq!(info.code as usize, i);
        }
        assert_eq!(CurrencyCode::all().count(), 16);
    }

    #[test]
    fn rounding_rules_per_currency() {
        assert_eq!(SAR.info().rounding, Point95);
        assert_eq!(KWD.info().decimals, 3);
        assert_eq!(INR.info().rounding, Whole99);
        assert_eq!(COP.info().rounding, Hundred);
        assert_eq!(COP.info().decimals, 0);
        assert_eq!(ARS.info().rounding, Whole);
    }

    #[test]
    fn country_mapping_falls_back_to_usd() {
        assert_eq!(currency_for_country("EG"), EGP);
        assert_eq!(currency_for_country("de"), EUR);
        assert_eq!(currency_for_country("CA"), USD);
        assert_eq!(currency_for_country("JP"), USD);
        assert_eq!(currency_for_country(""), USD);
    }

    #[test]
    fn parse_and_preference() {
        assert_eq!("sar".parse::<CurrencyCode>().unwrap(), SAR);
        assert!(matches!(
            "JPY".parse::<CurrencyCode>(),
            Err(LicenseError::UnsupportedCurrency(_))
        ));
        assert!(is_supported_currency("try"));
        assert_eq!(validate_currency_preference(Some("eur")), EUR);
        assert_eq!(validate_currency_preference(Some("XYZ")), USD);
        assert_eq!(validate_currency_preference(None), USD);
    }

    #[test]
    fn format_groups_thousands_with_fixed_decimals() {
        assert_eq!(format_currency(1299.99, USD), "$1,299.99");
        assert_eq!(format_currency(29.0, USD), "$29.00");
        assert_eq!(format_currency(120000.0, COP), "COP$120,000");
        assert_eq!(format_currency(9.99, KWD), "KD9.990");
        assert_eq!(format_currency(999.0, INR), "₹999.00");
        assert_eq!(format_currency(1234567.5, EUR), "€1,234,567.50");
    }

    #[test]
    fn serializes_as_code() {
        assert_eq!(serde_json::to_string(&SAR).unwrap(), "\"SAR\"");
        assert_eq!(serde_json::to_string(&Whole99).unwrap(), "\"whole99\"");
    }
}
