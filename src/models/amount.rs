//! Limits for quantities, prices and VAT rates, matching the NUMERIC
//! columns they are stored in. Anything accepted here keeps line math far
//! below `Decimal::MAX`.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub field: &'static str,
    /// Total number of digits.
    pub precision: u32,
    /// Digits after the decimal point.
    pub scale: u32,
}

pub const QUANTITY: Bounds = Bounds { field: "Quantity", precision: 14, scale: 3 };
pub const UNIT_PRICE: Bounds = Bounds { field: "Unit price", precision: 14, scale: 2 };
pub const VAT_RATE: Bounds = Bounds { field: "VAT rate", precision: 5, scale: 2 };

#[derive(Debug, Error, PartialEq)]
pub enum AmountError {
    #[error("{0} cannot be negative")]
    Negative(&'static str),
    #[error("{field} allows at most {scale} decimal places")]
    TooPrecise { field: &'static str, scale: u32 },
    #[error("{field} allows at most {digits} digits before the decimal point")]
    TooLarge { field: &'static str, digits: u32 },
}

impl Bounds {
    pub fn check(&self, value: Decimal) -> Result<(), AmountError> {
        if value < Decimal::ZERO {
            return Err(AmountError::Negative(self.field));
        }
        // trailing zeros do not count: "1.500" is a valid price
        if value.normalize().scale() > self.scale {
            return Err(AmountError::TooPrecise { field: self.field, scale: self.scale });
        }

        let digits = self.precision - self.scale;
        if value.trunc() >= Decimal::from(10_u64.pow(digits)) {
            return Err(AmountError::TooLarge { field: self.field, digits });
        }
        Ok(())
    }
}
