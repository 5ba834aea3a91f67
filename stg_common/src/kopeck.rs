use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const RUB_CURRENCY_CODE: &str = "RUB";
pub const RUB_CURRENCY_CODE_LOWER: &str = "rub";

//--------------------------------------      Kopeck       -----------------------------------------------------------
/// A monetary amount in minor units (kopecks). All prices and totals in the store are carried as `Kopeck` so that
/// arithmetic stays exact.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Kopeck(i64);

op!(binary Kopeck, Add, add);
op!(binary Kopeck, Sub, sub);
op!(inplace Kopeck, SubAssign, sub_assign);
op!(unary Kopeck, Neg, neg);

impl Mul<i64> for Kopeck {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Kopeck {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in kopecks: {0}")]
pub struct KopeckConversionError(String);

impl From<i64> for Kopeck {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Kopeck {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Kopeck {}

impl TryFrom<u64> for Kopeck {
    type Error = KopeckConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(KopeckConversionError(format!("Value {} is too large to convert to Kopeck", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Kopeck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 % 100 == 0 {
            write!(f, "{}₽", self.0 / 100)
        } else {
            let rub = self.0 as f64 / 100.0;
            write!(f, "{rub:0.2}₽")
        }
    }
}

impl Kopeck {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_rubles(rubles: i64) -> Self {
        Self(rubles * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}
