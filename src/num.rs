use alloy::primitives::{I256, U256};
use fastnum::{
    UD256, bint,
    decimal::{Context, Decimal, RoundingMode, UnsignedDecimal},
};

/// Seconds in a (non-leap) year, used to annualize per-second rates.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Decimals of the RAY fixed-point format used by rate accumulators.
pub const RAY_DECIMALS: u8 = 27;

/// Fixed-point to decimal converter.
///
/// On the way to on-chain integers amounts are truncated toward zero,
/// no fractional wei is ever produced.
#[derive(Clone, Copy, Debug, Default)]
pub struct Converter {
    decimals: i32,
}

impl Converter {
    pub fn new(decimals: u8) -> Self {
        Self {
            decimals: decimals as i32,
        }
    }

    pub fn from_unsigned<const N: usize>(&self, value: U256) -> UnsignedDecimal<N> {
        let unscaled = bint::UInt::<N>::from_le_slice(value.as_le_slice())
            .expect("Converter: U256 -> UInt::<N>");
        UnsignedDecimal::<N>::from_parts(
            unscaled,
            -self.decimals,
            Context::default().with_rounding_mode(RoundingMode::Down),
        )
    }

    pub fn from_signed<const N: usize>(&self, value: I256) -> Decimal<N> {
        let unscaled = bint::UInt::<N>::from_le_slice(value.unsigned_abs().as_le_slice())
            .expect("Converter: abs(I256) -> UInt::<N>");
        Decimal::<N>::from_parts(
            unscaled,
            -self.decimals,
            match value.sign() {
                alloy::primitives::Sign::Negative => fastnum::decimal::Sign::Minus,
                alloy::primitives::Sign::Positive => fastnum::decimal::Sign::Plus,
            },
            Context::default().with_rounding_mode(RoundingMode::Down),
        )
    }

    pub fn to_unsigned<const N: usize>(&self, value: UnsignedDecimal<N>) -> U256 {
        let rescaled = value
            .with_rounding_mode(RoundingMode::Down)
            .rescale(self.decimals as i16);
        U256::from_le_slice(rescaled.digits().to_radix_le(256).as_slice())
    }

    pub fn to_signed<const N: usize>(&self, value: Decimal<N>) -> I256 {
        let rescaled = value
            .with_rounding_mode(RoundingMode::Down)
            .rescale(self.decimals as i16);
        let mut res = I256::try_from_le_slice(rescaled.digits().to_radix_le(256).as_slice())
            .unwrap_or_default();
        if value.is_negative() {
            res = res.saturating_neg();
        }
        res
    }
}

/// Formats an amount for display at the given precision,
/// truncating excess fractional digits.
pub fn format_amount(value: UD256, precision: u8) -> String {
    value.rescale(precision as i16).to_string()
}

/// Annualizes a per-second RAY-scaled rate accumulator:
/// `(raw / 1e27) ^ seconds-per-year - 1`.
pub fn annualized_rate(raw_per_second: U256) -> UD256 {
    let per_second: UD256 = Converter::new(RAY_DECIMALS).from_unsigned(raw_per_second);
    let compounded = pow(per_second, SECONDS_PER_YEAR);
    if compounded > UD256::ONE {
        compounded - UD256::ONE
    } else {
        UD256::ZERO
    }
}

/// Binary exponentiation over unsigned decimals.
fn pow(base: UD256, mut exp: u64) -> UD256 {
    let mut result = UD256::ONE;
    let mut acc = base;
    while exp > 0 {
        if exp & 1 == 1 {
            result *= acc;
        }
        exp >>= 1;
        if exp > 0 {
            acc *= acc;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use fastnum::{dec256, udec256};

    use super::*;

    #[test]
    fn test_converter_from_unsigned() {
        assert_eq!(
            Converter::new(0).from_unsigned(U256::from(1234567890)),
            udec256!(1234567890)
        );
        assert_eq!(
            Converter::new(6).from_unsigned(U256::from(1234567890)),
            udec256!(1234.56789)
        );
        assert_eq!(
            Converter::new(18).from_unsigned(U256::from(1_500_000_000_000_000_000u64)),
            udec256!(1.5)
        );
    }

    #[test]
    fn test_converter_from_signed() {
        assert_eq!(
            Converter::new(6).from_signed(I256::try_from(-1234567890).unwrap()),
            dec256!(-1234.56789)
        );
        assert_eq!(
            Converter::new(6).from_signed(I256::try_from(1234567890).unwrap()),
            dec256!(1234.56789)
        );
    }

    #[test]
    fn test_converter_to_unsigned_truncates_toward_zero() {
        // No fractional wei: digits below the token precision are dropped
        assert_eq!(
            Converter::new(2).to_unsigned(udec256!(1.239)),
            U256::from(123)
        );
        assert_eq!(
            Converter::new(6).to_unsigned(udec256!(1234.56789)),
            U256::from(1234567890)
        );
        // Dropped digits never round the kept ones up
        assert_eq!(
            Converter::new(2).to_unsigned(udec256!(1.995)),
            U256::from(199)
        );
        assert_eq!(Converter::new(0).to_unsigned(udec256!(0.9)), U256::ZERO);
    }

    #[test]
    fn test_converter_to_signed_truncates_toward_zero() {
        assert_eq!(
            Converter::new(2).to_signed(dec256!(-1.239)),
            I256::try_from(-123).unwrap()
        );
        assert_eq!(
            Converter::new(2).to_signed(dec256!(1.995)),
            I256::try_from(199).unwrap()
        );
    }

    #[test]
    fn test_round_trip_idempotent_at_precision() {
        let converter = Converter::new(18);
        let value = udec256!(170.25);
        let raw = converter.to_unsigned(value);
        let back: UD256 = converter.from_unsigned(raw);
        assert_eq!(format_amount(back, 2), format_amount(value, 2));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(udec256!(200), 2), "200.00");
        assert_eq!(format_amount(udec256!(0), 2), "0.00");
        assert_eq!(format_amount(udec256!(175), 2), "175.00");
        assert_eq!(format_amount(udec256!(1.5), 4), "1.5000");
    }

    #[test]
    fn test_annualized_rate_zero_for_one() {
        // A per-second accumulator of exactly 1.0 compounds to no interest
        let one_ray = U256::from(10u64).pow(U256::from(27u64));
        assert_eq!(annualized_rate(one_ray), UD256::ZERO);
    }

    #[test]
    fn test_annualized_rate_positive() {
        // 1.000000001 per second compounds to roughly 3.2% per year
        let raw = U256::from(10u64).pow(U256::from(27u64)) + U256::from(10u64).pow(U256::from(18u64));
        let fee = annualized_rate(raw);
        assert!(fee > udec256!(0.031) && fee < udec256!(0.033));
    }

    #[test]
    fn test_pow() {
        assert_eq!(pow(udec256!(2), 10), udec256!(1024));
        assert_eq!(pow(udec256!(7), 0), UD256::ONE);
        assert_eq!(pow(udec256!(1), 31536000), UD256::ONE);
    }
}
