//! Pure collateralization math.
//!
//! Stateless and side-effect free; every derived figure on a margin
//! snapshot comes from here.

use fastnum::UD256;

/// Collateral value in cash terms: `vault_balance * price`.
pub fn collateral_value(vault_balance: UD256, price: UD256) -> UD256 {
    vault_balance * price
}

/// Collateralization ratio: collateral value over debt.
///
/// Returns `None` while debt is zero; a position without debt has no
/// meaningful ratio.
pub fn collateralization_ratio(
    vault_balance: UD256,
    price: UD256,
    debt: UD256,
) -> Option<UD256> {
    if debt == UD256::ZERO {
        return None;
    }
    Some(collateral_value(vault_balance, price) / debt)
}

/// Additional cash drawable while keeping the position at `safe_ratio`:
/// `collateral_value / safe_ratio - debt`, floored at zero.
pub fn purchasing_power(
    vault_balance: UD256,
    price: UD256,
    debt: UD256,
    safe_ratio: UD256,
) -> UD256 {
    if safe_ratio == UD256::ZERO {
        return UD256::ZERO;
    }
    let max_debt = collateral_value(vault_balance, price) / safe_ratio;
    if max_debt > debt {
        max_debt - debt
    } else {
        UD256::ZERO
    }
}

#[cfg(test)]
mod tests {
    use fastnum::udec256;

    use super::*;

    #[test]
    fn test_collateral_value() {
        assert_eq!(
            collateral_value(udec256!(10), udec256!(200)),
            udec256!(2000)
        );
        assert_eq!(collateral_value(UD256::ZERO, udec256!(200)), UD256::ZERO);
    }

    #[test]
    fn test_collateralization_ratio() {
        // 10 units at 200 backing 1000 debt -> 200% collateralized
        assert_eq!(
            collateralization_ratio(udec256!(10), udec256!(200), udec256!(1000)).unwrap(),
            udec256!(2)
        );
    }

    #[test]
    fn test_collateralization_ratio_undefined_without_debt() {
        assert!(collateralization_ratio(udec256!(10), udec256!(200), UD256::ZERO).is_none());
    }

    #[test]
    fn test_ratio_recomputes_from_inputs() {
        // Price halves, ratio halves; nothing is cached
        let before =
            collateralization_ratio(udec256!(10), udec256!(200), udec256!(1000)).unwrap();
        let after =
            collateralization_ratio(udec256!(10), udec256!(100), udec256!(1000)).unwrap();
        assert_eq!(before, udec256!(2));
        assert_eq!(after, udec256!(1));
    }

    #[test]
    fn test_purchasing_power() {
        // 2000 collateral at safe ratio 2 supports 1000 debt; 400 drawn
        assert_eq!(
            purchasing_power(udec256!(10), udec256!(200), udec256!(400), udec256!(2)),
            udec256!(600)
        );
    }

    #[test]
    fn test_purchasing_power_floors_at_zero() {
        // Debt already above what the safe ratio supports
        assert_eq!(
            purchasing_power(udec256!(10), udec256!(200), udec256!(1500), udec256!(2)),
            UD256::ZERO
        );
    }

    #[test]
    fn test_purchasing_power_zero_safe_ratio() {
        assert_eq!(
            purchasing_power(udec256!(10), udec256!(200), UD256::ZERO, UD256::ZERO),
            UD256::ZERO
        );
    }
}
