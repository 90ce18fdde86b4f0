//! Packaging calculator: package counts ↔ base quantities.

use rust_decimal::Decimal;
use unitforge_core::RecordId;

use crate::decimal::{NumericInput, checked_div, checked_mul, checked_sub, round_to};
use crate::error::{UomError, UomResult};
use crate::model::{Packaging, PackagingId, UnitRef};
use crate::registry::UnitRegistry;

/// Whole packages plus the base quantity left over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackagingBreakdown {
    pub packages: Decimal,
    pub remainder: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct PackagingCalculator<'r> {
    registry: &'r UnitRegistry,
}

impl<'r> PackagingCalculator<'r> {
    pub fn new(registry: &'r UnitRegistry) -> Self {
        Self { registry }
    }

    /// Packaging linking `base` to `package`.
    pub fn resolve_packaging(
        &self,
        base: impl Into<UnitRef>,
        package: impl Into<UnitRef>,
    ) -> UomResult<&'r Packaging> {
        let base = self.registry.get_unit(&base.into())?;
        let package = self.registry.get_unit(&package.into())?;
        self.registry
            .packaging_between(base.id, package.id)
            .ok_or_else(|| UomError::PackagingNotFound(format!("{} -> {}", base.code, package.code)))
    }

    /// Packagings a host item is sold or stocked in, in assignment order.
    pub fn packagings_for_item(&self, item: RecordId) -> Vec<&'r Packaging> {
        self.registry.packagings_for_item(item)
    }

    /// The item's packaging whose package unit is `package`.
    pub fn item_packaging(&self, item: RecordId, package: impl Into<UnitRef>) -> UomResult<&'r Packaging> {
        let package = self.registry.get_unit(&package.into())?;
        self.packagings_for_item(item)
            .into_iter()
            .find(|p| p.package_unit_id == package.id)
            .ok_or_else(|| UomError::PackagingNotFound(format!("{} for item {item}", package.code)))
    }

    pub fn packaging(&self, id: PackagingId) -> UomResult<&'r Packaging> {
        self.registry
            .packaging(id)
            .ok_or_else(|| UomError::PackagingNotFound(format!("#{id}")))
    }

    /// `packages * quantity`.
    pub fn packages_to_base(
        &self,
        packages: impl Into<NumericInput>,
        packaging: &Packaging,
        precision: Option<u32>,
    ) -> UomResult<Decimal> {
        let packages = packages.into().to_decimal()?;
        let base = checked_mul(packages, per_package(packaging)?)?;
        Ok(round_to(base, precision))
    }

    /// `base_quantity / quantity`.
    ///
    /// Without a precision the result is floored to whole packages (80 units
    /// in cases of 24 is 3 cases, not 3.33). With one, fractional packages are
    /// kept and rounded to that many digits.
    pub fn base_to_packages(
        &self,
        base_quantity: impl Into<NumericInput>,
        packaging: &Packaging,
        precision: Option<u32>,
    ) -> UomResult<Decimal> {
        let base_quantity = base_quantity.into().to_decimal()?;
        let packages = checked_div(base_quantity, per_package(packaging)?)?;
        Ok(match precision {
            None => packages.floor(),
            Some(_) => round_to(packages, precision),
        })
    }

    /// Split a base quantity into whole packages and the loose remainder.
    pub fn breakdown(
        &self,
        base_quantity: impl Into<NumericInput>,
        packaging: &Packaging,
    ) -> UomResult<PackagingBreakdown> {
        let base_quantity = base_quantity.into().to_decimal()?;
        let quantity = per_package(packaging)?;
        let packages = checked_div(base_quantity, quantity)?.floor();
        let remainder = checked_sub(base_quantity, checked_mul(packages, quantity)?)?;
        Ok(PackagingBreakdown { packages, remainder })
    }
}

fn per_package(packaging: &Packaging) -> UomResult<Decimal> {
    if packaging.quantity == 0 {
        return Err(UomError::invalid_definition(format!(
            "packaging #{} has zero quantity",
            packaging.id
        )));
    }
    Ok(Decimal::from(packaging.quantity))
}
