//! Baseline reference dataset.
//!
//! Common SI and imperial units, the conversions between them, a handful of
//! compound rates and densities, count packagings and two unit groups. Used
//! to bootstrap a fresh database and as the fixture for the engine's own
//! tests.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::UomResult;
use crate::model::{
    Alias, CompoundComponent, CompoundUnit, CompoundUnitId, Conversion, ConversionId, Direction,
    Packaging, PackagingId, Unit, UnitGroup, UnitGroupId, UnitId, UnitType, UnitTypeId,
};
use crate::registry::{UnitRegistry, UnitRegistryBuilder};

pub const MASS: UnitTypeId = UnitTypeId(1);
pub const LENGTH: UnitTypeId = UnitTypeId(2);
pub const TIME: UnitTypeId = UnitTypeId(3);
pub const VOLUME: UnitTypeId = UnitTypeId(4);
pub const TEMPERATURE: UnitTypeId = UnitTypeId(5);
pub const COUNT: UnitTypeId = UnitTypeId(6);
pub const VELOCITY: UnitTypeId = UnitTypeId(7);
pub const DENSITY: UnitTypeId = UnitTypeId(8);

pub const KG: UnitId = UnitId(1);
pub const G: UnitId = UnitId(2);
pub const LB: UnitId = UnitId(3);
pub const M: UnitId = UnitId(10);
pub const KM: UnitId = UnitId(11);
pub const CM: UnitId = UnitId(12);
pub const MI: UnitId = UnitId(16);
pub const S: UnitId = UnitId(20);
pub const H: UnitId = UnitId(22);
pub const L: UnitId = UnitId(30);
pub const C: UnitId = UnitId(41);
pub const EA: UnitId = UnitId(50);
pub const DZ: UnitId = UnitId(51);
pub const CS: UnitId = UnitId(52);

const TYPES: &[(UnitTypeId, &str, &str)] = &[
    (MASS, "Mass", "mass"),
    (LENGTH, "Length", "length"),
    (TIME, "Time", "time"),
    (VOLUME, "Volume", "volume"),
    (TEMPERATURE, "Temperature", "temperature"),
    (COUNT, "Count", "count"),
    (VELOCITY, "Velocity", "velocity"),
    (DENSITY, "Density", "density"),
];

// (id, code, name, type, symbol, is_base)
const UNITS: &[(i64, &str, &str, UnitTypeId, &str, bool)] = &[
    (1, "KG", "Kilogram", MASS, "kg", true),
    (2, "G", "Gram", MASS, "g", false),
    (3, "LB", "Pound", MASS, "lb", false),
    (4, "OZ", "Ounce", MASS, "oz", false),
    (5, "T", "Metric tonne", MASS, "t", false),
    (10, "M", "Meter", LENGTH, "m", true),
    (11, "KM", "Kilometer", LENGTH, "km", false),
    (12, "CM", "Centimeter", LENGTH, "cm", false),
    (13, "MM", "Millimeter", LENGTH, "mm", false),
    (14, "FT", "Foot", LENGTH, "ft", false),
    (15, "IN", "Inch", LENGTH, "in", false),
    (16, "MI", "Mile", LENGTH, "mi", false),
    (20, "S", "Second", TIME, "s", true),
    (21, "MIN", "Minute", TIME, "min", false),
    (22, "H", "Hour", TIME, "h", false),
    (23, "D", "Day", TIME, "d", false),
    (30, "L", "Liter", VOLUME, "L", true),
    (31, "ML", "Milliliter", VOLUME, "mL", false),
    (32, "GAL", "US gallon", VOLUME, "gal", false),
    (40, "K", "Kelvin", TEMPERATURE, "K", true),
    (41, "C", "Degree Celsius", TEMPERATURE, "°C", false),
    (42, "F", "Degree Fahrenheit", TEMPERATURE, "°F", false),
    (50, "EA", "Each", COUNT, "ea", true),
    (51, "DZ", "Dozen", COUNT, "dz", false),
    (52, "CS", "Case", COUNT, "cs", false),
];

// (unit, alias, preferred)
const ALIASES: &[(i64, &str, bool)] = &[
    (1, "kilogram", true),
    (1, "kilo", false),
    (1, "kgs", false),
    (2, "gram", true),
    (3, "pound", true),
    (3, "lbs", false),
    (4, "ounce", true),
    (5, "tonne", true),
    (10, "meter", true),
    (10, "metre", false),
    (11, "kilometer", true),
    (12, "centimeter", true),
    (14, "foot", true),
    (14, "feet", false),
    (15, "inch", true),
    (16, "mile", true),
    (20, "second", true),
    (20, "sec", false),
    (21, "minute", true),
    (22, "hour", true),
    (22, "hr", false),
    (23, "day", true),
    (30, "liter", true),
    (30, "litre", false),
    (31, "milliliter", true),
    (32, "gallon", true),
    (40, "kelvin", true),
    (41, "celsius", true),
    (42, "fahrenheit", true),
    (50, "each", true),
    (50, "pc", false),
    (50, "pcs", false),
    (51, "dozen", true),
];

fn conversions() -> Vec<(i64, UnitId, UnitId, Decimal, Decimal)> {
    vec![
        // mass
        (1, KG, G, dec!(1000), Decimal::ZERO),
        (2, KG, LB, dec!(2.20462262185), Decimal::ZERO),
        (3, LB, UnitId(4), dec!(16), Decimal::ZERO),
        (4, UnitId(5), KG, dec!(1000), Decimal::ZERO),
        // length
        (10, KM, M, dec!(1000), Decimal::ZERO),
        (11, M, CM, dec!(100), Decimal::ZERO),
        (12, M, UnitId(13), dec!(1000), Decimal::ZERO),
        (13, UnitId(14), UnitId(15), dec!(12), Decimal::ZERO),
        (14, UnitId(15), CM, dec!(2.54), Decimal::ZERO),
        (15, MI, UnitId(14), dec!(5280), Decimal::ZERO),
        (16, MI, KM, dec!(1.609344), Decimal::ZERO),
        (17, UnitId(14), M, dec!(0.3048), Decimal::ZERO),
        // time
        (20, H, UnitId(21), dec!(60), Decimal::ZERO),
        (21, UnitId(21), S, dec!(60), Decimal::ZERO),
        (22, UnitId(23), H, dec!(24), Decimal::ZERO),
        (23, H, S, dec!(3600), Decimal::ZERO),
        // volume
        (30, L, UnitId(31), dec!(1000), Decimal::ZERO),
        (31, UnitId(32), L, dec!(3.785411784), Decimal::ZERO),
        // temperature (affine)
        (40, C, UnitId(40), dec!(1), dec!(273.15)),
        (41, C, UnitId(42), dec!(1.8), dec!(32)),
        // count
        (50, DZ, EA, dec!(12), Decimal::ZERO),
        (51, CS, EA, dec!(24), Decimal::ZERO),
    ]
}

// (id, name, members)
const GROUPS: &[(i64, &str, &[UnitId])] = &[
    (1, "Metric", &[KG, G, M, KM, CM, L]),
    (2, "Imperial", &[LB, MI]),
];

// (id, name, symbol, type, components)
fn compounds() -> Vec<(i64, &'static str, &'static str, UnitTypeId, Vec<(UnitId, i32)>)> {
    vec![
        (1, "kilometers per hour", "km/h", VELOCITY, vec![(KM, 1), (H, -1)]),
        (2, "meters per second", "m/s", VELOCITY, vec![(M, 1), (S, -1)]),
        (3, "miles per hour", "mph", VELOCITY, vec![(MI, 1), (H, -1)]),
        (4, "kilograms per cubic meter", "kg/m3", DENSITY, vec![(KG, 1), (M, -3)]),
        (5, "grams per liter", "g/L", DENSITY, vec![(G, 1), (L, -1)]),
        (6, "grams per cubic centimeter", "g/cm3", DENSITY, vec![(G, 1), (CM, -3)]),
    ]
}

/// Builder preloaded with the baseline dataset, for callers that want to add
/// their own rows on top.
pub fn baseline_builder() -> UnitRegistryBuilder {
    let mut b = UnitRegistry::builder();

    for (id, name, slug) in TYPES {
        b.add_type(UnitType {
            id: *id,
            name: name.to_string(),
            slug: slug.to_string(),
            description: None,
        });
    }

    for (id, code, name, type_id, symbol, is_base) in UNITS {
        b.add_unit(Unit {
            id: UnitId(*id),
            code: code.to_string(),
            name: name.to_string(),
            type_id: *type_id,
            symbol: Some(symbol.to_string()),
            is_base: *is_base,
            metadata: None,
        });
    }

    for (unit_id, alias, is_preferred) in ALIASES {
        b.add_alias(Alias {
            unit_id: UnitId(*unit_id),
            alias: alias.to_string(),
            is_preferred: *is_preferred,
        });
    }

    for (id, source, target, factor, offset) in conversions() {
        b.add_conversion(Conversion {
            id: ConversionId(id),
            source_unit_id: source,
            target_unit_id: target,
            factor,
            offset,
            direction: Direction::Both,
            is_linear: offset.is_zero(),
        });
    }

    for (id, name, symbol, type_id, components) in compounds() {
        b.add_compound(CompoundUnit {
            id: CompoundUnitId(id),
            name: name.to_string(),
            symbol: Some(symbol.to_string()),
            type_id,
            components: components
                .into_iter()
                .map(|(unit_id, exponent)| CompoundComponent { unit_id, exponent })
                .collect(),
        });
    }

    b.add_packaging(Packaging {
        id: PackagingId(1),
        base_unit_id: EA,
        package_unit_id: DZ,
        quantity: 12,
        label: Some("Dozen".to_string()),
    })
    .add_packaging(Packaging {
        id: PackagingId(2),
        base_unit_id: EA,
        package_unit_id: CS,
        quantity: 24,
        label: Some("Case of 24".to_string()),
    });

    for (id, name, units) in GROUPS {
        b.add_group(UnitGroup {
            id: UnitGroupId(*id),
            name: name.to_string(),
            description: None,
            unit_ids: units.to_vec(),
        });
    }

    b
}

pub fn baseline() -> UomResult<UnitRegistry> {
    baseline_builder().build()
}
