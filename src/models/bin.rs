use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Bin status enumeration
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum BinStatus {
    Active,
    Full,
    Blocked,
    Maintenance,
}

/// Explicit status change requests; the only way a bin's status moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum BinStatusChange {
    Block,
    Reactivate,
    #[strum(serialize = "Mark Full")]
    MarkFull,
    Maintenance,
}

impl BinStatusChange {
    pub fn target(&self) -> BinStatus {
        match self {
            BinStatusChange::Block => BinStatus::Blocked,
            BinStatusChange::Reactivate => BinStatus::Active,
            BinStatusChange::MarkFull => BinStatus::Full,
            BinStatusChange::Maintenance => BinStatus::Maintenance,
        }
    }
}

/// Storage zone; the declaration order is the pick priority.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum ZoneType {
    Picking,
    Stocking,
    Staging,
    Receiving,
    Return,
    Defective,
}

impl ZoneType {
    /// Lower picks first.
    pub fn pick_priority(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinCoordinates {
    pub aisle: String,
    pub rack: String,
    pub shelf: String,
    pub level: String,
}

impl BinCoordinates {
    pub fn new(
        aisle: impl Into<String>,
        rack: impl Into<String>,
        shelf: impl Into<String>,
        level: impl Into<String>,
    ) -> Self {
        Self {
            aisle: aisle.into(),
            rack: rack.into(),
            shelf: shelf.into(),
            level: level.into(),
        }
    }

    /// `aisle-rack-shelf-level`, skipping empty parts.
    pub fn code(&self) -> String {
        [&self.aisle, &self.rack, &self.shelf, &self.level]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinDimensions {
    pub length: Option<Decimal>,
    pub width: Option<Decimal>,
    pub height: Option<Decimal>,
}

impl BinDimensions {
    /// Zero unless all three dimensions are known.
    pub fn volume(&self) -> Decimal {
        match (self.length, self.width, self.height) {
            (Some(l), Some(w), Some(h)) => l * w * h,
            _ => Decimal::ZERO,
        }
    }
}

/// A physical storage slot inside a warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub id: Uuid,
    pub code: String,
    pub warehouse: String,
    pub coordinates: BinCoordinates,
    pub zone_type: ZoneType,
    dimensions: BinDimensions,
    volume: Decimal,
    pub max_weight: Option<Decimal>,
    status: BinStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bin {
    /// Creates an Active bin whose code is derived from its coordinates.
    pub fn new(
        warehouse: impl Into<String>,
        coordinates: BinCoordinates,
        zone_type: ZoneType,
    ) -> Result<Self, ServiceError> {
        let warehouse = warehouse.into();
        if warehouse.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Warehouse is required for a bin".to_string(),
            ));
        }
        if coordinates.aisle.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Aisle is required to derive a bin code".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            code: coordinates.code(),
            warehouse,
            coordinates,
            zone_type,
            dimensions: BinDimensions::default(),
            volume: Decimal::ZERO,
            max_weight: None,
            status: BinStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn status(&self) -> BinStatus {
        self.status
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    pub fn dimensions(&self) -> &BinDimensions {
        &self.dimensions
    }

    pub fn is_blocked(&self) -> bool {
        self.status == BinStatus::Blocked
    }

    pub fn with_dimensions(mut self, length: Decimal, width: Decimal, height: Decimal) -> Self {
        self.set_dimensions(BinDimensions {
            length: Some(length),
            width: Some(width),
            height: Some(height),
        });
        self
    }

    /// Replaces the dimensions and recomputes the volume.
    pub fn set_dimensions(&mut self, dimensions: BinDimensions) {
        self.dimensions = dimensions;
        self.volume = self.dimensions.volume();
        self.updated_at = Utc::now();
    }

    pub fn set_length(&mut self, length: Option<Decimal>) {
        let dims = BinDimensions {
            length,
            ..self.dimensions.clone()
        };
        self.set_dimensions(dims);
    }

    pub fn set_width(&mut self, width: Option<Decimal>) {
        let dims = BinDimensions {
            width,
            ..self.dimensions.clone()
        };
        self.set_dimensions(dims);
    }

    pub fn set_height(&mut self, height: Option<Decimal>) {
        let dims = BinDimensions {
            height,
            ..self.dimensions.clone()
        };
        self.set_dimensions(dims);
    }

    /// Applies an explicit status change request.
    pub fn request_status_change(&mut self, change: BinStatusChange) -> Result<BinStatus, ServiceError> {
        let target = change.target();
        if self.status == target {
            return Err(ServiceError::ValidationError(format!(
                "Bin {} is already {}",
                self.code, target
            )));
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(target)
    }

    /// Sort key used by the pick-route optimizer.
    pub fn location_key(&self) -> (NaturalKey, NaturalKey, NaturalKey, NaturalKey) {
        (
            NaturalKey::new(&self.coordinates.aisle),
            NaturalKey::new(&self.coordinates.rack),
            NaturalKey::new(&self.coordinates.shelf),
            NaturalKey::new(&self.coordinates.level),
        )
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Number(String),
    Text(String),
}

// Equality follows the ordering so that "01" and "1" name the same aisle.
impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Segment {}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Number(a), Segment::Number(b)) => {
                let a = a.trim_start_matches('0');
                let b = b.trim_start_matches('0');
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
            (Segment::Number(_), Segment::Text(_)) => Ordering::Less,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders mixed alpha-numeric labels so that `A2 < A10`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalKey(Vec<Segment>);

impl NaturalKey {
    pub fn new(label: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut in_digits = false;

        for ch in label.trim().chars() {
            let is_digit = ch.is_ascii_digit();
            if !current.is_empty() && is_digit != in_digits {
                segments.push(Self::segment(std::mem::take(&mut current), in_digits));
            }
            in_digits = is_digit;
            current.extend(ch.to_lowercase());
        }
        if !current.is_empty() {
            segments.push(Self::segment(current, in_digits));
        }

        NaturalKey(segments)
    }

    fn segment(raw: String, digits: bool) -> Segment {
        if digits {
            Segment::Number(raw)
        } else {
            Segment::Text(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bin(aisle: &str, rack: &str) -> Bin {
        Bin::new("WH-1", BinCoordinates::new(aisle, rack, "1", "A"), ZoneType::Picking).unwrap()
    }

    #[test]
    fn code_is_derived_from_coordinates() {
        let b = Bin::new(
            "WH-1",
            BinCoordinates::new("A01", "R02", "S3", "L4"),
            ZoneType::Stocking,
        )
        .unwrap();
        assert_eq!(b.code, "A01-R02-S3-L4");
        assert_eq!(b.status(), BinStatus::Active);
    }

    #[test]
    fn code_skips_missing_parts() {
        let coords = BinCoordinates::new("A01", "R02", "", "");
        assert_eq!(coords.code(), "A01-R02");
    }

    #[test]
    fn aisle_is_required() {
        let result = Bin::new("WH-1", BinCoordinates::default(), ZoneType::Picking);
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn volume_tracks_every_dimension_change() {
        let mut b = bin("1", "1").with_dimensions(dec!(2), dec!(3), dec!(4));
        assert_eq!(b.volume(), dec!(24));

        b.set_height(Some(dec!(10)));
        assert_eq!(b.volume(), dec!(60));

        b.set_width(None);
        assert_eq!(b.volume(), Decimal::ZERO);

        b.set_width(Some(dec!(0.5)));
        assert_eq!(b.volume(), dec!(10));
    }

    #[test]
    fn status_changes_are_explicit() {
        let mut b = bin("1", "1");
        assert_eq!(
            b.request_status_change(BinStatusChange::Block).unwrap(),
            BinStatus::Blocked
        );
        assert!(b.is_blocked());

        let again = b.request_status_change(BinStatusChange::Block);
        assert!(matches!(again, Err(ServiceError::ValidationError(_))));

        b.request_status_change(BinStatusChange::Reactivate).unwrap();
        b.request_status_change(BinStatusChange::MarkFull).unwrap();
        assert_eq!(b.status(), BinStatus::Full);
    }

    #[test]
    fn natural_key_orders_numbers_by_value() {
        assert!(NaturalKey::new("A2") < NaturalKey::new("A10"));
        assert!(NaturalKey::new("2") < NaturalKey::new("10"));
        assert_eq!(
            NaturalKey::new("07").cmp(&NaturalKey::new("7")),
            Ordering::Equal
        );
        assert_eq!(
            NaturalKey::new("a1").cmp(&NaturalKey::new("A1")),
            Ordering::Equal
        );
        assert!(NaturalKey::new("B1") > NaturalKey::new("A9"));
    }

    #[test]
    fn natural_key_equality_ignores_leading_zeros() {
        assert_eq!(NaturalKey::new("01"), NaturalKey::new("1"));
        assert_eq!(NaturalKey::new("A007"), NaturalKey::new("a7"));
        assert_ne!(NaturalKey::new("10"), NaturalKey::new("1"));
    }

    #[test]
    fn zone_priority_follows_declaration_order() {
        assert!(ZoneType::Picking.pick_priority() < ZoneType::Stocking.pick_priority());
        assert!(ZoneType::Receiving.pick_priority() < ZoneType::Defective.pick_priority());
    }
}
