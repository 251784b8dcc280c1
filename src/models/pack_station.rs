use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::ledger::{LedgerDocumentKind, LedgerDocumentRef, LedgerLine, LedgerPayload, LedgerRequest};
use super::{OperationKind, TransitionRecord};
use crate::errors::ServiceError;
use crate::external::OrderLine;
use crate::workflow::{require_lines, TransitionRule, Workflow};

const DEFAULT_PACKAGE_TYPE: &str = "Box";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum PackStationStatus {
    Draft,
    Packing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum PackStationTransition {
    #[strum(serialize = "Start Packing")]
    StartPacking,
    #[strum(serialize = "Complete Packing")]
    CompletePacking,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum PackLineStatus {
    Pending,
    Packed,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum PackageStatus {
    Open,
    Sealed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackLine {
    pub id: Uuid,
    pub item_code: String,
    pub barcode: Option<String>,
    pub uom: Option<String>,
    pub ordered_qty: Decimal,
    packed_qty: Decimal,
    pub package_no: Option<u32>,
    pub batch_no: Option<String>,
    pub row_status: PackLineStatus,
}

impl PackLine {
    pub fn new(item_code: impl Into<String>, ordered_qty: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_code: item_code.into(),
            barcode: None,
            uom: None,
            ordered_qty,
            packed_qty: Decimal::ZERO,
            package_no: None,
            batch_no: None,
            row_status: PackLineStatus::Pending,
        }
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    pub fn packed_qty(&self) -> Decimal {
        self.packed_qty
    }

    pub fn remaining_qty(&self) -> Decimal {
        self.ordered_qty - self.packed_qty
    }

    fn matches(&self, code: &str) -> bool {
        self.item_code == code || self.barcode.as_deref() == Some(code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub package_no: u32,
    pub package_type: String,
    gross_weight: Option<Decimal>,
    row_status: PackageStatus,
}

impl Package {
    fn open(package_no: u32) -> Self {
        Self {
            package_no,
            package_type: DEFAULT_PACKAGE_TYPE.to_string(),
            gross_weight: None,
            row_status: PackageStatus::Open,
        }
    }

    pub fn gross_weight(&self) -> Option<Decimal> {
        self.gross_weight
    }

    pub fn status(&self) -> PackageStatus {
        self.row_status
    }

    pub fn is_open(&self) -> bool {
        self.row_status == PackageStatus::Open
    }
}

/// Result of a successful scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub item_code: String,
    pub package_no: u32,
    pub packed_qty: Decimal,
    pub remaining_qty: Decimal,
}

/// Scan-to-verify packing of one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackStation {
    pub id: Uuid,
    pub sales_order: Option<String>,
    pub customer: Option<String>,
    pub warehouse: Option<String>,
    pub packer: Option<String>,
    status: PackStationStatus,
    pub items: Vec<PackLine>,
    packages: Vec<Package>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    history: Vec<TransitionRecord>,
    documents: Vec<LedgerDocumentRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PackStation {
    pub fn new(warehouse: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sales_order: None,
            customer: None,
            warehouse,
            packer: None,
            status: PackStationStatus::Draft,
            items: Vec::new(),
            packages: Vec::new(),
            started_at: None,
            completed_at: None,
            history: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_order(mut self, sales_order: impl Into<String>, customer: Option<String>) -> Self {
        self.sales_order = Some(sales_order.into());
        self.customer = customer;
        self
    }

    pub fn with_line(mut self, line: PackLine) -> Self {
        self.items.push(line);
        self
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn documents(&self) -> &[LedgerDocumentRef] {
        &self.documents
    }

    pub fn total_to_pack(&self) -> Decimal {
        self.items.iter().map(|l| l.ordered_qty).sum()
    }

    pub fn total_packed(&self) -> Decimal {
        self.items.iter().map(|l| l.packed_qty).sum()
    }

    pub fn total_weight(&self) -> Decimal {
        self.packages.iter().filter_map(|p| p.gross_weight).sum()
    }

    fn ensure_open(&self) -> Result<(), ServiceError> {
        if self.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "Pack station {} is {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Replaces the lines with the linked sales order's lines.
    pub fn load_order_lines(&mut self, lines: Vec<OrderLine>) -> Result<(), ServiceError> {
        if self.status != PackStationStatus::Draft {
            return Err(ServiceError::InvalidState(format!(
                "Order lines can only be loaded on Draft pack stations, not {}",
                self.status
            )));
        }
        self.items = lines
            .into_iter()
            .map(|line| PackLine {
                uom: line.uom,
                barcode: line.barcode,
                ..PackLine::new(line.item_code, line.qty)
            })
            .collect();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Opens the next sequential package.
    pub fn add_package(&mut self) -> Result<u32, ServiceError> {
        self.ensure_open()?;
        let next = self.packages.len() as u32 + 1;
        self.packages.push(Package::open(next));
        self.updated_at = Utc::now();
        Ok(next)
    }

    fn package_mut(&mut self, package_no: u32) -> Result<&mut Package, ServiceError> {
        self.packages
            .iter_mut()
            .find(|p| p.package_no == package_no)
            .ok_or_else(|| ServiceError::NotFound(format!("Package {}", package_no)))
    }

    pub fn seal_package(&mut self, package_no: u32) -> Result<(), ServiceError> {
        self.ensure_open()?;
        let package = self.package_mut(package_no)?;
        if !package.is_open() {
            return Err(ServiceError::ValidationError(format!(
                "Package {} is already sealed",
                package_no
            )));
        }
        package.row_status = PackageStatus::Sealed;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_package_weight(&mut self, package_no: u32, weight: Decimal) -> Result<(), ServiceError> {
        self.ensure_open()?;
        if weight.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "Package weight cannot be negative".to_string(),
            ));
        }
        let package = self.package_mut(package_no)?;
        if !package.is_open() {
            return Err(ServiceError::ValidationError(format!(
                "Package {} is sealed and cannot be changed",
                package_no
            )));
        }
        package.gross_weight = Some(weight);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Packs `qty` units matching a barcode or item code into the current open package.
    pub fn scan(&mut self, code: &str, qty: Decimal) -> Result<ScanOutcome, ServiceError> {
        if self.status != PackStationStatus::Packing {
            return Err(ServiceError::InvalidState(format!(
                "Pack station is not in Packing status ({})",
                self.status
            )));
        }
        if qty <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Scan quantity must be positive".to_string(),
            ));
        }

        let index = match self
            .items
            .iter()
            .position(|l| l.matches(code) && l.remaining_qty() > Decimal::ZERO)
        {
            Some(index) => index,
            None => {
                return Err(match self.items.iter().find(|l| l.matches(code)) {
                    Some(line) => {
                        ServiceError::OverScan(format!("Item {} is fully packed", line.item_code))
                    }
                    None => ServiceError::NotFound(format!("Barcode {} not found in items", code)),
                });
            }
        };

        let remaining = self.items[index].remaining_qty();
        if qty > remaining {
            return Err(ServiceError::OverScan(format!(
                "Scanned {} of {} but only {} remaining",
                qty, self.items[index].item_code, remaining
            )));
        }

        let package_no = self
            .packages
            .iter()
            .find(|p| p.is_open())
            .map(|p| p.package_no)
            .ok_or_else(|| {
                ServiceError::ValidationError("No open package. Add a new package first.".to_string())
            })?;

        let line = &mut self.items[index];
        line.packed_qty += qty;
        line.package_no = Some(package_no);
        if line.remaining_qty().is_zero() {
            line.row_status = PackLineStatus::Packed;
        }
        let outcome = ScanOutcome {
            item_code: line.item_code.clone(),
            package_no,
            packed_qty: line.packed_qty,
            remaining_qty: line.remaining_qty(),
        };
        self.updated_at = Utc::now();
        Ok(outcome)
    }

    fn packed_lines(&self) -> impl Iterator<Item = &PackLine> + '_ {
        self.items.iter().filter(|l| l.packed_qty > Decimal::ZERO)
    }
}

impl Workflow for PackStation {
    type Status = PackStationStatus;
    type Transition = PackStationTransition;

    const KIND: OperationKind = OperationKind::PackStation;
    const TERMINAL: &'static [PackStationStatus] =
        &[PackStationStatus::Completed, PackStationStatus::Cancelled];

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> PackStationStatus {
        self.status
    }

    fn set_status(&mut self, status: PackStationStatus) {
        self.status = status;
    }

    fn rule(transition: PackStationTransition) -> TransitionRule<PackStationStatus> {
        use PackStationStatus::*;
        match transition {
            PackStationTransition::StartPacking => TransitionRule::new(&[Draft], Packing),
            PackStationTransition::CompletePacking => TransitionRule::new(&[Packing], Completed),
            PackStationTransition::Cancel => TransitionRule::new(&[Draft, Packing], Cancelled),
        }
    }

    fn guard(&self, transition: PackStationTransition) -> Result<(), ServiceError> {
        match transition {
            PackStationTransition::StartPacking => {
                require_lines(&self.items, "Add items before starting")
            }
            _ => Ok(()),
        }
    }

    fn on_transition(&mut self, transition: PackStationTransition, at: DateTime<Utc>) {
        match transition {
            PackStationTransition::StartPacking => {
                self.started_at = Some(at);
                if self.packages.is_empty() {
                    self.packages.push(Package::open(1));
                }
            }
            PackStationTransition::CompletePacking => {
                for line in &mut self.items {
                    line.row_status = if line.remaining_qty() > Decimal::ZERO {
                        PackLineStatus::Short
                    } else {
                        PackLineStatus::Packed
                    };
                }
                for package in self.packages.iter_mut().filter(|p| p.is_open()) {
                    package.row_status = PackageStatus::Sealed;
                }
                self.completed_at = Some(at);
            }
            PackStationTransition::Cancel => {}
        }
    }

    fn ledger_requests(&self, transition: PackStationTransition) -> Vec<LedgerRequest> {
        if transition != PackStationTransition::CompletePacking {
            return Vec::new();
        }
        let delivery_lines: Vec<LedgerLine> = self
            .packed_lines()
            .map(|line| LedgerLine {
                uom: line.uom.clone(),
                source_warehouse: self.warehouse.clone(),
                batch_no: line.batch_no.clone(),
                against: self.sales_order.clone(),
                ..LedgerLine::new(line.item_code.clone(), line.packed_qty)
            })
            .collect();
        if delivery_lines.is_empty() {
            return Vec::new();
        }
        let slip_lines: Vec<LedgerLine> = self
            .packed_lines()
            .map(|line| LedgerLine::new(line.item_code.clone(), line.packed_qty))
            .collect();

        let delivery_note = LedgerPayload::new(Self::KIND, self.id, delivery_lines)
            .with_party(self.customer.clone())
            .with_warehouse(self.warehouse.clone());
        let mut packing_slip = LedgerPayload::new(Self::KIND, self.id, slip_lines);
        packing_slip.gross_weight = Some(self.total_weight());

        vec![
            LedgerRequest::new(LedgerDocumentKind::DeliveryNote, delivery_note),
            LedgerRequest::linked(LedgerDocumentKind::PackingSlip, packing_slip),
        ]
    }

    fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    fn record_transition(&mut self, entry: TransitionRecord, documents: Vec<LedgerDocumentRef>) {
        self.updated_at = entry.at;
        self.history.push(entry);
        self.documents.extend(documents);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn packing() -> PackStation {
        let mut station = PackStation::new(Some("WH-1".into()))
            .for_order("SO-1", None)
            .with_line(PackLine::new("ITEM-A", dec!(2)).with_barcode("0001"))
            .with_line(PackLine::new("ITEM-B", dec!(1)));
        station.on_transition(PackStationTransition::StartPacking, Utc::now());
        station.set_status(PackStationStatus::Packing);
        station
    }

    #[test]
    fn start_opens_the_first_package() {
        let station = packing();
        assert_eq!(station.packages().len(), 1);
        assert!(station.packages()[0].is_open());
        assert!(station.started_at.is_some());
    }

    #[test]
    fn scan_matches_barcode_or_item_code() {
        let mut station = packing();
        let outcome = station.scan("0001", dec!(1)).unwrap();
        assert_eq!(outcome.item_code, "ITEM-A");
        assert_eq!(outcome.remaining_qty, dec!(1));

        let outcome = station.scan("ITEM-A", dec!(1)).unwrap();
        assert_eq!(outcome.remaining_qty, dec!(0));
        assert_eq!(station.items[0].row_status, PackLineStatus::Packed);
    }

    #[test]
    fn over_scan_is_rejected_without_mutation() {
        let mut station = packing();
        assert_matches!(station.scan("ITEM-B", dec!(2)), Err(ServiceError::OverScan(_)));
        assert_eq!(station.items[1].packed_qty(), dec!(0));

        station.scan("ITEM-B", dec!(1)).unwrap();
        assert_matches!(station.scan("ITEM-B", dec!(1)), Err(ServiceError::OverScan(_)));
        assert_matches!(station.scan("NOPE", dec!(1)), Err(ServiceError::NotFound(_)));
    }

    #[test]
    fn sealing_twice_is_a_validation_error() {
        let mut station = packing();
        station.seal_package(1).unwrap();
        assert_matches!(station.seal_package(1), Err(ServiceError::ValidationError(_)));
        assert_matches!(
            station.set_package_weight(1, dec!(2)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(station.scan("ITEM-B", dec!(1)), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn completion_marks_short_lines_and_seals_packages() {
        let mut station = packing();
        station.scan("ITEM-B", dec!(1)).unwrap();
        let second = station.add_package().unwrap();
        station.set_package_weight(1, dec!(1.5)).unwrap();
        station.set_package_weight(second, dec!(2)).unwrap();

        station.on_transition(PackStationTransition::CompletePacking, Utc::now());

        assert_eq!(station.items[0].row_status, PackLineStatus::Short);
        assert_eq!(station.items[1].row_status, PackLineStatus::Packed);
        assert!(station.packages().iter().all(|p| !p.is_open()));

        let requests = station.ledger_requests(PackStationTransition::CompletePacking);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].payload.lines.len(), 1);
        assert_eq!(requests[1].kind, LedgerDocumentKind::PackingSlip);
        assert!(requests[1].links_previous);
        assert_eq!(requests[1].payload.gross_weight, Some(dec!(3.5)));
    }
}
