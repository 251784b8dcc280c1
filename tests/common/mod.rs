#![allow(dead_code)]

use rust_decimal::Decimal;
use stateset_wms::prelude::*;
use stateset_wms::external::StockLevel;

/// Builds an in-memory warehouse with a handful of Picking bins laid out
/// over two aisles.
pub fn warehouse() -> InMemoryWms {
    let wms = InMemoryWms::new(WmsConfig::default());
    for (aisle, rack) in [("1", "1"), ("1", "2"), ("2", "1"), ("2", "2")] {
        wms.bins.insert(bin(aisle, rack));
    }
    wms
}

pub fn bin(aisle: &str, rack: &str) -> Bin {
    Bin::new("WH-1", BinCoordinates::new(aisle, rack, "", ""), ZoneType::Picking)
        .expect("valid bin")
}

pub fn stock(wms: &InMemoryWms, item_code: &str, qty: Decimal) {
    wms.availability
        .set_stock(item_code, "WH-1", StockLevel::new(qty, Decimal::ZERO));
}

pub fn order(wms: &InMemoryWms, order_id: &str, lines: &[(&str, Decimal)]) {
    wms.orders.insert(
        order_id,
        lines
            .iter()
            .map(|(item, qty)| OrderLine::new(*item, *qty))
            .collect(),
    );
}
