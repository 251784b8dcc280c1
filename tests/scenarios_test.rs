//! End-to-end checks of the documented warehouse behaviours.

mod common;

use assert_matches::assert_matches;
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stateset_wms::models::CycleCountLineStatus;
use stateset_wms::prelude::*;
use stateset_wms::reconciliation::VarianceClass;

#[rstest]
#[case(dec!(100), dec!(90), dec!(5), dec!(-10), dec!(-10), dec!(-50), VarianceClass::Variance, Severity::Low)]
#[case(dec!(0), dec!(5), dec!(1), dec!(5), dec!(100), dec!(5), VarianceClass::Variance, Severity::High)]
#[case(dec!(40), dec!(40), dec!(3), dec!(0), dec!(0), dec!(0), VarianceClass::Matched, Severity::None)]
#[case(dec!(10), dec!(12), dec!(2), dec!(2), dec!(20), dec!(4), VarianceClass::Variance, Severity::High)]
#[allow(clippy::too_many_arguments)]
fn count_variance_classification(
    #[case] book: Decimal,
    #[case] counted: Decimal,
    #[case] rate: Decimal,
    #[case] qty: Decimal,
    #[case] pct: Decimal,
    #[case] value: Decimal,
    #[case] class: VarianceClass,
    #[case] severity: Severity,
) {
    let variance = count_variance(book, counted, rate);
    assert_eq!(variance.variance_qty, qty);
    assert_eq!(variance.variance_pct, pct);
    assert_eq!(variance.variance_value, value);
    assert_eq!(variance.class, class);
    assert_eq!(variance.severity, severity);
}

#[tokio::test]
async fn cycle_count_row_matches_calculator() {
    let wms = common::warehouse();
    let service = CycleCountService::new(&wms.context);
    let count = wms.context.aggregate(
        CycleCount::new("WH-1").with_line(CycleCountLine::new("ITEM-A", dec!(100), dec!(5))),
    );
    let line = count.snapshot().await.items[0].id;

    service.start(&count, None).await.unwrap();
    service.record_count(&count, line, dec!(90)).await.unwrap();

    let record = count.snapshot().await;
    let row = &record.items[0];
    assert_eq!(row.variance_qty(), dec!(-10));
    assert_eq!(row.variance_pct(), dec!(-10));
    assert_eq!(row.variance_value(), dec!(-50));
    assert_eq!(row.row_status, CycleCountLineStatus::Variance);
    assert_eq!(row.severity(), Severity::Low);
}

#[tokio::test]
async fn serpentine_reverses_racks_in_second_aisle() {
    let wms = common::warehouse();
    let tasks = TaskService::new(&wms.context);
    let task = wms.context.aggregate(
        Task::new(TaskType::Pick, Some("WH-1".into()), None)
            .unwrap()
            .with_line(TaskLine::new("D", dec!(1)).with_source_bin("2-2"))
            .with_line(TaskLine::new("A", dec!(1)).with_source_bin("1-1"))
            .with_line(TaskLine::new("C", dec!(1)).with_source_bin("2-1"))
            .with_line(TaskLine::new("B", dec!(1)).with_source_bin("1-2")),
    );

    let route = tasks.optimize_route(&task).await.unwrap();
    let bins: Vec<&str> = route.sequence.iter().map(|s| s.bin.as_str()).collect();
    assert_eq!(bins, vec!["1-1", "1-2", "2-2", "2-1"]);
    assert_eq!(
        route
            .sequence
            .iter()
            .map(|s| s.pick_sequence)
            .collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
}

#[tokio::test]
async fn consolidation_replaces_rather_than_accumulates() {
    let wms = common::warehouse();
    common::order(&wms, "A", &[("X", dec!(5))]);
    common::order(&wms, "B", &[("X", dec!(3))]);
    let waves = WavePickService::new(&wms.context);
    let wave = wms.context.aggregate(WavePick::new("WH-1"));

    waves.add_order(&wave, "A", None).await.unwrap();
    waves.add_order(&wave, "B", None).await.unwrap();
    let items = waves.consolidate(&wave).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].total_qty, dec!(8));
    let sources: Vec<(&str, Decimal)> = items[0]
        .sources
        .iter()
        .map(|s| (s.order_id.as_str(), s.qty))
        .collect();
    assert_eq!(sources, vec![("A", dec!(5)), ("B", dec!(3))]);

    waves.remove_order(&wave, "B").await.unwrap();
    let items = waves.consolidate(&wave).await.unwrap();
    assert_eq!(items[0].total_qty, dec!(5));
    assert_eq!(wave.snapshot().await.total_qty(), dec!(5));
}

#[tokio::test]
async fn arrival_from_draft_is_invalid_state() {
    let wms = common::warehouse();
    let service = AsnService::new(&wms.context);
    let asn = wms
        .context
        .aggregate(Asn::new("WH-1").with_line(AsnLine::new("ITEM-A", dec!(1))));

    assert_matches!(
        service.mark_arrived(&asn, None).await,
        Err(ServiceError::InvalidState(_))
    );
    assert_eq!(asn.snapshot().await.status(), AsnStatus::Draft);
}

#[tokio::test]
async fn route_is_idempotent_on_unchanged_task() {
    let wms = common::warehouse();
    let tasks = TaskService::new(&wms.context);
    let task = wms.context.aggregate(
        Task::new(TaskType::Pick, Some("WH-1".into()), None)
            .unwrap()
            .with_line(TaskLine::new("A", dec!(1)).with_source_bin("2-1"))
            .with_line(TaskLine::new("B", dec!(1)).with_source_bin("1-2"))
            .with_line(TaskLine::new("C", dec!(1))),
    );

    tasks.optimize_route(&task).await.unwrap();
    let first = task.snapshot().await;
    tasks.optimize_route(&task).await.unwrap();
    let second = task.snapshot().await;

    let assignments = |t: &Task| {
        t.items
            .iter()
            .map(|l| (l.id, l.pick_sequence, l.error_message.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(assignments(&first), assignments(&second));
}

#[tokio::test]
async fn ledger_failure_on_completion_leaves_task_untouched() {
    let wms = common::warehouse();
    let tasks = TaskService::new(&wms.context);
    let task = wms.context.aggregate(
        Task::new(TaskType::Pick, Some("WH-1".into()), None)
            .unwrap()
            .with_line(TaskLine::new("A", dec!(2)).with_source_bin("1-1")),
    );
    tasks.start(&task, Some("picker")).await.unwrap();
    wms.ledger
        .fail_on(LedgerDocumentKind::StockEntry, "ledger unavailable");

    assert_matches!(
        tasks.complete(&task, None).await,
        Err(ServiceError::LedgerCreationError(_))
    );
    let record = task.snapshot().await;
    assert_eq!(record.status(), TaskStatus::InProgress);
    assert!(record.completed_at.is_none());
    assert!(record.items[0].actual_qty().is_none());
    assert!(wms.ledger.is_empty());
}
