mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use stateset_wms::models::WaveOrderStatus;
use stateset_wms::prelude::*;
use std::time::Duration;

#[tokio::test]
async fn wave_to_pick_task_to_stock_entry() {
    let mut wms = common::warehouse();
    common::order(&wms, "SO-1", &[("ITEM-A", dec!(2)), ("ITEM-B", dec!(1))]);
    common::order(&wms, "SO-2", &[("ITEM-A", dec!(3)), ("ITEM-C", dec!(4))]);
    common::stock(&wms, "ITEM-A", dec!(10));
    common::stock(&wms, "ITEM-B", dec!(10));

    let waves = WavePickService::new(&wms.context);
    let tasks = TaskService::new(&wms.context);
    let wave = wms.context.aggregate(WavePick::new("WH-1"));

    waves.add_order(&wave, "SO-1", None).await.unwrap();
    waves.add_order(&wave, "SO-2", Some("CUST-2".into())).await.unwrap();
    let items = waves.consolidate(&wave).await.unwrap();
    assert_eq!(
        items
            .iter()
            .map(|i| (i.item_code.as_str(), i.total_qty))
            .collect::<Vec<_>>(),
        vec![("ITEM-A", dec!(5)), ("ITEM-B", dec!(1)), ("ITEM-C", dec!(4))]
    );

    waves.release(&wave, Some("lead")).await.unwrap();
    let (_, task) = waves.start_picking(&wave, Some("lead")).await.unwrap();

    let sequenced: Vec<_> = task
        .items
        .iter()
        .filter_map(|l| l.pick_sequence)
        .collect();
    assert_eq!(sequenced, vec![1, 2]);
    let unresolved = task.items.iter().find(|l| l.item_code == "ITEM-C").unwrap();
    assert!(unresolved.pick_sequence.is_none());
    assert!(unresolved.error_message.is_some());

    let task = wms.context.aggregate(task);
    tasks.assign(&task, Some("picker"), Some("lead")).await.unwrap();
    tasks.start(&task, Some("picker")).await.unwrap();
    let outcome = tasks.complete(&task, Some("picker")).await.unwrap();
    assert_eq!(outcome.documents[0].kind, LedgerDocumentKind::StockEntry);

    waves.complete(&wave, Some("lead")).await.unwrap();
    let record = wave.snapshot().await;
    assert_eq!(record.status(), WaveStatus::Completed);
    assert!(record
        .orders()
        .iter()
        .all(|o| o.row_status == WaveOrderStatus::Picked));

    let events = wms.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::WaveConsolidated { orders: 2, items: 3, .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::PickRouteApplied { sequenced: 2, unresolved: 1, .. })));
}

#[tokio::test]
async fn duplicate_order_is_rejected_when_added() {
    let wms = common::warehouse();
    let waves = WavePickService::new(&wms.context);
    let wave = wms.context.aggregate(WavePick::new("WH-1"));

    waves.add_order(&wave, "SO-1", None).await.unwrap();
    assert_matches!(
        waves.add_order(&wave, "SO-1", None).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_eq!(wave.snapshot().await.total_orders(), 1);
}

#[tokio::test]
async fn busy_wave_rejects_a_second_transition() {
    let wms = common::warehouse();
    common::order(&wms, "SO-1", &[("ITEM-A", dec!(1))]);
    let waves = WavePickService::new(&wms.context);
    let wave = wms.context.aggregate(WavePick::new("WH-1"));
    waves.add_order(&wave, "SO-1", None).await.unwrap();
    waves.consolidate(&wave).await.unwrap();

    let guard = wave.acquire().await.unwrap();
    let id = wave.id();
    assert_matches!(
        waves.release(&wave, None).await,
        Err(ServiceError::ConcurrentModification(busy)) if busy == id
    );
    drop(guard);

    waves.release(&wave, None).await.unwrap();
    assert_eq!(wave.snapshot().await.status(), WaveStatus::Released);
}

#[tokio::test]
async fn wait_mode_queues_behind_in_flight_transition() {
    let config = WmsConfig {
        lock_mode: "wait".into(),
        ..WmsConfig::default()
    };
    let wms = InMemoryWms::new(config);
    common::order(&wms, "SO-1", &[("ITEM-A", dec!(1))]);
    let waves = WavePickService::new(&wms.context);
    let wave = wms.context.aggregate(WavePick::new("WH-1"));
    waves.add_order(&wave, "SO-1", None).await.unwrap();
    waves.consolidate(&wave).await.unwrap();

    let guard = wave.acquire().await.unwrap();
    let pending = {
        let waves = waves.clone();
        let wave = wave.clone();
        tokio::spawn(async move { waves.release(&wave, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());
    drop(guard);

    pending.await.unwrap().unwrap();
    assert_eq!(wave.snapshot().await.status(), WaveStatus::Released);
}

#[tokio::test]
async fn removing_an_order_forces_reconsolidation_before_release() {
    let wms = common::warehouse();
    common::order(&wms, "SO-A", &[("X", dec!(5))]);
    common::order(&wms, "SO-B", &[("X", dec!(3))]);
    let waves = WavePickService::new(&wms.context);
    let wave = wms.context.aggregate(WavePick::new("WH-1"));

    waves.add_order(&wave, "SO-A", None).await.unwrap();
    waves.add_order(&wave, "SO-B", None).await.unwrap();
    waves.consolidate(&wave).await.unwrap();
    waves.remove_order(&wave, "SO-B").await.unwrap();

    assert!(wave.snapshot().await.items().is_empty());
    assert_matches!(
        waves.release(&wave, None).await,
        Err(ServiceError::ValidationError(_))
    );

    let items = waves.consolidate(&wave).await.unwrap();
    assert_eq!(items[0].total_qty, dec!(5));
    assert!(items[0].sources.iter().all(|s| s.order_id == "SO-A"));
    waves.release(&wave, None).await.unwrap();
    assert_eq!(wave.snapshot().await.status(), WaveStatus::Released);
}
