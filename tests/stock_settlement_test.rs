mod common;

use futures::future::join_all;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use std::sync::Arc;
use uuid::Uuid;

use common::*;
use storefront_api::entities::order::OrderStatus;
use storefront_api::entities::product::Entity as ProductEntity;
use storefront_api::services::settlement::SettlementService;

#[tokio::test]
async fn last_unit_is_decremented_exactly_once() {
    let db = setup_db().await;
    seed_pricing_settings(&db, "0", "0").await;
    let product = seed_product(&db, "last unit", dec!(300), 1).await;

    let order_a = draft_order(db.clone(), Uuid::new_v4(), product.id, 1, None).await;
    let order_b = draft_order(db.clone(), Uuid::new_v4(), product.id, 1, None).await;

    let gateway = MockGateway::new();
    gateway.register_success("pay_a", "tx_a", order_a.total);
    gateway.register_success("pay_b", "tx_b", order_b.total);
    let service = Arc::new(SettlementService::new(
        db.clone(),
        gateway,
        None,
        "USD".to_string(),
    ));

    let results = join_all([
        {
            let service = service.clone();
            let id = order_a.id;
            tokio::spawn(async move { service.settle(id, "pay_a").await })
        },
        {
            let service = service.clone();
            let id = order_b.id;
            tokio::spawn(async move { service.settle(id, "pay_b").await })
        },
    ])
    .await;

    // Both payments are real money, so both orders confirm. Only one gets
    // the unit; the other confirms flagged unfulfilled.
    let mut fulfilled = 0;
    let mut unfulfilled = 0;
    for result in results {
        let outcome = result.unwrap().expect("settlement must not fail");
        assert_eq!(outcome.order.status, OrderStatus::Confirmed);
        if outcome.order.unfulfilled {
            unfulfilled += 1;
        } else {
            fulfilled += 1;
        }
    }
    assert_eq!(fulfilled, 1);
    assert_eq!(unfulfilled, 1);

    let product = ProductEntity::find_by_id(product.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock_quantity, 0, "stock must never go negative");
}

#[tokio::test]
async fn multi_line_shortfall_unwinds_all_decrements() {
    let db = setup_db().await;
    seed_pricing_settings(&db, "0", "0").await;
    let plentiful = seed_product(&db, "plentiful", dec!(50), 10).await;
    let scarce = seed_product(&db, "scarce", dec!(80), 5).await;

    let service =
        storefront_api::services::orders::OrderService::new(db.clone(), None);
    let (order, _lines) = service
        .create_draft(storefront_api::services::orders::CreateOrderRequest {
            customer_id: Uuid::new_v4(),
            lines: vec![
                storefront_api::services::orders::OrderLineRequest {
                    product_id: plentiful.id,
                    quantity: 2,
                },
                storefront_api::services::orders::OrderLineRequest {
                    product_id: scarce.id,
                    quantity: 3,
                },
            ],
            coupon_code: None,
        })
        .await
        .unwrap();

    // The scarce line sells out elsewhere before settlement arrives.
    set_stock(&db, scarce.id, 1).await;

    let gateway = MockGateway::new();
    gateway.register_success("pay_1", "tx_1", order.total);
    let outcome = SettlementService::new(db.clone(), gateway, None, "USD".to_string())
        .settle(order.id, "pay_1")
        .await
        .unwrap();

    assert!(outcome.order.unfulfilled);

    // The successful first-line decrement must not survive the shortfall.
    let plentiful = ProductEntity::find_by_id(plentiful.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plentiful.stock_quantity, 10);
    let scarce = ProductEntity::find_by_id(scarce.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(scarce.stock_quantity, 1);
}
