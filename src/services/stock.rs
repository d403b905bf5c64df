//! Stock commitment.
//!
//! A DRAFT order is not an inventory hold: stock moves exactly once, at
//! settlement, through a conditional single-statement decrement. Zero rows
//! affected means another settlement got there first. The checkout boundary
//! makes its own advisory read against the catalog; this module is only the
//! authoritative side.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::info;
use uuid::Uuid;

use crate::entities::order_line;
use crate::entities::product::{self, Entity as ProductEntity};
use crate::errors::{RuleViolation, ServiceError};

/// One decrement to apply at settlement.
#[derive(Debug, Clone)]
pub struct StockLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

impl From<&order_line::Model> for StockLine {
    fn from(line: &order_line::Model) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
        }
    }
}

/// Applies every line's decrement, each as
/// `UPDATE products SET stock_quantity = stock_quantity - n
///  WHERE id = ? AND stock_quantity >= n`.
/// Runs on the settlement transaction; the caller decides whether a failure
/// aborts it or marks the order unfulfilled.
pub async fn commit<C: ConnectionTrait>(conn: &C, lines: &[StockLine]) -> Result<(), ServiceError> {
    for line in lines {
        let result = ProductEntity::update_many()
            .col_expr(
                product::Column::StockQuantity,
                Expr::col(product::Column::StockQuantity).sub(line.quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(line.product_id))
            .filter(product::Column::StockQuantity.gte(line.quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let available = ProductEntity::find_by_id(line.product_id)
                .one(conn)
                .await?
                .map(|p| p.stock_quantity)
                .unwrap_or(0);
            return Err(RuleViolation::InsufficientStock {
                product_id: line.product_id,
                available,
            }
            .into());
        }

        info!(
            product_id = %line.product_id,
            quantity = line.quantity,
            "stock committed"
        );
    }
    Ok(())
}
