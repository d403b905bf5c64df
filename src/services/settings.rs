use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::entities::system_setting::{self, Entity as SystemSettingEntity};
use crate::errors::ServiceError;
use crate::services::pricing::PricingSettings;

pub const TAX_RATE_KEY: &str = "tax_rate_percent";
pub const SHIPPING_FEE_KEY: &str = "shipping_fee";

/// Documented fallbacks when the settings store is missing a key.
pub const DEFAULT_TAX_RATE_PERCENT: Decimal = dec!(18);
pub const DEFAULT_SHIPPING_FEE: Decimal = dec!(0);

/// Read-only view over the externally-owned settings store.
#[derive(Clone)]
pub struct SettingsService {
    db: Arc<DatabaseConnection>,
}

impl SettingsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Resolves the settings the pricing calculator needs, falling back to
    /// the documented defaults for missing or unparsable values.
    pub async fn pricing_settings(&self) -> Result<PricingSettings, ServiceError> {
        let tax_rate_percent = self
            .decimal_setting(TAX_RATE_KEY)
            .await?
            .unwrap_or(DEFAULT_TAX_RATE_PERCENT);
        let shipping_fee = self
            .decimal_setting(SHIPPING_FEE_KEY)
            .await?
            .unwrap_or(DEFAULT_SHIPPING_FEE);

        Ok(PricingSettings {
            tax_rate_percent,
            shipping_fee,
        })
    }

    async fn decimal_setting(&self, key: &str) -> Result<Option<Decimal>, ServiceError> {
        let row = SystemSettingEntity::find()
            .filter(system_setting::Column::Key.eq(key))
            .one(&*self.db)
            .await?;

        Ok(row.and_then(|setting| match Decimal::from_str(setting.value.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, value = %setting.value, error = %e, "unparsable setting; using default");
                None
            }
        }))
    }
}
