use sea_orm::entity::prelude::*;
use serde::{ Deserialize, Serialize };

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "token_prices")]
pub struct Model {
    /// Insertion order; breaks ties between readings sharing `observed_at`.
    #[sea_orm(primary_key)]
    pub id: i64,
    pub token: String,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    pub price: Decimal,
    pub observed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
