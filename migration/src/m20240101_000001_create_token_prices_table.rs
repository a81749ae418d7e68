use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(TokenPrices::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(TokenPrices::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key()
                )
                .col(ColumnDef::new(TokenPrices::Token).string().not_null())
                // Exact decimal, never binary floating point
                .col(ColumnDef::new(TokenPrices::Price).decimal_len(38, 18).not_null())
                .col(
                    ColumnDef::new(TokenPrices::ObservedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .to_owned()
        ).await?;

        // Latest/series lookups and the hourly window scan
        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_token_prices_token_observed_at")
                .table(TokenPrices::Table)
                .col(TokenPrices::Token)
                .col(TokenPrices::ObservedAt)
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_token_prices_observed_at")
                .table(TokenPrices::Table)
                .col(TokenPrices::ObservedAt)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(TokenPrices::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum TokenPrices {
    Table,
    Id,
    Token,
    Price,
    ObservedAt,
}
