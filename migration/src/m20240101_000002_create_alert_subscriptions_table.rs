use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(AlertSubscriptions::Table)
                .if_not_exists()
                .col(ColumnDef::new(AlertSubscriptions::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(AlertSubscriptions::Token).string().not_null())
                .col(
                    ColumnDef::new(AlertSubscriptions::ThresholdUsd)
                        .decimal_len(38, 18)
                        .not_null()
                )
                .col(ColumnDef::new(AlertSubscriptions::Email).string().not_null())
                .col(
                    ColumnDef::new(AlertSubscriptions::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_alert_subscriptions_token")
                .table(AlertSubscriptions::Table)
                .col(AlertSubscriptions::Token)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(AlertSubscriptions::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum AlertSubscriptions {
    Table,
    Id,
    Token,
    ThresholdUsd,
    Email,
    CreatedAt,
}
