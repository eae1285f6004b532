use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Attempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Attempts::Seq)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Attempts::Id)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Attempts::Player).string().not_null())
                    .col(ColumnDef::new(Attempts::Word).string().not_null())
                    // Null on rows written before correct/incorrect scoring
                    .col(ColumnDef::new(Attempts::IsCorrect).boolean().null())
                    .col(ColumnDef::new(Attempts::Accuracy).integer().null())
                    .col(ColumnDef::new(Attempts::TimeSeconds).double().not_null())
                    .col(ColumnDef::new(Attempts::Date).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attempts_player")
                    .table(Attempts::Table)
                    .col(Attempts::Player)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Attempts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Attempts {
    Table,
    Seq,
    Id,
    Player,
    Word,
    IsCorrect,
    Accuracy,
    TimeSeconds,
    Date,
}
