use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_payments_table::Migration),
            Box::new(m20240601_000002_create_bookings_table::Migration),
            Box::new(m20240601_000003_create_reconciliation_alerts_table::Migration),
        ]
    }
}

mod m20240601_000001_create_payments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::UserId).string().not_null())
                        .col(
                            ColumnDef::new(Payments::Amount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Payments::AmountMinor).big_integer().not_null())
                        .col(ColumnDef::new(Payments::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Payments::Receipt).string().not_null())
                        .col(ColumnDef::new(Payments::GatewayOrderId).string().not_null())
                        .col(ColumnDef::new(Payments::GatewayPaymentId).string().null())
                        .col(ColumnDef::new(Payments::GatewaySignature).string().null())
                        .col(ColumnDef::new(Payments::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::VerifiedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_gateway_order_id")
                        .table(Payments::Table)
                        .col(Payments::GatewayOrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_status")
                        .table(Payments::Table)
                        .col(Payments::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Payments {
        Table,
        Id,
        UserId,
        Amount,
        AmountMinor,
        Currency,
        Receipt,
        GatewayOrderId,
        GatewayPaymentId,
        GatewaySignature,
        Status,
        CreatedAt,
        VerifiedAt,
    }
}

mod m20240601_000002_create_bookings_table {
    use super::m20240601_000001_create_payments_table::Payments;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_bookings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Bookings::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Bookings::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Bookings::UserId).string().not_null())
                        .col(ColumnDef::new(Bookings::UserEmail).string().null())
                        .col(ColumnDef::new(Bookings::UserName).string().null())
                        .col(
                            ColumnDef::new(Bookings::ProcessCategory)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Bookings::Material).string().not_null())
                        .col(ColumnDef::new(Bookings::MaterialSlug).string().not_null())
                        .col(
                            ColumnDef::new(Bookings::UnitRate)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Bookings::Total).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(Bookings::Notes).text().null())
                        .col(ColumnDef::new(Bookings::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Bookings::PaymentId).uuid().null())
                        .col(
                            ColumnDef::new(Bookings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bookings_payment_id")
                                .from(Bookings::Table, Bookings::PaymentId)
                                .to(Payments::Table, Payments::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bookings_user_id")
                        .table(Bookings::Table)
                        .col(Bookings::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bookings_status")
                        .table(Bookings::Table)
                        .col(Bookings::Status)
                        .to_owned(),
                )
                .await?;

            // one booking per successful payment
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bookings_payment_id")
                        .table(Bookings::Table)
                        .col(Bookings::PaymentId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Bookings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Bookings {
        Table,
        Id,
        UserId,
        UserEmail,
        UserName,
        ProcessCategory,
        Material,
        MaterialSlug,
        UnitRate,
        Quantity,
        Total,
        Notes,
        Status,
        PaymentId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000003_create_reconciliation_alerts_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_reconciliation_alerts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReconciliationAlerts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReconciliationAlerts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReconciliationAlerts::BookingId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReconciliationAlerts::PaymentId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReconciliationAlerts::Kind)
                                .string_len(48)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReconciliationAlerts::BookingStatus)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReconciliationAlerts::Detail).text().not_null())
                        .col(
                            ColumnDef::new(ReconciliationAlerts::Resolved)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ReconciliationAlerts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reconciliation_alerts_resolved")
                        .table(ReconciliationAlerts::Table)
                        .col(ReconciliationAlerts::Resolved)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(ReconciliationAlerts::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ReconciliationAlerts {
        Table,
        Id,
        BookingId,
        PaymentId,
        Kind,
        BookingStatus,
        Detail,
        Resolved,
        CreatedAt,
    }
}
