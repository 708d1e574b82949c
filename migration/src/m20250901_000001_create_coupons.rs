use sea_orm_migration::prelude::*;

/// 优惠券表
#[derive(DeriveIden)]
enum Coupons {
    Table,
    Id,
    Code,
    Description,
    IsActive,
    ExpiryDate,
    IsUsed,
    LastClaimAt,
    CreatedAt,
    UpdatedAt,
}

/// 领取记录表 (一条记录 = 一次成功领取)
#[derive(DeriveIden)]
enum CouponClaims {
    Table,
    Id,
    CouponId,
    Ip,
    SessionId,
    ClaimedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Coupons::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Coupons::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Coupons::Code).string_len(64).not_null())
                    .col(ColumnDef::new(Coupons::Description).text().not_null())
                    .col(
                        ColumnDef::new(Coupons::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Coupons::ExpiryDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Coupons::IsUsed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Coupons::LastClaimAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Coupons::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Coupons::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        // code 入库前统一大写，唯一索引即保证大小写不敏感唯一
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_coupons_code_unique")
                    .table(Coupons::Table)
                    .col(Coupons::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 轮转分配排序
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_coupons_rotation")
                    .table(Coupons::Table)
                    .col(Coupons::LastClaimAt)
                    .col(Coupons::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CouponClaims::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CouponClaims::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CouponClaims::CouponId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CouponClaims::Ip).string_len(64).not_null())
                    .col(
                        ColumnDef::new(CouponClaims::SessionId)
                            .string_len(128)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CouponClaims::ClaimedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_coupon_claims_coupon")
                            .from(CouponClaims::Table, CouponClaims::CouponId)
                            .to(Coupons::Table, Coupons::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // 单次使用: 每张券最多一条领取记录
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_coupon_claims_coupon_unique")
                    .table(CouponClaims::Table)
                    .col(CouponClaims::CouponId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 冷却期查询 (ip + 时间)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_coupon_claims_ip_claimed_at")
                    .table(CouponClaims::Table)
                    .col(CouponClaims::Ip)
                    .col(CouponClaims::ClaimedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(CouponClaims::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().if_exists().table(Coupons::Table).to_owned())
            .await?;

        Ok(())
    }
}
