use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// 优惠券实体
/// - code: 入库前 trim + 大写, 唯一
/// - is_used: 领取成功后置 true, 不可回退
/// - last_claim_at: 最近一次领取时间, 用于轮转排序
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub is_active: bool,
    pub expiry_date: DateTime<Utc>,
    pub is_used: bool,
    pub last_claim_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_claims::Entity")]
    CouponClaims,
}

impl Related<super::coupon_claims::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CouponClaims.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
