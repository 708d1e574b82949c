use crate::database::DbPool;
use crate::entities::{coupon_claim_entity as claims, coupon_entity as coupons};
use crate::error::{AppError, AppResult};
use crate::models::{ClaimRecord, Coupon, CouponOrder, CouponPatch, NewCoupon};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    Select, Set, SqlErr, TransactionTrait, UpdateMany,
};
use std::collections::HashMap;

/// 优惠券存储
///
/// 只向分配逻辑暴露原子的条件写 (`conditional_mark_used`),
/// 不提供"先读后写"式的两步调用。
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// 按轮转顺序返回该 IP 可领取的第一张券
    async fn find_eligible_candidate(
        &self,
        claimant_ip: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Coupon>>;

    /// 仅当 `is_used = false` 时: 追加领取记录、置 `is_used`、更新 `last_claim_at`。
    /// 前置条件不成立 (或券不存在) 返回 None。
    async fn conditional_mark_used(
        &self,
        id: i64,
        claim: ClaimRecord,
    ) -> AppResult<Option<Coupon>>;

    /// code 重复 (大小写不敏感) 返回 ValidationError
    async fn insert(&self, coupon: NewCoupon) -> AppResult<Coupon>;

    async fn update(&self, id: i64, patch: CouponPatch) -> AppResult<Option<Coupon>>;

    async fn list_all(&self, order: CouponOrder) -> AppResult<Vec<Coupon>>;

    /// 该 IP 最近一次成功领取的时间
    async fn latest_claim_at(&self, ip: &str) -> AppResult<Option<DateTime<Utc>>>;

    /// 启用、未使用、未过期的券数量 (与领取者无关)
    async fn count_available(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// 有领取记录的券, 按最近领取时间倒序
    async fn list_claimed(&self) -> AppResult<Vec<Coupon>>;
}

pub(crate) fn duplicate_code_error() -> AppError {
    AppError::ValidationError("Coupon code already exists".to_string())
}

/// PostgreSQL 存储 (sea-orm)
#[derive(Clone)]
pub struct SeaOrmCouponStore {
    pool: DbPool,
}

impl SeaOrmCouponStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.pool
    }

    fn rotation_sorted(select: Select<coupons::Entity>) -> Select<coupons::Entity> {
        // false < true: last_claim_at 为 NULL 的排在最前
        select
            .order_by(
                Expr::col(coupons::Column::LastClaimAt).is_not_null(),
                Order::Asc,
            )
            .order_by_asc(coupons::Column::LastClaimAt)
            .order_by_asc(coupons::Column::CreatedAt)
            .order_by_asc(coupons::Column::Id)
    }

    /// 启用、未使用、未过期且该 IP 未领取过的券, 按轮转顺序
    fn candidate_query(claimant_ip: &str, now: DateTime<Utc>) -> Select<coupons::Entity> {
        let claimed_by_ip = Query::select()
            .column(claims::Column::CouponId)
            .from(claims::Entity)
            .and_where(claims::Column::Ip.eq(claimant_ip))
            .to_owned();

        Self::rotation_sorted(
            coupons::Entity::find()
                .filter(coupons::Column::IsActive.eq(true))
                .filter(coupons::Column::IsUsed.eq(false))
                .filter(coupons::Column::ExpiryDate.gt(now))
                .filter(coupons::Column::Id.not_in_subquery(claimed_by_ip)),
        )
    }

    /// 条件更新: 仅命中 is_used = false 的行
    fn mark_used_update(id: i64, claimed_at: DateTime<Utc>) -> UpdateMany<coupons::Entity> {
        coupons::Entity::update_many()
            .col_expr(coupons::Column::IsUsed, Expr::value(true))
            .col_expr(coupons::Column::LastClaimAt, Expr::value(claimed_at))
            .col_expr(coupons::Column::UpdatedAt, Expr::value(claimed_at))
            .filter(coupons::Column::Id.eq(id))
            .filter(coupons::Column::IsUsed.eq(false))
    }

    /// 批量挂载领取记录 (保持 models 原顺序)
    async fn attach_claims<C: ConnectionTrait>(
        conn: &C,
        models: Vec<coupons::Model>,
    ) -> Result<Vec<Coupon>, DbErr> {
        if models.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = models.iter().map(|m| m.id).collect();
        let rows = claims::Entity::find()
            .filter(claims::Column::CouponId.is_in(ids))
            .order_by_asc(claims::Column::ClaimedAt)
            .all(conn)
            .await?;

        let mut grouped: HashMap<i64, Vec<claims::Model>> = HashMap::new();
        for row in rows {
            grouped.entry(row.coupon_id).or_default().push(row);
        }

        Ok(models
            .into_iter()
            .map(|m| {
                let claims = grouped.remove(&m.id).unwrap_or_default();
                Coupon::from_parts(m, claims)
            })
            .collect())
    }

    async fn attach_one<C: ConnectionTrait>(
        conn: &C,
        model: coupons::Model,
    ) -> Result<Coupon, DbErr> {
        let mut list = Self::attach_claims(conn, vec![model]).await?;
        list.pop()
            .ok_or_else(|| DbErr::Custom("Coupon disappeared while loading claims".into()))
    }
}

#[async_trait]
impl CouponStore for SeaOrmCouponStore {
    async fn find_eligible_candidate(
        &self,
        claimant_ip: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Coupon>> {
        let candidate = Self::candidate_query(claimant_ip, now)
            .one(self.db())
            .await?;

        match candidate {
            Some(model) => Ok(Some(Self::attach_one(self.db(), model).await?)),
            None => Ok(None),
        }
    }

    async fn conditional_mark_used(
        &self,
        id: i64,
        claim: ClaimRecord,
    ) -> AppResult<Option<Coupon>> {
        // 条件更新与领取记录写入在同一事务内; 请求中断时事务随连接回滚
        let txn = self.db().begin().await?;

        let result = Self::mark_used_update(id, claim.claimed_at)
            .exec(&txn)
            .await?;

        if result.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(None);
        }

        claims::ActiveModel {
            coupon_id: Set(id),
            ip: Set(claim.ip),
            session_id: Set(claim.session_id),
            claimed_at: Set(claim.claimed_at),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let model = coupons::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("coupon {id}")))?;
        let coupon = Self::attach_one(&txn, model).await?;

        txn.commit().await?;
        Ok(Some(coupon))
    }

    async fn insert(&self, coupon: NewCoupon) -> AppResult<Coupon> {
        let existing = coupons::Entity::find()
            .filter(coupons::Column::Code.eq(coupon.code.as_str()))
            .one(self.db())
            .await?;
        if existing.is_some() {
            return Err(duplicate_code_error());
        }

        let now = Utc::now();
        let model = coupons::ActiveModel {
            code: Set(coupon.code),
            description: Set(coupon.description),
            is_active: Set(true),
            expiry_date: Set(coupon.expiry_date),
            is_used: Set(false),
            last_claim_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db())
        .await
        // 并发插入同一 code 时由唯一索引兜底
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => duplicate_code_error(),
            _ => AppError::DatabaseError(e),
        })?;

        Ok(Coupon::from_parts(model, Vec::new()))
    }

    async fn update(&self, id: i64, patch: CouponPatch) -> AppResult<Option<Coupon>> {
        let Some(model) = coupons::Entity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };

        // 只写入被修改的列, 不覆盖 is_used / last_claim_at
        let mut am = model.into_active_model();
        if let Some(is_active) = patch.is_active {
            am.is_active = Set(is_active);
        }
        if let Some(description) = patch.description {
            am.description = Set(description);
        }
        if let Some(expiry_date) = patch.expiry_date {
            am.expiry_date = Set(expiry_date);
        }
        am.updated_at = Set(Utc::now());
        let updated = am.update(self.db()).await?;

        Ok(Some(Self::attach_one(self.db(), updated).await?))
    }

    async fn list_all(&self, order: CouponOrder) -> AppResult<Vec<Coupon>> {
        let select = match order {
            CouponOrder::Rotation => Self::rotation_sorted(coupons::Entity::find()),
            CouponOrder::NewestFirst => coupons::Entity::find()
                .order_by_desc(coupons::Column::CreatedAt)
                .order_by_desc(coupons::Column::Id),
        };
        let models = select.all(self.db()).await?;
        Ok(Self::attach_claims(self.db(), models).await?)
    }

    async fn latest_claim_at(&self, ip: &str) -> AppResult<Option<DateTime<Utc>>> {
        let latest = claims::Entity::find()
            .join(
                sea_orm::JoinType::InnerJoin,
                claims::Relation::Coupon.def(),
            )
            .filter(claims::Column::Ip.eq(ip))
            .filter(coupons::Column::IsUsed.eq(true))
            .order_by_desc(claims::Column::ClaimedAt)
            .one(self.db())
            .await?;
        Ok(latest.map(|c| c.claimed_at))
    }

    async fn count_available(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let count = coupons::Entity::find()
            .filter(coupons::Column::IsActive.eq(true))
            .filter(coupons::Column::IsUsed.eq(false))
            .filter(coupons::Column::ExpiryDate.gt(now))
            .count(self.db())
            .await?;
        Ok(count)
    }

    async fn list_claimed(&self) -> AppResult<Vec<Coupon>> {
        let rows = claims::Entity::find()
            .order_by_desc(claims::Column::ClaimedAt)
            .all(self.db())
            .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|row| row.coupon_id).collect();
        let mut models: HashMap<i64, coupons::Model> = coupons::Entity::find()
            .filter(coupons::Column::Id.is_in(ids))
            .all(self.db())
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        // coupon_claims.coupon_id 唯一: 每张券只有一条记录, rows 的顺序即结果顺序
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let model = models.remove(&row.coupon_id)?;
                Some(Coupon::from_parts(model, vec![row]))
            })
            .collect())
    }
}
