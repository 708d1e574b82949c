use crate::config::AdminConfig;
use crate::database::DbPool;
use crate::entities::admin_entity as admins;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::utils::*;
use chrono::Utc;
use regex::Regex;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

#[derive(Clone)]
pub struct AuthService {
    pool: DbPool,
    jwt_service: JwtService,
}

fn pattern(source: &str) -> AppResult<Regex> {
    Regex::new(source).map_err(|e| AppError::InternalError(format!("Invalid pattern: {}", e)))
}

fn validate_username(username: &str) -> AppResult<()> {
    let username_regex = pattern(r"^[A-Za-z0-9_.\-]{3,64}$")?;
    if !username_regex.is_match(username) {
        return Err(AppError::ValidationError(
            "Username must be 3-64 characters of letters, digits, '_', '-' or '.'".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> AppResult<()> {
    let email_regex = pattern(r"^[^@\s]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)+$")?;
    if email.len() > 254 || !email_regex.is_match(email) {
        return Err(AppError::ValidationError("Invalid email address".to_string()));
    }
    Ok(())
}

impl AuthService {
    pub fn new(pool: DbPool, jwt_service: JwtService) -> Self {
        Self { pool, jwt_service }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.pool
    }

    pub async fn signup(&self, request: SignupRequest) -> AppResult<AuthResponse> {
        let username = request.username.trim().to_string();
        let email = request.email.trim().to_lowercase();

        validate_username(&username)?;
        validate_email(&email)?;
        validate_password(&request.password)?;

        let admin = self.create_admin(&username, &email, &request.password).await?;
        log::info!("Admin signed up: id={} username={}", admin.id, admin.username);

        self.issue(admin)
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let admin = admins::Entity::find()
            .filter(admins::Column::Username.eq(request.username.trim()))
            .one(self.db())
            .await?;

        // 用户名不存在与密码错误返回同一错误
        let admin = admin.ok_or_else(|| AppError::AuthError("Invalid credentials".to_string()))?;
        if !verify_password(&request.password, &admin.password_hash)? {
            log::warn!("Failed admin login: username={}", admin.username);
            return Err(AppError::AuthError("Invalid credentials".to_string()));
        }

        log::info!("Admin logged in: id={}", admin.id);
        self.issue(admin)
    }

    /// 启动时按配置创建初始管理员, 已存在则跳过; 返回是否新建
    pub async fn ensure_bootstrap_admin(&self, config: &AdminConfig) -> AppResult<bool> {
        let (Some(username), Some(password)) = (
            config.bootstrap_username.as_deref(),
            config.bootstrap_password.as_deref(),
        ) else {
            return Ok(false);
        };

        let existing = admins::Entity::find()
            .filter(admins::Column::Username.eq(username))
            .one(self.db())
            .await?;
        if existing.is_some() {
            return Ok(false);
        }

        let email = config
            .bootstrap_email
            .clone()
            .unwrap_or_else(|| format!("{}@localhost.localdomain", username));

        if password.is_empty() {
            return Err(AppError::ConfigError(
                "ADMIN_PASSWORD must not be empty".to_string(),
            ));
        }

        let admin = self.create_admin(username, &email.to_lowercase(), password).await?;
        log::info!("Bootstrap admin created: id={} username={}", admin.id, admin.username);
        Ok(true)
    }

    async fn create_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> AppResult<admins::Model> {
        let taken_username = admins::Entity::find()
            .filter(admins::Column::Username.eq(username))
            .one(self.db())
            .await?;
        if taken_username.is_some() {
            return Err(AppError::ValidationError("Username already exists".to_string()));
        }

        let taken_email = admins::Entity::find()
            .filter(admins::Column::Email.eq(email))
            .one(self.db())
            .await?;
        if taken_email.is_some() {
            return Err(AppError::ValidationError("Email already exists".to_string()));
        }

        let password_hash = hash_password(password)?;
        let now = Utc::now();
        let admin = admins::ActiveModel {
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db())
        .await?;

        Ok(admin)
    }

    fn issue(&self, admin: admins::Model) -> AppResult<AuthResponse> {
        let access_token = self
            .jwt_service
            .generate_access_token(admin.id, &admin.username)?;

        Ok(AuthResponse {
            admin: AdminResponse::from(admin),
            access_token,
            expires_in: self.jwt_service.get_access_token_expires_in(),
        })
    }
}
