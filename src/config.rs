use serde::{Deserialize, Serialize};
use std::env;

/// `DATABASE_URL` 取该值时使用进程内存储 (本地调试用)
pub const MEMORY_DATABASE_URL: &str = "memory";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub claim: ClaimConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in: i64, // seconds
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    /// 为空时允许任意来源
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 生产环境为 true (SameSite=None 需要 Secure)
    pub cookie_secure: bool,
    /// 是否信任 X-Forwarded-For
    pub trust_proxy: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_secure: false,
            trust_proxy: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 3,
            window_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimConfig {
    /// 并发冲突后重新选券的次数
    pub conflict_retries: u32,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub allow_signup: bool,
    /// 启动时若不存在则创建的初始管理员
    #[serde(default)]
    pub bootstrap_username: Option<String>,
    #[serde(default)]
    pub bootstrap_password: Option<String>,
    #[serde(default)]
    pub bootstrap_email: Option<String>,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                toml::from_str(&config_str).map_err(|e| format!("解析配置文件失败: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Self::from_env_defaults()?,
            Err(e) => {
                return Err(format!("无法读取配置文件 {config_path}: {e}").into());
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// 无配置文件：使用环境变量与默认值构建
    fn from_env_defaults() -> Result<Self, Box<dyn std::error::Error>> {
        // 数据库 URL 在无配置文件时必须提供
        let database_url = get_env("DATABASE_URL")
            .ok_or("缺少 DATABASE_URL 环境变量，且未找到配置文件 config.toml")?;

        Ok(Config {
            server: ServerConfig {
                host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: get_env_parse("SERVER_PORT", 5000u16),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                connect_timeout_secs: get_env_parse(
                    "DB_CONNECT_TIMEOUT_SECS",
                    default_connect_timeout_secs(),
                ),
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET")
                    .unwrap_or_else(|| "change-me-in-production".to_string()),
                expires_in: get_env_parse("JWT_EXPIRES_IN", 86_400i64),
            },
            cors: CorsConfig::default(),
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            claim: ClaimConfig::default(),
            admin: AdminConfig::default(),
        })
    }

    /// 环境变量覆盖（即便文件存在时也覆盖）
    fn apply_env_overrides(&mut self) {
        if let Some(v) = get_env("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get_env("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            self.server.port = p;
        }
        if let Some(v) = get_env("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = get_env("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.max_connections = mc;
        }
        if let Some(v) = get_env("DB_CONNECT_TIMEOUT_SECS")
            && let Ok(n) = v.parse()
        {
            self.database.connect_timeout_secs = n;
        }
        if let Some(v) = get_env("JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Some(v) = get_env("JWT_EXPIRES_IN")
            && let Ok(n) = v.parse()
        {
            self.jwt.expires_in = n;
        }

        // CORS: 逗号分隔
        if let Some(v) = get_env("CORS_ALLOWED_ORIGINS") {
            self.cors.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(v) = get_env("SESSION_COOKIE_SECURE")
            && let Ok(b) = v.parse()
        {
            self.session.cookie_secure = b;
        }
        if let Some(v) = get_env("TRUST_PROXY")
            && let Ok(b) = v.parse()
        {
            self.session.trust_proxy = b;
        }

        if let Some(v) = get_env("RATE_LIMIT_MAX_REQUESTS")
            && let Ok(n) = v.parse()
        {
            self.rate_limit.max_requests = n;
        }
        if let Some(v) = get_env("RATE_LIMIT_WINDOW_SECS")
            && let Ok(n) = v.parse()
        {
            self.rate_limit.window_secs = n;
        }
        if let Some(v) = get_env("CLAIM_CONFLICT_RETRIES")
            && let Ok(n) = v.parse()
        {
            self.claim.conflict_retries = n;
        }

        // Admin
        if let Some(v) = get_env("ADMIN_ALLOW_SIGNUP")
            && let Ok(b) = v.parse()
        {
            self.admin.allow_signup = b;
        }
        if let Some(v) = get_env("ADMIN_USERNAME") {
            self.admin.bootstrap_username = Some(v);
        }
        if let Some(v) = get_env("ADMIN_PASSWORD") {
            self.admin.bootstrap_password = Some(v);
        }
        if let Some(v) = get_env("ADMIN_EMAIL") {
            self.admin.bootstrap_email = Some(v);
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database.url == MEMORY_DATABASE_URL
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
