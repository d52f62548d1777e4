use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use tracing::warn;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_YANDEX_GPT_URL: &str =
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub report_session_ttl: Duration,
    vars: Vars,
}

pub struct TelegramConfig {
    pub token: String,
    pub api_url: String,
    pub poll_timeout_secs: u64,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YandexAuth {
    ApiKey(String),
    /// Expires after about 12 hours; prefer an API key for a long-running bot.
    IamToken(String),
}

impl YandexAuth {
    #[must_use]
    pub fn header_value(&self) -> String {
        match self {
            Self::ApiKey(key) => format!("Api-Key {key}"),
            Self::IamToken(token) => format!("Bearer {token}"),
        }
    }
}

pub struct EstimatorConfig {
    pub url: String,
    pub folder_id: String,
    pub model: String,
    pub auth: YandexAuth,
    pub timeout: Duration,
}

/// Snapshot of the variables this process reads, so parsing can be tested
/// without touching the real environment.
struct Vars(Vec<(String, String)>);

impl Vars {
    fn from_env() -> Self {
        Self(std::env::vars().collect())
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn require(&self, name: &str) -> Result<String> {
        self.get(name)
            .map(str::to_string)
            .with_context(|| format!("{name} environment variable not set"))
    }

    fn parse_or<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.get(name) {
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("{name} has an invalid value: '{raw}'")),
            None => Ok(default),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // A missing .env file is normal; variables may come from the service manager.
        let _ = dotenvy::dotenv();

        let proj_dirs =
            ProjectDirs::from("", "", "calofit").context("Could not determine home directory")?;
        Self::from_vars(proj_dirs.data_dir().to_path_buf(), Vars::from_env())
    }

    fn from_vars(default_data_dir: PathBuf, vars: Vars) -> Result<Self> {
        let db_path = match vars.get("CALOFIT_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_data_dir.join("calofit.db"),
        };
        let data_dir = db_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| default_data_dir.clone(), PathBuf::from);
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let ttl_mins: u64 = vars.parse_or("REPORT_SESSION_TTL_MINS", 15)?;
        if ttl_mins == 0 {
            bail!("REPORT_SESSION_TTL_MINS must be at least 1");
        }

        Ok(Config {
            db_path,
            data_dir,
            report_session_ttl: Duration::from_secs(ttl_mins * 60),
            vars,
        })
    }

    pub fn telegram(&self) -> Result<TelegramConfig> {
        let token = self
            .vars
            .get("TELEGRAM_BOT_TOKEN")
            .or_else(|| self.vars.get("CALOFITBOT_TOKEN"))
            .map(str::to_string)
            .context("TELEGRAM_BOT_TOKEN environment variable not set")?;
        Ok(TelegramConfig {
            token,
            api_url: self
                .vars
                .get("TELEGRAM_API_URL")
                .unwrap_or(DEFAULT_TELEGRAM_API_URL)
                .trim_end_matches('/')
                .to_string(),
            poll_timeout_secs: self.vars.parse_or("TELEGRAM_POLL_TIMEOUT_SECS", 30)?,
            webhook_secret: self.vars.get("TELEGRAM_WEBHOOK_SECRET").map(str::to_string),
        })
    }

    pub fn estimator(&self) -> Result<EstimatorConfig> {
        let auth = match (
            self.vars.get("YANDEX_GPT_API_KEY"),
            self.vars.get("YANDEX_GPT_IAM_TOKEN"),
        ) {
            (Some(key), _) => YandexAuth::ApiKey(key.to_string()),
            (None, Some(token)) => {
                warn!(
                    "Using YANDEX_GPT_IAM_TOKEN; IAM tokens expire within 12 hours, \
                     after which estimates fail. Set YANDEX_GPT_API_KEY instead."
                );
                YandexAuth::IamToken(token.to_string())
            }
            (None, None) => {
                bail!("Set YANDEX_GPT_API_KEY or YANDEX_GPT_IAM_TOKEN to enable calorie estimation")
            }
        };
        Ok(EstimatorConfig {
            url: self
                .vars
                .get("YANDEX_GPT_URL")
                .unwrap_or(DEFAULT_YANDEX_GPT_URL)
                .to_string(),
            folder_id: self.vars.require("YANDEX_GPT_FOLDER_ID")?,
            model: self
                .vars
                .get("YANDEX_GPT_MODEL")
                .unwrap_or(calofit_core::estimation::DEFAULT_MODEL)
                .to_string(),
            auth,
            timeout: Duration::from_secs(self.vars.parse_or("ESTIMATION_TIMEOUT_SECS", 10)?),
        })
    }

    /// Webhook secret from the environment, else from disk, else a fresh one.
    ///
    /// Returns `(secret, newly_created)`.
    pub fn load_or_create_webhook_secret(&self, configured: Option<&str>) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        if let Some(secret) = configured {
            return Ok((secret.to_string(), false));
        }

        let path = self.data_dir.join("webhook_secret");
        if path.exists() {
            let secret =
                std::fs::read_to_string(&path).context("Failed to read webhook secret file")?;
            let secret = secret.trim().to_string();
            if !secret.is_empty() {
                return Ok((secret, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let secret = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &secret).context("Failed to write webhook secret file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set webhook secret file permissions")?;
        }
        Ok((secret, true))
    }
}
