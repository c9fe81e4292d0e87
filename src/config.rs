use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use teloxide::types::UserId;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Telegram storefront and support bot")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the bot (default)
    Run,
    /// Load categories and products from a JSON file
    ImportCatalog {
        path: PathBuf,
    },
    /// Write the warranty spreadsheet and exit
    Export {
        path: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct Config {
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true, default_value = "")]
    pub token: String,
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://storefront.db?mode=rwc")]
    pub db_url: String,
    #[arg(long, env = "ADMIN_IDS", value_delimiter = ',')]
    pub admins: Vec<u64>,
    #[arg(long, env = "OWNER_ID")]
    pub owner: Option<u64>,
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<url::Url>,
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,
    #[arg(long, env = "ADMIN_SECRET", hide_env_values = true, default_value = "")]
    pub secret: String,
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,
    #[arg(long, env = "VISION_MODEL", default_value = "gpt-4o-mini")]
    pub vision_model: String,
    #[arg(long, env = "SYSTEM_PROMPT", default_value = crate::bots::shop::res::SYSTEM_PROMPT)]
    pub system_prompt: String,
    #[arg(long, env = "SESSION_TTL_HOURS", default_value_t = 24)]
    pub session_ttl_hours: i64,
    #[arg(long, env = "MAX_SCREENSHOT_ATTEMPTS", default_value_t = 5)]
    pub max_screenshot_attempts: i64,
    #[arg(long, env = "EXPORT_PATH", default_value = "warranty.xlsx")]
    pub export_path: PathBuf,
    #[arg(long, env = "SUPPORT_PLATFORMS", value_delimiter = ',', default_value = "Wildberries,Ozon,Website")]
    pub platforms: Vec<String>,
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admins.contains(&user_id.0)
    }

    pub fn admin_ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.admins.iter().map(|id| UserId(*id))
    }

    /// The owner receives escalations; falls back to the first admin.
    pub fn owner_id(&self) -> Option<UserId> {
        self.owner.or_else(|| self.admins.first().copied()).map(UserId)
    }

    pub fn platform(&self, index: u8) -> Option<&str> {
        self.platforms.get(index as usize).map(String::as_str)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    pub fn session_ttl(&self) -> i64 {
        self.session_ttl_hours * 3600
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Cli::parse_from(["storefront-bot"]).config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_admin_list_and_platforms() {
        let cli = Cli::parse_from([
            "storefront-bot",
            "--admins", "1,2",
            "--platforms", "Ozon,Site",
            "import-catalog", "catalog.json",
        ]);
        assert_eq!(cli.config.admins, vec![1, 2]);
        assert!(cli.config.is_admin(UserId(2)));
        assert_eq!(cli.config.platform(1), Some("Site"));
        assert_eq!(cli.config.platform(2), None);
        assert_eq!(cli.config.owner_id(), Some(UserId(1)));
        assert!(matches!(cli.command, Some(Commands::ImportCatalog { .. })));
    }
}
