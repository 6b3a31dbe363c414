use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub action_token_secret: String,
    pub notification_webhook_url: Option<String>,
    pub public_base_url: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            // Falls back to the JWT secret so a minimal deployment only needs
            // the Supabase variables.
            action_token_secret: env::var("ACTION_TOKEN_SECRET")
                .or_else(|_| env::var("SUPABASE_JWT_SECRET"))
                .unwrap_or_else(|_| {
                    warn!("ACTION_TOKEN_SECRET not set, using empty value");
                    String::new()
                }),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL").ok(),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("PUBLIC_BASE_URL not set, using default");
                    "http://localhost:3000".to_string()
                }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_notifications_configured(&self) -> bool {
        self.notification_webhook_url
            .as_deref()
            .map(|url| !url.is_empty())
            .unwrap_or(false)
    }
}
