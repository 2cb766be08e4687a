// Environment-derived configuration for the gateway.

use once_cell::sync::Lazy;

// Application name from environment or default
pub static APP_NAME: Lazy<String> =
    Lazy::new(|| std::env::var("APP_NAME").unwrap_or_else(|_| "quelle".to_string()));

// HTTP port for the API server
pub static HTTP_PORT: Lazy<u16> = Lazy::new(get_available_port);

/// Find an available port for the API server
/// Tries PORT environment variable first, then 8080, then a random available port
pub fn get_available_port() -> u16 {
    if let Ok(port_str) = std::env::var("PORT") {
        if let Ok(port) = port_str.parse::<u16>() {
            return port;
        }
    }

    if std::net::TcpListener::bind("127.0.0.1:8080").is_ok() {
        return 8080;
    }

    portpicker::pick_unused_port().unwrap_or(3000)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// External service credentials. A missing key is not fatal at startup;
// calls against the unconfigured provider fail upstream and are
// classified at the route boundary.
pub static DATABASE_URL: Lazy<Option<String>> = Lazy::new(|| env_opt("DATABASE_URL"));
pub static OPENAI_API_KEY: Lazy<Option<String>> = Lazy::new(|| env_opt("OPENAI_API_KEY"));
pub static ANTHROPIC_API_KEY: Lazy<Option<String>> = Lazy::new(|| env_opt("ANTHROPIC_API_KEY"));
pub static REPLICATE_API_TOKEN: Lazy<Option<String>> = Lazy::new(|| env_opt("REPLICATE_API_TOKEN"));
pub static GOOGLE_AI_API_KEY: Lazy<Option<String>> = Lazy::new(|| env_opt("GOOGLE_AI_API_KEY"));
pub static DID_API_KEY: Lazy<Option<String>> = Lazy::new(|| env_opt("DID_API_KEY"));
pub static STRIPE_SECRET_KEY: Lazy<Option<String>> = Lazy::new(|| env_opt("STRIPE_SECRET_KEY"));
pub static STRIPE_WEBHOOK_SECRET: Lazy<Option<String>> =
    Lazy::new(|| env_opt("STRIPE_WEBHOOK_SECRET"));

// Shared secret for verifying bearer tokens issued by the managed backend.
// When unset, requests are treated as anonymous.
pub static JWT_SECRET: Lazy<Option<String>> = Lazy::new(|| env_opt("QUELLE_JWT_SECRET"));

// Default models per capability
pub static CHAT_MODEL: Lazy<String> =
    Lazy::new(|| std::env::var("QUELLE_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()));
pub static ENHANCE_MODEL: Lazy<String> = Lazy::new(|| {
    std::env::var("QUELLE_ENHANCE_MODEL")
        .unwrap_or_else(|_| "claude-3-5-sonnet-latest".to_string())
});
pub static IMAGE_MODEL: Lazy<String> = Lazy::new(|| {
    std::env::var("QUELLE_IMAGE_MODEL")
        .unwrap_or_else(|_| "black-forest-labs/flux-1.1-pro".to_string())
});
pub static VISION_MODEL: Lazy<String> = Lazy::new(|| {
    std::env::var("QUELLE_VISION_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string())
});

// Conversation orchestrator caps
pub static HISTORY_CAP: Lazy<usize> = Lazy::new(|| env_parse("QUELLE_HISTORY_CAP", 40));
pub static REFERENCE_IMAGE_CAP: Lazy<usize> =
    Lazy::new(|| env_parse("QUELLE_REFERENCE_IMAGE_CAP", 8));
pub static SESSION_IDLE_SECS: Lazy<i64> = Lazy::new(|| env_parse("QUELLE_SESSION_IDLE_SECS", 1800));

// Bounded polling for asynchronous provider jobs (image predictions, talks)
pub static POLL_INTERVAL_MS: Lazy<u64> = Lazy::new(|| env_parse("QUELLE_POLL_INTERVAL_MS", 2000));
pub static POLL_MAX_ATTEMPTS: Lazy<u32> = Lazy::new(|| env_parse("QUELLE_POLL_MAX_ATTEMPTS", 30));

// Checkout redirect targets
pub static CHECKOUT_SUCCESS_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("QUELLE_CHECKOUT_SUCCESS_URL")
        .unwrap_or_else(|_| "https://app.quelle.ai/billing/success".to_string())
});
pub static CHECKOUT_CANCEL_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("QUELLE_CHECKOUT_CANCEL_URL")
        .unwrap_or_else(|_| "https://app.quelle.ai/billing".to_string())
});

/// Configured Stripe price id override for a plan/cycle pair, e.g.
/// QUELLE_STRIPE_PRICE_PRO_MONTHLY.
pub fn stripe_price_override(plan: &str, billing_cycle: &str) -> Option<String> {
    let key = format!(
        "QUELLE_STRIPE_PRICE_{}_{}",
        plan.to_uppercase(),
        billing_cycle.to_uppercase()
    );
    env_opt(&key)
}
