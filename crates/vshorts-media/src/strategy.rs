//! Download strategies and the process-wide strategy registry.
//!
//! A strategy is one way of presenting ourselves to the remote platform:
//! user agent, referer, headers, player client and format ladder. The
//! registry is immutable and ordered by priority.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::error::{MediaError, MediaResult};

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";
const ANDROID_UA: &str = "com.google.android.youtube/19.09.37 (Linux; U; Android 14) gzip";
const GOOGLEBOT_UA: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

/// JSON printed on stdout once the final file is in place.
pub const AFTER_MOVE_TEMPLATE: &str = "after_move:%(.{id,title,duration,filepath,thumbnail})j";

/// Which client the retrieval tool impersonates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievalMode {
    Web,
    MobileWeb,
    Android,
    Embedded,
    /// No extractor arguments at all
    Basic,
}

impl RetrievalMode {
    /// `player_client` extractor argument for this mode.
    pub fn player_client(&self) -> Option<&'static str> {
        match self {
            RetrievalMode::Web => Some("web"),
            RetrievalMode::MobileWeb => Some("mweb"),
            RetrievalMode::Android => Some("android"),
            RetrievalMode::Embedded => Some("web_embedded"),
            RetrievalMode::Basic => None,
        }
    }
}

/// One named retrieval configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadStrategy {
    pub name: String,
    /// Lower runs first
    pub priority: u32,
    pub user_agent: String,
    pub referer: Option<String>,
    pub headers: Vec<(String, String)>,
    pub mode: RetrievalMode,
    /// yt-dlp format selector
    pub format: String,
    /// Wall-clock limit for one attempt
    pub attempt_timeout: Duration,
    /// Random sleep bounds in seconds before each download
    pub sleep_interval: Option<(u32, u32)>,
    /// Socket read/connect timeout in seconds
    pub socket_timeout: u32,
    /// Retries performed inside the tool itself
    pub tool_retries: u32,
    /// Cap on attempts of this strategy within one run
    pub max_attempts: u32,
    pub relax_certificates: bool,
}

impl DownloadStrategy {
    pub fn new(name: impl Into<String>, priority: u32, mode: RetrievalMode) -> Self {
        Self {
            name: name.into(),
            priority,
            user_agent: CHROME_UA.to_string(),
            referer: None,
            headers: Vec::new(),
            mode,
            format: "best".to_string(),
            attempt_timeout: Duration::from_secs(600),
            sleep_interval: None,
            socket_timeout: 30,
            tool_retries: 3,
            max_attempts: 4,
            relax_certificates: false,
        }
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_sleep_interval(mut self, min_secs: u32, max_secs: u32) -> Self {
        self.sleep_interval = Some((min_secs, max_secs.max(min_secs)));
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_tool_retries(mut self, retries: u32) -> Self {
        self.tool_retries = retries;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn relax_certificates(mut self) -> Self {
        self.relax_certificates = true;
        self
    }

    /// Full yt-dlp argument list for one attempt against `address`.
    pub fn tool_args(&self, address: &str, output_template: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--no-playlist".into(),
            "--no-progress".into(),
            "--no-simulate".into(),
            "-O".into(),
            AFTER_MOVE_TEMPLATE.into(),
            "--user-agent".into(),
            self.user_agent.clone(),
        ];

        if let Some(referer) = &self.referer {
            args.push("--referer".into());
            args.push(referer.clone());
        }
        for (name, value) in &self.headers {
            args.push("--add-header".into());
            args.push(format!("{name}:{value}"));
        }
        if let Some((min, max)) = self.sleep_interval {
            args.extend([
                "--sleep-interval".into(),
                min.to_string(),
                "--max-sleep-interval".into(),
                max.to_string(),
            ]);
        }
        if let Some(client) = self.mode.player_client() {
            args.push("--extractor-args".into());
            args.push(format!("youtube:player_client={client}"));
        }
        if self.relax_certificates {
            args.push("--no-check-certificates".into());
        }

        args.extend([
            "--retries".into(),
            self.tool_retries.to_string(),
            "--extractor-retries".into(),
            self.tool_retries.to_string(),
            "--fragment-retries".into(),
            self.tool_retries.to_string(),
            "--socket-timeout".into(),
            self.socket_timeout.to_string(),
            "--concurrent-fragments".into(),
            "1".into(),
            "-f".into(),
            self.format.clone(),
            "--merge-output-format".into(),
            "mp4".into(),
            "-o".into(),
            output_template.to_string_lossy().into_owned(),
            "--".into(),
            address.to_string(),
        ]);
        args
    }
}

/// The compiled-in strategy ladder, in priority order.
pub fn default_strategies() -> Vec<DownloadStrategy> {
    vec![
        DownloadStrategy::new("desktop_web", 10, RetrievalMode::Web)
            .with_referer("https://www.youtube.com/")
            .with_header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .with_header("Accept-Language", "en-US,en;q=0.5")
            .with_header("DNT", "1")
            .with_format("best[height<=720][ext=mp4]/best[height<=480][ext=mp4]/best[ext=mp4]")
            .with_sleep_interval(10, 20),
        DownloadStrategy::new("mobile_web", 20, RetrievalMode::MobileWeb)
            .with_user_agent(IPHONE_UA)
            .with_referer("https://m.youtube.com/")
            .with_header("Accept-Language", "en-US,en;q=0.9")
            .with_format("best[height<=720]/best[height<=480]/best[height<=360]")
            .with_sleep_interval(5, 10),
        DownloadStrategy::new("android_client", 30, RetrievalMode::Android)
            .with_user_agent(ANDROID_UA)
            .with_format("worst[height>=360]/worst")
            .with_sleep_interval(5, 10),
        DownloadStrategy::new("embedded_player", 40, RetrievalMode::Embedded)
            .with_referer("https://www.youtube-nocookie.com/")
            .with_format("best/worst"),
        DownloadStrategy::new("basic_fallback", 50, RetrievalMode::Basic)
            .with_user_agent(GOOGLEBOT_UA)
            .with_format("best")
            .with_tool_retries(1)
            .with_max_attempts(2)
            .relax_certificates(),
    ]
}

/// Ordered, read-only set of strategies.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: Vec<DownloadStrategy>,
}

static GLOBAL: OnceLock<Arc<StrategyRegistry>> = OnceLock::new();

impl StrategyRegistry {
    /// Build a registry, sorted by priority. Rejects an empty list and
    /// duplicate names.
    pub fn new(strategies: Vec<DownloadStrategy>) -> MediaResult<Self> {
        if strategies.is_empty() {
            return Err(MediaError::internal("strategy registry is empty"));
        }
        let mut seen = HashSet::new();
        for strategy in &strategies {
            if !seen.insert(strategy.name.as_str()) {
                return Err(MediaError::internal(format!(
                    "duplicate strategy name: {}",
                    strategy.name
                )));
            }
        }
        Ok(Self::sorted(strategies))
    }

    fn sorted(mut strategies: Vec<DownloadStrategy>) -> Self {
        strategies.sort_by_key(|s| s.priority);
        Self { strategies }
    }

    /// Process-wide default registry, built on first use.
    pub fn global() -> Arc<StrategyRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::sorted(default_strategies()))))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DownloadStrategy> {
        self.strategies.iter()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DownloadStrategy> {
        self.strategies.iter().find(|s| s.name == name)
    }

    /// Lowest-priority strategy; used for the alternative-address pass.
    pub fn last(&self) -> Option<&DownloadStrategy> {
        self.strategies.last()
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_global_registry_order() {
        let registry = StrategyRegistry::global();
        assert_eq!(
            registry.names(),
            vec![
                "desktop_web",
                "mobile_web",
                "android_client",
                "embedded_player",
                "basic_fallback"
            ]
        );
        assert_eq!(registry.last().unwrap().user_agent, GOOGLEBOT_UA);
    }

    #[test]
    fn test_registry_sorts_and_validates() {
        let registry = StrategyRegistry::new(vec![
            DownloadStrategy::new("b", 2, RetrievalMode::Basic),
            DownloadStrategy::new("a", 1, RetrievalMode::Web),
        ])
        .unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);

        assert!(StrategyRegistry::new(vec![]).is_err());
        assert!(StrategyRegistry::new(vec![
            DownloadStrategy::new("a", 1, RetrievalMode::Web),
            DownloadStrategy::new("a", 2, RetrievalMode::Web),
        ])
        .is_err());
    }

    #[test]
    fn test_tool_args_cover_network_presentation() {
        let registry = StrategyRegistry::global();
        let strategy = registry.get("desktop_web").unwrap();
        let args = strategy.tool_args("https://youtu.be/dQw4w9WgXcQ", &PathBuf::from("/w/source.%(ext)s"));

        assert_eq!(value_after(&args, "--user-agent"), Some(CHROME_UA));
        assert_eq!(value_after(&args, "--referer"), Some("https://www.youtube.com/"));
        assert_eq!(value_after(&args, "--sleep-interval"), Some("10"));
        assert_eq!(value_after(&args, "--max-sleep-interval"), Some("20"));
        assert_eq!(value_after(&args, "--socket-timeout"), Some("30"));
        assert_eq!(value_after(&args, "--retries"), Some("3"));
        assert_eq!(value_after(&args, "--extractor-args"), Some("youtube:player_client=web"));
        assert_eq!(value_after(&args, "-O"), Some(AFTER_MOVE_TEMPLATE));
        assert_eq!(value_after(&args, "-o"), Some("/w/source.%(ext)s"));
        assert!(args.contains(&"Accept-Language:en-US,en;q=0.5".to_string()));
        assert!(!args.contains(&"--no-check-certificates".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/dQw4w9WgXcQ"));
    }

    #[test]
    fn test_basic_fallback_args() {
        let registry = StrategyRegistry::global();
        let strategy = registry.get("basic_fallback").unwrap();
        let args = strategy.tool_args("https://example.com/v", &PathBuf::from("/w/source.%(ext)s"));
        assert!(args.contains(&"--no-check-certificates".to_string()));
        assert!(!args.contains(&"--extractor-args".to_string()));
        assert_eq!(value_after(&args, "--retries"), Some("1"));
        assert_eq!(value_after(&args, "-f"), Some("best"));
    }
}
