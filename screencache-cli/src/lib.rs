//! screencache CLI - shell access to a shared store
//!
//! `screencache [--config <path>] <command>`. Every command prints one JSON
//! document per line on stdout; logs go to stderr.
//!
//! A range is either a plain label (`daily`, `current`) or `@hourly`,
//! `@daily`, `@weekly` for the bucket containing the current time.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use screencache_core::config::ENV_STORE_PATH;
use screencache_core::{
    entry_age, CacheConfig, CacheEntry, CacheKey, Clock, ConfigError, Freshness, RangeLabel,
    ScreencacheError, ScreencacheResult, Segmentation, SelectionId, Timestamp, UsageAggregator,
    REPORT_TOP_N,
};
use screencache_display::{DisplayDecision, DisplayPolicy, DisplaySession};
use screencache_storage::{SharedStore, StalenessAwareSharedCache};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "screencache")]
#[command(about = "Inspect, write and clear a screencache shared store", long_about = None)]
pub struct Cli {
    /// Config file path (defaults to SCREENCACHE_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Print the entry for a key and its freshness
    Read {
        #[command(flatten)]
        key: KeyArgs,

        /// Also list the N most used records
        #[arg(long)]
        top: Option<usize>,
    },

    /// Print the latest pointer and its freshness
    Latest {
        /// Also list the N most used records
        #[arg(long)]
        top: Option<usize>,
    },

    /// Print the display decision, then the re-check outcome if one is scheduled
    Decide {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Aggregate name=measure observations and write them under a key
    Write {
        #[command(flatten)]
        key: KeyArgs,

        /// Observations such as `Safari=120`; repeated names sum
        #[arg(value_parser = parse_observation)]
        observations: Vec<(String, f64)>,
    },

    /// Remove the entry for a key
    Clear {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Record the selection the consumer is showing
    Select {
        /// Selection id, `all` for every app
        #[arg(value_parser = parse_selection)]
        selection: SelectionId,
    },

    /// Print the current selection
    Current,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct KeyArgs {
    /// Selection id, `all` for every app
    #[arg(value_parser = parse_selection)]
    pub selection: SelectionId,

    /// Range label, or `@hourly`, `@daily`, `@weekly` for the current bucket
    #[arg(value_parser = parse_range)]
    pub range: RangeArg,
}

impl KeyArgs {
    pub fn key_at(&self, now: Timestamp) -> CacheKey {
        CacheKey::derive(&self.selection, &self.range.resolve(now))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeArg {
    Label(RangeLabel),
    Bucket(Segmentation),
}

impl RangeArg {
    pub fn resolve(&self, now: Timestamp) -> RangeLabel {
        match self {
            Self::Label(label) => label.clone(),
            Self::Bucket(segmentation) => RangeLabel::bucketed(*segmentation, now),
        }
    }
}

fn parse_selection(raw: &str) -> Result<SelectionId, String> {
    Ok(if raw == "all" {
        SelectionId::All
    } else {
        SelectionId::named(raw)
    })
}

fn parse_range(raw: &str) -> Result<RangeArg, String> {
    match raw.strip_prefix('@') {
        Some("hourly") => Ok(RangeArg::Bucket(Segmentation::Hourly)),
        Some("daily") => Ok(RangeArg::Bucket(Segmentation::Daily)),
        Some("weekly") => Ok(RangeArg::Bucket(Segmentation::Weekly)),
        Some(other) => Err(format!("unknown bucket `@{other}`, expected @hourly, @daily or @weekly")),
        None => Ok(RangeArg::Label(RangeLabel::new(raw))),
    }
}

fn parse_observation(raw: &str) -> Result<(String, f64), String> {
    let (name, measure) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected name=measure, got `{raw}`"))?;
    let measure = measure
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("measure in `{raw}` is not a number"))?;
    Ok((name.to_string(), measure))
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Screencache(#[from] ScreencacheError),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Load config from `path` or `SCREENCACHE_CONFIG`, or from
/// `SCREENCACHE_STORE_PATH` alone when no file is given.
pub fn load_config(path: Option<&Path>) -> ScreencacheResult<CacheConfig> {
    match CacheConfig::load(path) {
        Err(ConfigError::MissingConfigPath) => {
            let store_path =
                std::env::var(ENV_STORE_PATH).map_err(|_| ConfigError::MissingConfigPath)?;
            let mut config = CacheConfig::new(store_path);
            config.apply_overrides(|name| std::env::var(name).ok())?;
            config.validate()?;
            Ok(config)
        }
        other => Ok(other?),
    }
}

/// Execute `command`, writing one JSON document per line to `out`.
pub async fn run_command<S, C, W>(
    cache: Arc<StalenessAwareSharedCache<S, C>>,
    policy: DisplayPolicy,
    command: Command,
    out: &mut W,
) -> Result<(), CliError>
where
    S: SharedStore,
    C: Clock,
    W: Write,
{
    let now = cache.now();
    match command {
        Command::Read { key, top } => {
            let key = key.key_at(now);
            let value = match cache.read(&key) {
                Some(entry) => {
                    let freshness = cache.classify(&entry, now, policy.freshness_window);
                    entry_json(&key, &entry, freshness, now, top)
                }
                None => json!({ "key": key.as_str(), "state": "absent" }),
            };
            emit(out, &value)
        }
        Command::Latest { top } => {
            let value = match cache.read_latest() {
                Some(entry) => {
                    let freshness = cache.classify(&entry, now, policy.latest_freshness_window);
                    entry_json(entry.source_key(), &entry, freshness, now, top)
                }
                None => json!({ "state": "absent" }),
            };
            emit(out, &value)
        }
        Command::Decide { key } => {
            let key = key.key_at(now);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut session = DisplaySession::new(cache, policy, tx);
            emit(out, &decision_json(&key, session.set_key(key.clone())))?;
            if session.has_pending_recheck() {
                if let Some(fired) = rx.recv().await {
                    if let Some(decision) = session.on_recheck(&fired) {
                        emit(out, &decision_json(&key, decision))?;
                    }
                }
            }
            Ok(())
        }
        Command::Write { key, observations } => {
            let mut aggregator = UsageAggregator::new();
            aggregator.extend(observations.iter().map(|(name, m)| (name.as_str(), *m)));
            let (payload, stats) = aggregator.finish_top(REPORT_TOP_N);
            let records = payload.len();
            let key = cache.write_for(&key.selection, &key.range.resolve(now), payload);
            info!(
                key = %key,
                observations = stats.observations,
                rejected = stats.rejected,
                "report written"
            );
            emit(
                out,
                &json!({
                    "key": key.as_str(),
                    "records": records,
                    "observations": stats.observations,
                    "rejected": stats.rejected,
                }),
            )
        }
        Command::Clear { key } => {
            let key = key.key_at(now);
            cache.clear(&key);
            emit(out, &json!({ "key": key.as_str(), "state": "cleared" }))
        }
        Command::Select { selection } => {
            cache.set_current_selection(&selection);
            emit(out, &json!({ "selection": selection.as_str() }))
        }
        Command::Current => {
            let selection = cache.current_selection();
            emit(out, &json!({ "selection": selection.as_str() }))
        }
    }
}

fn entry_json(
    key: &CacheKey,
    entry: &CacheEntry,
    freshness: Freshness,
    now: Timestamp,
    top: Option<usize>,
) -> Value {
    let mut value = json!({
        "key": key.as_str(),
        "state": freshness,
        "ageMs": entry_age(entry, now).as_millis() as u64,
        "totalMeasure": entry.total_measure(),
        "entry": entry,
    });
    if let Some(n) = top {
        value["top"] = json!(entry.top(n));
    }
    value
}

fn decision_json(key: &CacheKey, decision: &DisplayDecision) -> Value {
    let mut value = json!({
        "key": key.as_str(),
        "decision": decision.kind(),
        "treatment": decision.treatment().as_str(),
        "entry": decision.entry(),
    });
    if let Some(delay) = decision.recheck_after() {
        value["recheckAfterMs"] = json!(delay.as_millis() as u64);
    }
    if let DisplayDecision::Fallback { freshness, .. } = decision {
        value["fallbackState"] = json!(freshness);
    }
    value
}

fn emit<W: Write>(out: &mut W, value: &Value) -> Result<(), CliError> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use screencache_storage::MemorySharedStore;
    use screencache_test_utils::{instagram_payload, key, pickups_payload, t0, ManualClock};

    type TestCache = StalenessAwareSharedCache<MemorySharedStore, ManualClock>;

    fn cache() -> (Arc<TestCache>, ManualClock) {
        let clock = ManualClock::new(t0());
        let cache = StalenessAwareSharedCache::with_clock(MemorySharedStore::new(), clock.clone());
        (Arc::new(cache), clock)
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("screencache").chain(args.iter().copied())).unwrap()
    }

    async fn run(cache: &Arc<TestCache>, args: &[&str]) -> Vec<Value> {
        let mut out = Vec::new();
        run_command(
            Arc::clone(cache),
            DisplayPolicy::default(),
            parse(args).command,
            &mut out,
        )
        .await
        .unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = parse(&["read", "all", "daily", "--config", "/tmp/c.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        match cli.command {
            Command::Read { key, top } => {
                assert_eq!(key.selection, SelectionId::All);
                assert_eq!(key.range, RangeArg::Label(RangeLabel::new("daily")));
                assert_eq!(top, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_write_observations_parse() {
        match parse(&["write", "sel-A", "daily", "Safari=120", "a=b=3.5"]).command {
            Command::Write { observations, .. } => {
                assert_eq!(
                    observations,
                    vec![("Safari".to_string(), 120.0), ("a=b".to_string(), 3.5)]
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_bad_arguments_exit_with_usage_code() {
        for args in [
            vec![],
            vec!["read", "all"],
            vec!["frobnicate"],
            vec!["write", "all", "daily", "Safari"],
            vec!["write", "all", "daily", "Safari=lots"],
            vec!["read", "all", "@monthly"],
            vec!["--config"],
        ] {
            let err = Cli::try_parse_from(std::iter::once("screencache").chain(args.iter().copied()))
                .unwrap_err();
            assert_eq!(err.exit_code(), 2, "args {args:?}");
        }
    }

    #[test]
    fn test_bucket_range_resolves_against_now() {
        let range = parse_range("@daily").unwrap();
        assert_eq!(range.resolve(t0()).as_str(), "daily@2026-10-14");
        assert_eq!(parse_range("@weekly").unwrap().resolve(t0()).as_str(), "weekly@2026-W42");
        assert_eq!(parse_range("current").unwrap().resolve(t0()).as_str(), "current");
    }

    #[tokio::test]
    async fn test_write_then_read_and_latest() {
        let (cache, _clock) = cache();
        let written = run(
            &cache,
            &["write", "sel-A", "daily", "Safari=100", "Instagram=1800", "Safari=50", "X=-1"],
        )
        .await;
        assert_eq!(written[0]["records"], 2);
        assert_eq!(written[0]["rejected"], 1);

        let read = run(&cache, &["read", "sel-A", "daily"]).await;
        assert_eq!(read[0]["state"], "fresh");
        assert_eq!(read[0]["totalMeasure"], 1950.0);
        assert_eq!(read[0]["entry"]["payload"][0]["name"], "Instagram");
        assert_eq!(read[0]["entry"]["payload"][1]["measure"], 150.0);
        assert!(read[0].get("top").is_none());

        let latest = run(&cache, &["latest"]).await;
        assert_eq!(latest[0]["key"], "sel-A|daily");
    }

    #[tokio::test]
    async fn test_bucketed_writes_share_a_key_within_the_day() {
        let (cache, clock) = cache();
        let first = run(&cache, &["write", "sel-A", "@daily", "Safari=10"]).await;
        assert_eq!(first[0]["key"], "sel-A|daily@2026-10-14");

        clock.advance_secs(3 * 3600);
        let second = run(&cache, &["write", "sel-A", "@daily", "Safari=20"]).await;
        assert_eq!(second[0]["key"], first[0]["key"]);

        let read = run(&cache, &["read", "sel-A", "daily@2026-10-14"]).await;
        assert_eq!(read[0]["entry"]["payload"][0]["measure"], 20.0);

        clock.advance_secs(24 * 3600);
        let next_day = run(&cache, &["read", "sel-A", "@daily"]).await;
        assert_eq!(next_day[0]["state"], "absent");
    }

    #[tokio::test]
    async fn test_pickups_report_top_records() {
        let (cache, _clock) = cache();
        cache.write(&key("all_apps", "pickups"), pickups_payload());

        let read = run(&cache, &["read", "all", "pickups", "--top", "1"]).await;
        assert_eq!(read[0]["totalMeasure"], 59.0);
        assert_eq!(read[0]["top"].as_array().map(Vec::len), Some(1));
        assert_eq!(read[0]["top"][0]["name"], "Messages");

        let latest = run(&cache, &["latest", "--top", "5"]).await;
        assert_eq!(latest[0]["top"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_read_absent_then_clear() {
        let (cache, _clock) = cache();
        let read = run(&cache, &["read", "sel-A", "daily"]).await;
        assert_eq!(read[0]["state"], "absent");

        cache.write(&key("sel-A", "daily"), instagram_payload());
        let cleared = run(&cache, &["clear", "sel-A", "daily"]).await;
        assert_eq!(cleared[0]["state"], "cleared");
        assert_eq!(run(&cache, &["latest"]).await[0]["state"], "absent");
    }

    #[tokio::test(start_paused = true)]
    async fn test_decide_stale_reports_recheck_outcome() {
        let (cache, clock) = cache();
        cache.write(&key("sel-A", "daily"), instagram_payload());
        clock.advance_secs(31);

        let lines = run(&cache, &["decide", "sel-A", "daily"]).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["treatment"], "refreshing");
        assert_eq!(lines[0]["recheckAfterMs"], 2_500);
        assert_eq!(lines[1]["treatment"], "outdated");
    }

    #[tokio::test]
    async fn test_decide_empty_and_fallback() {
        let (cache, _clock) = cache();
        let empty = run(&cache, &["decide", "sel-A", "daily"]).await;
        assert_eq!(empty[0]["decision"], "empty");
        assert!(empty[0]["entry"].is_null());

        cache.write(&key("sel-B", "daily"), instagram_payload());
        let fallback = run(&cache, &["decide", "sel-A", "daily"]).await;
        assert_eq!(fallback[0]["treatment"], "placeholder");
        assert_eq!(fallback[0]["entry"]["sourceKey"], "sel-B|daily");
        assert_eq!(fallback[0]["fallbackState"], "fresh");
    }

    #[tokio::test]
    async fn test_select_and_current() {
        let (cache, _clock) = cache();
        assert_eq!(run(&cache, &["current"]).await[0]["selection"], "all_apps");
        run(&cache, &["select", "sel-A"]).await;
        assert_eq!(run(&cache, &["current"]).await[0]["selection"], "sel-A");
    }

    #[test]
    fn test_missing_config_is_config_error() {
        let err = CliError::from(ScreencacheError::from(ConfigError::MissingConfigPath));
        assert!(err.to_string().contains("Config error"));
    }
}
