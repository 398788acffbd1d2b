// ai
//! 📅 Date patterns: turning `logs-%{yyyy.MM.dd}` into `logs-2024.03.15`.
//!
//! 🎬 *[a config file ships with `logs-%{yyyy-MM}-%{HH}`. nobody reviewed it.]*
//! *[the resolver reads it once, at construction, and says no.]*
//!
//! An alias expression is a literal prefix followed by at most one `%{...}` block that
//! holds a Java-style date pattern (`yyyy`, `MM`, `dd`, `HH`, `DDD`, `ww`, ...). The
//! block must be the suffix of the expression and must not be finer than one hour,
//! because an index per minute is not a strategy, it's an incident.
//!
//! Everything is validated in [`AliasExpression::parse`], before a single byte goes
//! anywhere near the cluster. Resolution after that cannot fail.
//!
//! 🧠 Knowledge graph:
//! - Java letters are translated to `chrono` strftime once, then re-checked with
//!   `StrftimeItems` so a bad translation is a config error, not a panic at format time.
//! - Time comes from a [`Clock`] so tests can stand at 2024-03-15T00:00:00Z forever.

use std::fmt::Debug;
use std::sync::Mutex;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, Utc};

use crate::errors::{Result, SinkError};

const PATTERN_START: &str = "%{";
const PATTERN_END: char = '}';

/// 🚫 Characters that make an index name unacceptable to the cluster.
pub const INVALID_INDEX_CHARS: [char; 11] = ['#', '\\', '/', '*', '?', '"', '<', '>', '|', ',', ':'];

/// ⏱️ Pattern letters finer than an hour: minute, second, fraction, milli-of-day, nanos.
const SUB_HOUR_LETTERS: [char; 6] = ['m', 's', 'S', 'A', 'n', 'N'];

/// 🕰️ Where "now" comes from.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 🕰️ The real wall clock, in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 🧊 A clock that says whatever you told it last. Dry runs and tests.
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        match self.instant.lock() {
            Ok(mut guard) => *guard = instant,
            Err(poisoned) => *poisoned.into_inner() = instant,
        }
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.instant.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// 🏷️ A validated index alias expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasExpression {
    raw: String,
    prefix: String,
    pattern: Option<DatePattern>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DatePattern {
    /// The pattern as written, e.g. `yyyy.MM.dd`.
    source: String,
    /// Same pattern in strftime, e.g. `%Y.%m.%d`.
    strftime: String,
}

impl AliasExpression {
    /// 🔍 Parse and validate. Every rule is checked here so resolution can't fail later.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(SinkError::config("index alias must not be empty"));
        }

        let Some(start) = raw.find(PATTERN_START) else {
            validate_literal(raw, raw)?;
            return Ok(Self {
                raw: raw.to_string(),
                prefix: raw.to_string(),
                pattern: None,
            });
        };

        let inner_start = start + PATTERN_START.len();
        let Some(close) = raw[inner_start..].find(PATTERN_END) else {
            return Err(SinkError::config(format!(
                "unterminated date-time pattern in index alias '{raw}'"
            )));
        };
        let pattern = &raw[inner_start..inner_start + close];
        let after = &raw[inner_start + close + 1..];

        if pattern.contains(PATTERN_START) {
            return Err(SinkError::config(format!(
                "index alias '{raw}' nests one date-time pattern inside another"
            )));
        }
        if after.contains(PATTERN_START) {
            return Err(SinkError::config(format!(
                "index alias '{raw}' has more than one date-time pattern; only one is allowed"
            )));
        }
        if !after.is_empty() {
            return Err(SinkError::config(format!(
                "the date-time pattern in index alias '{raw}' must be its suffix"
            )));
        }

        let prefix = &raw[..start];
        validate_literal(raw, prefix)?;
        let strftime = translate_pattern(raw, pattern)?;

        Ok(Self {
            raw: raw.to_string(),
            prefix: prefix.to_string(),
            pattern: Some(DatePattern {
                source: pattern.to_string(),
                strftime,
            }),
        })
    }

    /// The expression exactly as configured.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Everything before the date pattern (the whole thing when there is none).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn has_date_pattern(&self) -> bool {
        self.pattern.is_some()
    }

    /// The `%{...}` contents, if any.
    pub fn date_pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(|p| p.source.as_str())
    }

    /// Prefix with its trailing dash removed. Used for template, policy and rollover names.
    pub fn base_name(&self) -> &str {
        self.prefix.strip_suffix('-').unwrap_or(&self.prefix)
    }

    /// 📜 `logs-%{yyyy}` → `logs-index-template`.
    pub fn template_name(&self) -> String {
        format!("{}-index-template", self.base_name())
    }

    /// 📅 Concrete name at `instant`.
    pub fn resolve_at(&self, instant: DateTime<Utc>) -> String {
        match &self.pattern {
            Some(pattern) => format!("{}{}", self.prefix, instant.format(&pattern.strftime)),
            None => self.prefix.clone(),
        }
    }

    /// 📅 Concrete name right now, according to `clock`.
    pub fn resolve(&self, clock: &dyn Clock) -> String {
        self.resolve_at(clock.now())
    }
}

/// 🧽 Lower-case the literal part of an alias expression and strip characters the cluster
/// would reject. The `%{...}` suffix is left as written so date patterns survive.
pub fn normalize_alias(raw: &str) -> String {
    let (literal, suffix) = match raw.find(PATTERN_START) {
        Some(start) => raw.split_at(start),
        None => (raw, ""),
    };
    let cleaned: String = literal
        .chars()
        .filter(|c| !INVALID_INDEX_CHARS.contains(c) && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    let cleaned = cleaned.trim_start_matches(['-', '_', '+']);
    format!("{cleaned}{suffix}")
}

fn validate_literal(raw: &str, literal: &str) -> Result<()> {
    if let Some(bad) = literal
        .chars()
        .find(|c| INVALID_INDEX_CHARS.contains(c) || c.is_whitespace())
    {
        return Err(SinkError::config(format!(
            "index alias '{raw}' contains the character '{bad}', which is not allowed in index names"
        )));
    }
    Ok(())
}

/// 🔄 Java `DateTimeFormatter` letters → strftime. Validates as it goes.
fn translate_pattern(raw: &str, pattern: &str) -> Result<String> {
    if pattern.is_empty() {
        return Err(SinkError::config(format!(
            "index alias '{raw}' has an empty date-time pattern"
        )));
    }
    if let Some(bad) = pattern
        .chars()
        .find(|c| INVALID_INDEX_CHARS.contains(c) || c.is_whitespace())
    {
        return Err(SinkError::config(format!(
            "date-time pattern '{pattern}' contains the character '{bad}', which is not allowed in index names"
        )));
    }
    if pattern.chars().any(|c| SUB_HOUR_LETTERS.contains(&c)) {
        return Err(SinkError::config(format!(
            "date-time pattern '{pattern}' is finer than one hour; minute, second and smaller fields are not supported"
        )));
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            // 🔤 quoted literal; '' is an escaped quote
            let mut j = i + 1;
            let mut literal = String::new();
            loop {
                match chars.get(j) {
                    None => {
                        return Err(SinkError::config(format!(
                            "date-time pattern '{pattern}' has an unterminated quote"
                        )));
                    }
                    Some('\'') if chars.get(j + 1) == Some(&'\'') => {
                        literal.push('\'');
                        j += 2;
                    }
                    Some('\'') => break,
                    Some(other) => {
                        literal.push(*other);
                        j += 1;
                    }
                }
            }
            if i + 1 == j {
                out.push('\'');
            }
            push_literal(&mut out, &literal);
            i = j + 1;
            continue;
        }
        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, &c.to_string());
            i += 1;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let spec = match (c, run) {
            ('y' | 'u', 2) => "%y",
            ('y' | 'u', _) => "%Y",
            ('Y', 2) => "%g",
            ('Y', _) => "%G",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('D', 1 | 2) => "%-j",
            ('D', _) => "%j",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('w', 1) => "%-V",
            ('w', _) => "%V",
            ('e', _) => "%u",
            (other, _) => {
                return Err(SinkError::config(format!(
                    "date-time pattern '{pattern}' uses the unsupported field letter '{other}'"
                )));
            }
        };
        out.push_str(spec);
        i += run;
    }

    if StrftimeItems::new(&out).any(|item| matches!(item, Item::Error)) {
        return Err(SinkError::config(format!(
            "date-time pattern '{pattern}' could not be turned into a formatter"
        )));
    }
    Ok(out)
}

fn push_literal(out: &mut String, literal: &str) {
    for c in literal.chars() {
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn march_15() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).single().expect("valid date")
    }

    #[test]
    fn the_one_where_logs_in_march_land_in_the_march_index() -> Result<()> {
        let alias = AliasExpression::parse("logs-%{yyyy-MM}")?;
        let clock = FixedClock::new(march_15());

        assert_eq!(alias.resolve(&clock), "logs-2024-03");
        assert_eq!(alias.prefix(), "logs-");
        assert_eq!(alias.template_name(), "logs-index-template");
        Ok(())
    }

    #[test]
    fn the_one_where_the_same_second_gives_the_same_name_and_midnight_changes_it() -> Result<()> {
        let alias = AliasExpression::parse("osink-%{yyyy.MM.dd}")?;
        let clock = FixedClock::new(march_15() - Duration::seconds(1));

        let first = alias.resolve(&clock);
        assert_eq!(first, alias.resolve(&clock));
        assert_eq!(first, "osink-2024.03.14");

        clock.advance(Duration::seconds(1));
        assert_eq!(alias.resolve(&clock), "osink-2024.03.15");
        Ok(())
    }

    #[test]
    fn the_one_where_two_patterns_are_one_too_many() {
        let err = AliasExpression::parse("logs-%{yyyy}-%{MM}").unwrap_err();
        assert!(err.is_fatal_configuration());
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn the_one_where_patterns_inside_patterns_are_turned_away() {
        let err = AliasExpression::parse("logs-%{%{yyyy.MM.dd}}").unwrap_err();
        assert!(err.to_string().contains("nests"));
    }

    #[test]
    fn the_one_where_the_pattern_must_be_the_suffix() {
        assert!(AliasExpression::parse("logs-%{yyyy}-archive").is_err());
    }

    #[test]
    fn the_one_where_a_hash_in_the_name_is_rejected() {
        let err = AliasExpression::parse("events#bad").unwrap_err();
        assert!(err.is_fatal_configuration());
        assert!(err.to_string().contains('#'));
    }

    #[test]
    fn the_one_where_minutes_are_too_granular() {
        assert!(AliasExpression::parse("logs-%{yyyy.MM.dd.HH.mm}").is_err());
        assert!(AliasExpression::parse("logs-%{yyyy.MM.dd.HH}").is_ok());
    }

    #[test]
    fn the_one_where_special_chars_in_the_pattern_fail_too() {
        assert!(AliasExpression::parse("logs-%{yyyy/MM}").is_err());
        assert!(AliasExpression::parse("logs-%{yyyy|MM}").is_err());
    }

    #[test]
    fn the_one_where_quoted_literals_and_day_of_year_format_correctly() -> Result<()> {
        let alias = AliasExpression::parse("logs-%{yyyy'w'ww.DDD}")?;
        assert_eq!(alias.resolve_at(march_15()), "logs-2024w11.075");
        Ok(())
    }

    #[test]
    fn the_one_where_an_unknown_letter_is_a_config_error() {
        let err = AliasExpression::parse("logs-%{yyyy.QQ}").unwrap_err();
        assert!(err.to_string().contains("'Q'"));
    }

    #[test]
    fn the_one_where_plain_aliases_resolve_to_themselves() -> Result<()> {
        let alias = AliasExpression::parse("metrics")?;
        assert!(!alias.has_date_pattern());
        assert_eq!(alias.resolve_at(march_15()), "metrics");
        assert_eq!(alias.base_name(), "metrics");
        Ok(())
    }

    #[test]
    fn the_one_where_normalizing_cleans_the_literal_but_spares_the_pattern() {
        assert_eq!(normalize_alias("-Tenant#A B-%{yyyy.MM}"), "tenantab-%{yyyy.MM}");
        assert_eq!(normalize_alias("Plain"), "plain");
    }
}
