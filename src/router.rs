//! Router: a pure function from a [`FileEvent`] to an ordered list of
//! [`DestinationPlan`]s. Rules are scanned in declared order; the first
//! match wins.

use chrono::Utc;
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use crate::config::DestinationsConfig;
use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::{DestinationKind, DestinationOptions, DestinationPlan, FileEvent, RoutingRule};

/// A routing rule with its glob/regex matchers pre-compiled once at
/// config-load time, never per event.
pub struct CompiledRule {
    rule: RoutingRule,
    path_glob: Option<GlobMatcher>,
    path_regex: Option<Regex>,
}

impl CompiledRule {
    pub fn compile(rule: RoutingRule) -> FileHorizonResult<Self> {
        let path_glob = rule
            .path_glob
            .as_deref()
            .map(|pattern| {
                GlobBuilder::new(pattern)
                    .case_insensitive(true)
                    .literal_separator(true)
                    .build()
                    .map(|g| g.compile_matcher())
                    .map_err(|e| FileHorizonError::Configuration {
                        field: "routing.rules.path_glob".to_string(),
                        message: e.to_string(),
                    })
            })
            .transpose()?;

        let path_regex = rule
            .path_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| FileHorizonError::Configuration {
                field: "routing.rules.path_regex".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            rule,
            path_glob,
            path_regex,
        })
    }

    fn matches(&self, event: &FileEvent) -> bool {
        if let Some(protocol) = self.rule.protocol {
            if protocol != event.protocol {
                return false;
            }
        }

        if let Some(glob) = &self.path_glob {
            let normalized = normalize_for_glob(&event.metadata.source_path);
            if !glob.is_match(normalized) {
                return false;
            }
        }

        if let Some(regex) = &self.path_regex {
            if !regex.is_match(&event.metadata.source_path) {
                return false;
            }
        }

        // `source_name` matching is reserved for future use (spec §4.5); a
        // rule naming it never matches until source names are threaded
        // through FileEvent.
        if self.rule.source_name.is_some() {
            return false;
        }

        true
    }
}

/// Strip scheme prefix, drive letter, and leading slash for glob matching.
fn normalize_for_glob(path: &str) -> String {
    let without_scheme = path.split("://").last().unwrap_or(path);
    let without_drive = without_scheme
        .strip_prefix(|c: char| c.is_ascii_alphabetic())
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(without_scheme);
    without_drive.trim_start_matches('/').to_string()
}

/// Render a rename pattern, substituting `{fileName}` and `{yyyyMMdd}` (UTC).
pub fn render_rename_pattern(pattern: &str, source_path: &str) -> String {
    let file_name = source_path
        .rsplit('/')
        .next()
        .unwrap_or(source_path)
        .to_string();
    let date = Utc::now().format("%Y%m%d").to_string();
    pattern
        .replace("{fileName}", &file_name)
        .replace("{yyyyMMdd}", &date)
}

/// Route an event against the compiled rule set and the destinations
/// config, resolving destination names to their concrete kind.
pub fn route(
    event: &FileEvent,
    rules: &[CompiledRule],
    destinations: &DestinationsConfig,
) -> FileHorizonResult<Vec<DestinationPlan>> {
    let matched = rules.iter().find(|r| r.matches(event));

    let compiled = matched.ok_or_else(|| FileHorizonError::NoRuleMatched {
        event_id: event.id.clone(),
    })?;

    let mut plans = Vec::with_capacity(compiled.rule.destinations.len());
    for destination_name in &compiled.rule.destinations {
        let kind = resolve_kind(destination_name, destinations)?;
        let file_name = compiled
            .rule
            .rename_pattern
            .as_deref()
            .map(|pattern| render_rename_pattern(pattern, &event.metadata.source_path))
            .unwrap_or_else(|| {
                event
                    .metadata
                    .source_path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&event.metadata.source_path)
                    .to_string()
            });

        let is_topic = destinations
            .bus
            .iter()
            .find(|b| &b.name == destination_name)
            .map(|b| b.is_topic);

        plans.push(DestinationPlan {
            destination_name: destination_name.clone(),
            target_path: file_name,
            options: DestinationOptions {
                overwrite: compiled.rule.overwrite,
                compute_hash: false,
                rename_pattern: compiled.rule.rename_pattern.clone(),
            },
            kind,
            is_topic,
        });
    }

    Ok(plans)
}

fn resolve_kind(
    destination_name: &str,
    destinations: &DestinationsConfig,
) -> FileHorizonResult<DestinationKind> {
    if destinations.local.iter().any(|d| d.name == destination_name) {
        return Ok(DestinationKind::Local);
    }
    if destinations.sftp.iter().any(|d| d.name == destination_name) {
        return Ok(DestinationKind::Sftp);
    }
    if destinations.bus.iter().any(|d| d.name == destination_name) {
        return Ok(DestinationKind::MessageBus);
    }
    Err(FileHorizonError::UnknownDestination {
        name: destination_name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BusDestinationConfig, LocalDestinationConfig};
    use crate::model::{FileMetadata, Protocol};
    use chrono::Utc;

    fn sample_event(path: &str, protocol: Protocol) -> FileEvent {
        FileEvent {
            id: "evt-1".to_string(),
            correlation_id: "corr-1".to_string(),
            metadata: FileMetadata {
                source_path: path.to_string(),
                size_bytes: 5,
                last_modified_utc: Utc::now(),
                hash_algorithm: "none".to_string(),
                checksum: None,
            },
            discovered_at_utc: Utc::now(),
            protocol,
            destination_path: String::new(),
            delete_after_transfer: false,
        }
    }

    fn sample_destinations() -> DestinationsConfig {
        DestinationsConfig {
            local: vec![LocalDestinationConfig {
                name: "OutboxA".to_string(),
                root_path: "/tmp/out".to_string(),
            }],
            sftp: vec![],
            bus: vec![BusDestinationConfig {
                name: "events".to_string(),
                topic: "events".to_string(),
                is_topic: true,
            }],
        }
    }

    #[test]
    fn matches_glob_and_resolves_destination() {
        let rule = CompiledRule::compile(RoutingRule {
            name: "txt-files".to_string(),
            protocol: Some(Protocol::Local),
            path_glob: Some("**/*.txt".to_string()),
            path_regex: None,
            source_name: None,
            destinations: vec!["OutboxA".to_string()],
            rename_pattern: Some("{fileName}".to_string()),
            overwrite: true,
        })
        .unwrap();

        let event = sample_event("/tmp/in/a.txt", Protocol::Local);
        let plans = route(&event, &[rule], &sample_destinations()).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].destination_name, "OutboxA");
        assert_eq!(plans[0].kind, DestinationKind::Local);
        assert_eq!(plans[0].target_path, "a.txt");
    }

    #[test]
    fn no_rule_matched_is_a_validation_error() {
        let rule = CompiledRule::compile(RoutingRule {
            name: "local-only".to_string(),
            protocol: Some(Protocol::Local),
            path_glob: None,
            path_regex: None,
            source_name: None,
            destinations: vec!["OutboxA".to_string()],
            rename_pattern: None,
            overwrite: false,
        })
        .unwrap();

        let event = sample_event("/x.bin", Protocol::Ftp);
        let result = route(&event, &[rule], &sample_destinations());
        assert!(matches!(result, Err(FileHorizonError::NoRuleMatched { .. })));
    }

    #[test]
    fn unknown_destination_name_is_rejected() {
        let rule = CompiledRule::compile(RoutingRule {
            name: "r1".to_string(),
            protocol: None,
            path_glob: None,
            path_regex: None,
            source_name: None,
            destinations: vec!["Nope".to_string()],
            rename_pattern: None,
            overwrite: false,
        })
        .unwrap();

        let event = sample_event("/a.txt", Protocol::Local);
        let result = route(&event, &[rule], &sample_destinations());
        assert!(matches!(result, Err(FileHorizonError::UnknownDestination { .. })));
    }

    #[test]
    fn routing_is_deterministic() {
        let rule = CompiledRule::compile(RoutingRule {
            name: "txt-files".to_string(),
            protocol: Some(Protocol::Local),
            path_glob: Some("**/*.txt".to_string()),
            path_regex: None,
            source_name: None,
            destinations: vec!["OutboxA".to_string()],
            rename_pattern: None,
            overwrite: false,
        })
        .unwrap();

        let event = sample_event("/tmp/in/a.txt", Protocol::Local);
        let first = route(&event, &[rule], &sample_destinations()).unwrap();
        let rule_again = CompiledRule::compile(RoutingRule {
            name: "txt-files".to_string(),
            protocol: Some(Protocol::Local),
            path_glob: Some("**/*.txt".to_string()),
            path_regex: None,
            source_name: None,
            destinations: vec!["OutboxA".to_string()],
            rename_pattern: None,
            overwrite: false,
        })
        .unwrap();
        let second = route(&event, &[rule_again], &sample_destinations()).unwrap();
        assert_eq!(first, second);
    }
}
